//! Handlers for the music library change types.

mod playlists;
mod songs;

pub use playlists::{
    CreatePlaylistHandler, DeletePlaylistHandler, PlaylistMembershipHandler,
    RenamePlaylistHandler,
};
pub use songs::{CreateSongHandler, DeleteSongHandler, UpdateSongHandler};
