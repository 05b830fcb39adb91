//! Row reads against the media player's library.
//!
//! Repositories borrow a [`LocalSession`](crate::db::LocalSession) per call and
//! route every query through its lock retry. A missing row is `Ok(None)`,
//! never an error; callers decide what absence means.

pub mod playlists;
pub mod songs;
mod value;

pub use playlists::PlaylistRepository;
pub use songs::SongRepository;
pub use value::LocalValue;
