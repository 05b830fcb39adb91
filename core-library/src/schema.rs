//! Table and column names of a media player's library schema.

use crate::error::Result;
use crate::ident::SqlIdent;

/// Songs table: one row per audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongTable {
    pub table: SqlIdent,
    pub id: SqlIdent,
    /// Column holding the audio file's path on disk
    pub path: SqlIdent,
    /// Set when `path` is stored without its drive
    pub media: Option<MediaTables>,
}

/// Where a player that stores paths relative to a drive keeps that drive:
/// song -> folder -> media -> drive letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTables {
    /// Folder column on the songs table
    pub song_folder: SqlIdent,
    pub folders: SqlIdent,
    pub folder_id: SqlIdent,
    pub folder_media: SqlIdent,
    pub medias: SqlIdent,
    pub media_id: SqlIdent,
    /// Either `0..=25` or a lowercase ASCII code
    pub drive_letter: SqlIdent,
}

/// Playlists table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistTable {
    pub table: SqlIdent,
    pub id: SqlIdent,
    pub name: SqlIdent,
}

/// Join table linking playlists to songs with an explicit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntryTable {
    pub table: SqlIdent,
    pub id: SqlIdent,
    pub playlist_id: SqlIdent,
    pub song_id: SqlIdent,
    pub order: SqlIdent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySchema {
    pub songs: SongTable,
    pub playlists: PlaylistTable,
    pub playlist_entries: PlaylistEntryTable,
}

impl LibrarySchema {
    /// MediaMonkey's `Songs` / `Playlists` / `PlaylistSongs` layout.
    /// `SongPath` has no drive letter; it lives on the song's `Medias` row.
    pub fn mediamonkey() -> Result<Self> {
        Ok(Self {
            songs: SongTable {
                table: SqlIdent::new("Songs")?,
                id: SqlIdent::new("ID")?,
                path: SqlIdent::new("SongPath")?,
                media: Some(MediaTables {
                    song_folder: SqlIdent::new("IDFolder")?,
                    folders: SqlIdent::new("Folders")?,
                    folder_id: SqlIdent::new("ID")?,
                    folder_media: SqlIdent::new("IDMedia")?,
                    medias: SqlIdent::new("Medias")?,
                    media_id: SqlIdent::new("IDMedia")?,
                    drive_letter: SqlIdent::new("DriveLetter")?,
                }),
            },
            playlists: PlaylistTable {
                table: SqlIdent::new("Playlists")?,
                id: SqlIdent::new("IDPlaylist")?,
                name: SqlIdent::new("PlaylistName")?,
            },
            playlist_entries: PlaylistEntryTable {
                table: SqlIdent::new("PlaylistSongs")?,
                id: SqlIdent::new("IDPlaylistSong")?,
                playlist_id: SqlIdent::new("IDPlaylist")?,
                song_id: SqlIdent::new("IDSong")?,
                order: SqlIdent::new("SongOrder")?,
            },
        })
    }
}
