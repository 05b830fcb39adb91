//! Fixtures shared by the unit tests.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::{RemoteId, RemoteLibrary, SongMetadata};
use core_library::{LocalDatabase, LocalDatabaseConfig, LocalSession};
use mockall::mock;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Connection, SqliteConnection};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// MediaMonkey-shaped tables with every mapped metadata column. Songs
/// default to folder 1, which sits on drive `C`.
pub const LIBRARY_SCHEMA: &str = r#"
    CREATE TABLE Songs (
        ID INTEGER PRIMARY KEY AUTOINCREMENT,
        IDFolder INTEGER DEFAULT 1,
        SongPath TEXT,
        SongTitle TEXT,
        Artist TEXT,
        Album TEXT,
        AlbumArtist TEXT,
        Comment TEXT,
        Genre TEXT,
        Rating INTEGER,
        Year INTEGER,
        DiscNumber INTEGER,
        TrackNumber INTEGER,
        BPM INTEGER
    );
    CREATE TABLE Folders (ID INTEGER PRIMARY KEY, IDMedia INTEGER);
    CREATE TABLE Medias (IDMedia INTEGER PRIMARY KEY, DriveLetter INTEGER);
    INSERT INTO Medias (IDMedia, DriveLetter) VALUES (1, 2);
    INSERT INTO Folders (ID, IDMedia) VALUES (1, 1);
    CREATE TABLE Playlists (
        IDPlaylist INTEGER PRIMARY KEY AUTOINCREMENT,
        PlaylistName TEXT
    );
    CREATE TABLE PlaylistSongs (
        IDPlaylistSong INTEGER PRIMARY KEY AUTOINCREMENT,
        IDPlaylist INTEGER,
        IDSong INTEGER,
        SongOrder INTEGER
    );
"#;

/// Create `library.db` in `dir`, run the schema and `seed`, return its path.
pub async fn library_at(dir: &TempDir, seed: &str) -> PathBuf {
    let path = dir.path().join("library.db");
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .journal_mode(SqliteJournalMode::Delete)
        .create_if_missing(true);
    let mut conn = SqliteConnection::connect_with(&options).await.unwrap();
    sqlx::raw_sql(LIBRARY_SCHEMA).execute(&mut conn).await.unwrap();
    if !seed.trim().is_empty() {
        sqlx::raw_sql(seed).execute(&mut conn).await.unwrap();
    }
    conn.close().await.unwrap();
    path
}

pub async fn open(path: &Path) -> LocalSession {
    LocalDatabase::new(LocalDatabaseConfig::new(path))
        .unwrap()
        .open()
        .await
        .unwrap()
}

pub async fn library(seed: &str) -> (TempDir, LocalSession) {
    let dir = TempDir::new().unwrap();
    let path = library_at(&dir, seed).await;
    let session = open(&path).await;
    (dir, session)
}

mock! {
    pub Remote {}

    #[async_trait]
    impl RemoteLibrary for Remote {
        async fn upload_song(&self, path: &Path) -> Result<RemoteId>;
        async fn update_song_metadata(&self, remote_id: &str, metadata: &SongMetadata) -> Result<()>;
        async fn delete_song(&self, remote_id: &str) -> Result<()>;
        async fn create_playlist(&self, name: &str) -> Result<RemoteId>;
        async fn rename_playlist(&self, remote_id: &str, name: &str) -> Result<()>;
        async fn delete_playlist(&self, remote_id: &str) -> Result<()>;
        async fn replace_playlist_entries(&self, remote_id: &str, song_ids: &[RemoteId]) -> Result<()>;
    }
}
