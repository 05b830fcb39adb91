//! Shared fixtures for the core-sync integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::{RemoteId, RemoteLibrary, SongMetadata};
use core_library::{LocalDatabase, LocalDatabaseConfig, LocalSession};
use core_sync::{Namespace, PlayerProfile, TriggerInstaller};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Connection, SqliteConnection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::sync::Mutex;

/// Songs default to folder 1, which sits on drive `C`.
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
    CREATE INDEX idx_playlist_songs ON PlaylistSongs (IDPlaylist, SongOrder);
"#;

/// A MediaMonkey-shaped library database in a temp dir.
pub struct Library {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl Library {
    pub async fn new(seed: &str) -> Self {
        Self::with_schema(LIBRARY_SCHEMA, seed).await
    }

    pub async fn with_schema(schema: &str, seed: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("library.db");
        let mut conn = connect(&path, true).await;
        sqlx::raw_sql(schema).execute(&mut conn).await.unwrap();
        if !seed.trim().is_empty() {
            sqlx::raw_sql(seed).execute(&mut conn).await.unwrap();
        }
        conn.close().await.unwrap();
        Self { dir, path }
    }

    pub fn database(&self) -> LocalDatabase {
        LocalDatabase::new(LocalDatabaseConfig::new(&self.path)).unwrap()
    }

    pub async fn session(&self) -> LocalSession {
        self.database().open().await.unwrap()
    }

    /// Run statements as the media player would, on its own connection.
    pub async fn mutate(&self, sql: &str) {
        let mut conn = connect(&self.path, false).await;
        sqlx::raw_sql(sql).execute(&mut conn).await.unwrap();
        conn.close().await.unwrap();
    }

    pub async fn raw(&self) -> SqliteConnection {
        connect(&self.path, false).await
    }

    /// `(type, name, tbl_name, sql)` of every schema object, by name.
    pub async fn schema_snapshot(&self) -> Vec<(String, String, String, Option<String>)> {
        let mut conn = self.raw().await;
        let rows = sqlx::query_as(
            "SELECT type, name, tbl_name, sql FROM sqlite_master ORDER BY type, name",
        )
        .fetch_all(&mut conn)
        .await
        .unwrap();
        conn.close().await.unwrap();
        rows
    }

    pub async fn sequence_snapshot(&self) -> Vec<(String, i64)> {
        let mut conn = self.raw().await;
        let rows = sqlx::query_as("SELECT name, seq FROM sqlite_sequence ORDER BY name")
            .fetch_all(&mut conn)
            .await
            .unwrap_or_default();
        conn.close().await.unwrap();
        rows
    }

    /// `(change_id, change_type, local_id)` rows of a change log table.
    pub async fn change_rows(&self, table: &str) -> Vec<(i64, i64, i64)> {
        let mut conn = self.raw().await;
        let rows = sqlx::query_as(&format!(
            "SELECT change_id, change_type, local_id FROM \"{table}\" ORDER BY change_id"
        ))
        .fetch_all(&mut conn)
        .await
        .unwrap();
        conn.close().await.unwrap();
        rows
    }
}

async fn connect(path: &Path, create: bool) -> SqliteConnection {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .journal_mode(SqliteJournalMode::Delete)
        .create_if_missing(create);
    SqliteConnection::connect_with(&options).await.unwrap()
}

pub fn installer(profile_name: &str) -> TriggerInstaller {
    PlayerProfile::mediamonkey()
        .unwrap()
        .installer(Namespace::for_profile(profile_name).unwrap())
        .unwrap()
}

// ============================================================================
// Recording remote
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    UploadSong(PathBuf),
    UpdateSongMetadata(String, SongMetadata),
    DeleteSong(String),
    CreatePlaylist(String),
    RenamePlaylist(String, String),
    DeletePlaylist(String),
    ReplacePlaylistEntries(String, Vec<String>),
}

#[derive(Default)]
struct RemoteState {
    calls: Vec<RemoteCall>,
    playlists: HashMap<String, Vec<String>>,
    next_id: u64,
    failing: Vec<&'static str>,
    lock_on: Option<(&'static str, PathBuf)>,
    held: Option<SqliteConnection>,
}

/// In-memory remote library that records every call.
#[derive(Default)]
pub struct RecordingRemote {
    state: Mutex<RemoteState>,
}

impl RecordingRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `operation` fail from now on.
    pub async fn fail(&self, operation: &'static str) {
        self.state.lock().await.failing.push(operation);
    }

    /// On the first call to `operation`, take an exclusive lock on the
    /// database at `path` and hold it until [`Self::release_database`].
    pub async fn lock_database_on(&self, operation: &'static str, path: &Path) {
        self.state.lock().await.lock_on = Some((operation, path.to_path_buf()));
    }

    pub async fn release_database(&self) {
        let mut state = self.state.lock().await;
        state.lock_on = None;
        if let Some(mut conn) = state.held.take() {
            sqlx::raw_sql("ROLLBACK").execute(&mut conn).await.unwrap();
            conn.close().await.unwrap();
        }
    }

    pub async fn seed_playlist(&self, remote_id: &str, songs: &[&str]) {
        self.state.lock().await.playlists.insert(
            remote_id.to_string(),
            songs.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn playlist(&self, remote_id: &str) -> Option<Vec<String>> {
        self.state.lock().await.playlists.get(remote_id).cloned()
    }

    async fn record(&self, operation: &'static str, call: RemoteCall) -> Result<u64> {
        let mut state = self.state.lock().await;
        state.calls.push(call);
        if state.held.is_none() {
            if let Some((_, path)) = state.lock_on.clone().filter(|(op, _)| *op == operation) {
                let mut conn = connect(&path, false).await;
                sqlx::Executor::execute(&mut conn, sqlx::raw_sql("BEGIN EXCLUSIVE"))
                    .await
                    .unwrap();
                state.held = Some(conn);
            }
        }
        if state.failing.contains(&operation) {
            return Err(BridgeError::remote(operation, "service unavailable"));
        }
        state.next_id += 1;
        Ok(state.next_id)
    }
}

#[async_trait]
impl RemoteLibrary for RecordingRemote {
    async fn upload_song(&self, path: &Path) -> Result<RemoteId> {
        let id = self
            .record("upload_song", RemoteCall::UploadSong(path.to_path_buf()))
            .await?;
        Ok(format!("song-{id}"))
    }

    async fn update_song_metadata(&self, remote_id: &str, metadata: &SongMetadata) -> Result<()> {
        self.record(
            "update_song_metadata",
            RemoteCall::UpdateSongMetadata(remote_id.to_string(), metadata.clone()),
        )
        .await?;
        Ok(())
    }

    async fn delete_song(&self, remote_id: &str) -> Result<()> {
        self.record("delete_song", RemoteCall::DeleteSong(remote_id.to_string()))
            .await?;
        Ok(())
    }

    async fn create_playlist(&self, name: &str) -> Result<RemoteId> {
        let id = self
            .record("create_playlist", RemoteCall::CreatePlaylist(name.to_string()))
            .await?;
        let remote_id = format!("playlist-{id}");
        self.state
            .lock()
            .await
            .playlists
            .insert(remote_id.clone(), Vec::new());
        Ok(remote_id)
    }

    async fn rename_playlist(&self, remote_id: &str, name: &str) -> Result<()> {
        self.record(
            "rename_playlist",
            RemoteCall::RenamePlaylist(remote_id.to_string(), name.to_string()),
        )
        .await?;
        Ok(())
    }

    async fn delete_playlist(&self, remote_id: &str) -> Result<()> {
        self.record(
            "delete_playlist",
            RemoteCall::DeletePlaylist(remote_id.to_string()),
        )
        .await?;
        self.state.lock().await.playlists.remove(remote_id);
        Ok(())
    }

    async fn replace_playlist_entries(&self, remote_id: &str, song_ids: &[RemoteId]) -> Result<()> {
        self.record(
            "replace_playlist_entries",
            RemoteCall::ReplacePlaylistEntries(remote_id.to_string(), song_ids.to_vec()),
        )
        .await?;
        self.state
            .lock()
            .await
            .playlists
            .insert(remote_id.to_string(), song_ids.to_vec());
        Ok(())
    }
}
