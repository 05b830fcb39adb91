use crate::db::LocalSession;
use crate::error::{LibraryError, Result};
use crate::ident::{join_idents, SqlIdent};
use crate::repositories::LocalValue;
use crate::schema::SongTable;
use sqlx::sqlite::SqliteRow;

/// Reads song rows.
#[derive(Debug, Clone)]
pub struct SongRepository {
    table: SongTable,
}

impl SongRepository {
    pub fn new(table: SongTable) -> Self {
        Self { table }
    }

    /// Full path of the song's audio file, drive included.
    ///
    /// `None` if the row is gone, has no path, or its folder no longer leads
    /// to a media row.
    ///
    /// # Errors
    ///
    /// `LibraryError::InvalidData` if the media row's drive letter is null or
    /// cannot be read as a letter.
    pub async fn path(&self, session: &mut LocalSession, song_id: i64) -> Result<Option<String>> {
        let Some(media) = &self.table.media else {
            return self.stored_path(session, song_id).await;
        };

        let sql = format!(
            "SELECT s.{path}, m.{media_id}, m.{letter} FROM {songs} AS s \
             LEFT JOIN {folders} AS f ON f.{folder_id} = s.{song_folder} \
             LEFT JOIN {medias} AS m ON m.{media_id} = f.{folder_media} \
             WHERE s.{id} = ?",
            path = self.table.path,
            songs = self.table.table,
            id = self.table.id,
            song_folder = media.song_folder,
            folders = media.folders,
            folder_id = media.folder_id,
            folder_media = media.folder_media,
            medias = media.medias,
            media_id = media.media_id,
            letter = media.drive_letter,
        );

        let row = session
            .retrying("song path", move |conn| {
                let sql = sql.clone();
                Box::pin(async move {
                    sqlx::query_as::<_, (Option<String>, Option<i64>, Option<i64>)>(&sql)
                        .bind(song_id)
                        .fetch_optional(conn)
                        .await
                })
            })
            .await?;

        let Some((Some(path), Some(_media), letter)) = row else {
            return Ok(None);
        };
        if path.is_empty() {
            return Ok(None);
        }

        let letter = letter.ok_or_else(|| {
            LibraryError::InvalidData(format!("song {song_id} is on a media without a drive letter"))
        })?;
        let drive = drive_letter(letter).ok_or_else(|| {
            LibraryError::InvalidData(format!(
                "drive letter {letter} of song {song_id} is not a letter"
            ))
        })?;
        Ok(Some(format!("{drive}{path}")))
    }

    async fn stored_path(&self, session: &mut LocalSession, song_id: i64) -> Result<Option<String>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            self.table.path, self.table.table, self.table.id
        );

        let path = session
            .retrying("song path", move |conn| {
                let sql = sql.clone();
                Box::pin(async move {
                    sqlx::query_scalar::<_, Option<String>>(&sql)
                        .bind(song_id)
                        .fetch_optional(conn)
                        .await
                })
            })
            .await?;

        Ok(path.flatten().filter(|p| !p.is_empty()))
    }

    /// The requested columns of one song, in the order asked for.
    pub async fn columns(
        &self,
        session: &mut LocalSession,
        song_id: i64,
        columns: &[SqlIdent],
    ) -> Result<Option<Vec<(SqlIdent, LocalValue)>>> {
        if columns.is_empty() {
            return Ok(self.exists(session, song_id).await?.then(Vec::new));
        }

        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            join_idents(columns),
            self.table.table,
            self.table.id
        );

        let row: Option<SqliteRow> = session
            .retrying("song columns", move |conn| {
                let sql = sql.clone();
                Box::pin(async move { sqlx::query(&sql).bind(song_id).fetch_optional(conn).await })
            })
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut values = Vec::with_capacity(columns.len());
        for (index, column) in columns.iter().enumerate() {
            values.push((column.clone(), LocalValue::decode(&row, index)?));
        }
        Ok(Some(values))
    }

    pub async fn exists(&self, session: &mut LocalSession, song_id: i64) -> Result<bool> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ?",
            self.table.table, self.table.id
        );

        let found = session
            .retrying("song exists", move |conn| {
                let sql = sql.clone();
                Box::pin(async move {
                    sqlx::query_scalar::<_, i64>(&sql)
                        .bind(song_id)
                        .fetch_optional(conn)
                        .await
                })
            })
            .await?;
        Ok(found.is_some())
    }
}

/// Drive letter for a stored media value: `0..=25` counts from `A`, a
/// lowercase ASCII code is upper-cased. Anything else is rejected.
pub fn drive_letter(value: i64) -> Option<char> {
    match value {
        0..=25 => u8::try_from(value).ok().map(|v| char::from(b'A' + v)),
        97..=122 => u8::try_from(value - 32).ok().map(char::from),
        _ => None,
    }
}
