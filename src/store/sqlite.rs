use super::{SongStore, StoreError, StoreResult, TABLE_NAME};
use crate::song::{SotdCandidate, Song, StoredSong, DEFAULT_PROJECT_ID};
use crate::sync::Reconciliation;
use chrono::NaiveDate;
use log::{debug, trace, warn};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

const PROJECTS_TABLE: &str = "projects";

/// `liked_songs` in an embedded `SQLite` file.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`, creating parent directories.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    /// Fresh private database that disappears on drop. Good for testing.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    /// Foreign keys are always enforced, as on the server backends, so the
    /// `projects` table that `liked_songs.project_id` points at exists here too.
    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {PROJECTS_TABLE} (project_id VARCHAR(100) PRIMARY KEY)"
            ),
            (),
        )?;
        Ok(Self { conn })
    }

    fn create_table(tx: &Transaction<'_>) -> rusqlite::Result<()> {
        tx.execute(
            &format!(
                "CREATE TABLE {TABLE_NAME} (
                    project_id   VARCHAR(100) NOT NULL DEFAULT '{DEFAULT_PROJECT_ID}',
                    order_num    BIGINT       NOT NULL,
                    song_id      VARCHAR(500) NOT NULL,
                    song_title   VARCHAR(250) NOT NULL,
                    playback     VARCHAR(500) NOT NULL UNIQUE,
                    artist_id    VARCHAR(500) NOT NULL,
                    artist_name  VARCHAR(250) NOT NULL,
                    album_id     VARCHAR(500) NOT NULL,
                    album_name   VARCHAR(250) NOT NULL,
                    album_cover  VARCHAR(500) NOT NULL,
                    duration_min NUMERIC(5, 2),
                    sotd_date    DATE UNIQUE,
                    PRIMARY KEY (song_id),
                    FOREIGN KEY (project_id) REFERENCES {PROJECTS_TABLE}(project_id)
                )"
            ),
            (),
        )?;
        Ok(())
    }

    /// INSERT every song. A unique violation becomes [`StoreError::Duplicate`].
    fn insert(tx: &Transaction<'_>, songs: &[Song]) -> StoreResult<()> {
        let mut register = tx.prepare(&format!(
            "INSERT OR IGNORE INTO {PROJECTS_TABLE} (project_id) VALUES (?1)"
        ))?;
        let projects: HashSet<&str> =
            songs.iter().map(|song| song.project_id.as_str()).collect();
        for project_id in projects {
            register.execute([project_id])?;
        }

        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {TABLE_NAME} (project_id, order_num, song_id, song_title, playback, \
             artist_id, artist_name, album_id, album_name, album_cover, duration_min) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ))?;

        for song in songs {
            trace!("INSERT {} at {}", song.song_id, song.order_num);
            stmt.execute(params![
                song.project_id,
                song.order_num,
                song.song_id,
                song.title,
                song.playback,
                song.artist_id,
                song.artist_name,
                song.album_id,
                song.album_name,
                song.album_cover,
                song.duration_min,
            ])
            .map_err(|err| {
                if is_unique_violation(&err) {
                    StoreError::Duplicate {
                        song_id: song.song_id.clone(),
                    }
                } else {
                    StoreError::Sqlite(err)
                }
            })?;
        }
        Ok(())
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => {
            failure.code == rusqlite::ErrorCode::ConstraintViolation
                && (failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

impl SongStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "SQLite"
    }

    fn table_exists(&mut self) -> StoreResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [TABLE_NAME],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn existing_ids(&mut self) -> StoreResult<HashSet<String>> {
        if !self.table_exists()? {
            warn!("Liked songs table does not exist yet.");
            return Ok(HashSet::new());
        }

        let mut stmt = self
            .conn
            .prepare(&format!("SELECT song_id FROM {TABLE_NAME}"))?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(ids)
    }

    fn initial_load(&mut self, songs: &[Song]) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        Self::create_table(&tx)?;
        Self::insert(&tx, songs)?;
        tx.commit()?;
        Ok(())
    }

    fn reconcile(&mut self, plan: &Reconciliation) -> StoreResult<()> {
        let tx = self.conn.transaction()?;

        {
            let mut remove =
                tx.prepare(&format!("DELETE FROM {TABLE_NAME} WHERE song_id = ?1"))?;
            for song_id in &plan.removals {
                remove.execute([song_id])?;
            }
        }

        if !plan.additions.is_empty() {
            let shifted = tx.execute(
                &format!("UPDATE {TABLE_NAME} SET order_num = order_num + ?1"),
                [plan.shift_by],
            )?;
            debug!("Shifted {shifted} rows by {}", plan.shift_by);
            Self::insert(&tx, &plan.additions)?;
        }

        if !plan.is_empty() {
            let mut renumber = tx.prepare(&format!(
                "UPDATE {TABLE_NAME} SET order_num = ?1 WHERE song_id = ?2"
            ))?;
            for (song_id, order_num) in &plan.ordering {
                renumber.execute(params![order_num, song_id])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn todays_pick(&mut self, date: NaiveDate) -> StoreResult<Option<String>> {
        let song_id = self
            .conn
            .query_row(
                &format!("SELECT song_id FROM {TABLE_NAME} WHERE sotd_date = ?1"),
                [date],
                |row| row.get(0),
            )
            .optional()?;
        Ok(song_id)
    }

    fn daily_candidates(&mut self) -> StoreResult<Vec<SotdCandidate>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT song_id, album_name, artist_name FROM {TABLE_NAME} WHERE sotd_date IS NULL"
        ))?;
        let candidates = stmt
            .query_map([], |row| {
                Ok(SotdCandidate {
                    song_id: row.get(0)?,
                    album_name: row.get(1)?,
                    artist_name: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(candidates)
    }

    fn mark_daily_pick(&mut self, song_id: &str, date: NaiveDate) -> StoreResult<()> {
        self.conn.execute(
            &format!("UPDATE {TABLE_NAME} SET sotd_date = ?1 WHERE song_id = ?2"),
            params![date, song_id],
        )?;
        Ok(())
    }

    fn list_songs(&mut self, limit: Option<usize>) -> StoreResult<Vec<StoredSong>> {
        // SQLite reads a negative LIMIT as "no limit".
        let limit = limit.and_then(|n| i64::try_from(n).ok()).unwrap_or(-1);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT order_num, song_id, song_title, artist_name, album_name, sotd_date \
             FROM {TABLE_NAME} ORDER BY order_num LIMIT ?1"
        ))?;
        let songs = stmt
            .query_map([limit], |row| {
                Ok(StoredSong {
                    order_num: row.get(0)?,
                    song_id: row.get(1)?,
                    title: row.get(2)?,
                    artist_name: row.get(3)?,
                    album_name: row.get(4)?,
                    sotd_date: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(songs)
    }
}
