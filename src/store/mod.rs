//! # Storage Module
//!
//! Everything that touches the `liked_songs` table goes through [`SongStore`].
//! There is one implementation per SQL dialect:
//!
//! - [`sqlite::SqliteStore`] - embedded file, via `rusqlite`
//! - [`postgres::PostgresStore`] - the hosted profile, via `sqlx`
//! - [`mysql::MySqlStore`] - the local profile, via `sqlx`
//!
//! The backend is picked once in [`open`] from a [`DatabaseTarget`]; callers
//! never branch on the dialect afterwards.

pub mod mysql;
pub mod postgres;
pub mod sqlite;

use crate::config::DatabaseTarget;
use crate::song::{SotdCandidate, Song, StoredSong};
use crate::sync::Reconciliation;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::info;
use std::collections::HashSet;
use thiserror::Error;

/// Name of the synchronized table.
pub const TABLE_NAME: &str = "liked_songs";

/// Errors raised by a [`SongStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint fired while inserting `song_id`.
    /// The transaction has already been rolled back.
    #[error("unique constraint violated while inserting song {song_id}")]
    Duplicate { song_id: String },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("sql server error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Operations the sync and the daily pick need from a database.
pub trait SongStore {
    /// Short dialect name for log lines.
    fn backend(&self) -> &'static str;

    /// Whether `liked_songs` exists yet.
    fn table_exists(&mut self) -> StoreResult<bool>;

    /// Every stored `song_id`. A missing table reads as an empty set.
    fn existing_ids(&mut self) -> StoreResult<HashSet<String>>;

    /// Create the table and insert every song with its fetched order number.
    fn initial_load(&mut self, songs: &[Song]) -> StoreResult<()>;

    /// Apply removals, shift, inserts and renumbering in one transaction.
    ///
    /// # Errors
    ///
    /// [`StoreError::Duplicate`] when an insert trips a unique constraint;
    /// nothing from this call is committed in that case.
    fn reconcile(&mut self, plan: &Reconciliation) -> StoreResult<()>;

    /// The song already holding `date`, if any.
    fn todays_pick(&mut self, date: NaiveDate) -> StoreResult<Option<String>>;

    /// Rows that have never been song of the day.
    fn daily_candidates(&mut self) -> StoreResult<Vec<SotdCandidate>>;

    /// Stamp `date` on `song_id`.
    fn mark_daily_pick(&mut self, song_id: &str, date: NaiveDate) -> StoreResult<()>;

    /// Stored rows ordered by `order_num`, at most `limit` of them.
    fn list_songs(&mut self, limit: Option<usize>) -> StoreResult<Vec<StoredSong>>;
}

/// Connect to the database named by `target` and hand back the matching backend.
pub fn open(target: &DatabaseTarget) -> Result<Box<dyn SongStore>> {
    let store: Box<dyn SongStore> = match target {
        DatabaseTarget::Sqlite { path } => Box::new(
            sqlite::SqliteStore::open(path)
                .with_context(|| format!("Failed to open SQLite database at {}", path.display()))?,
        ),
        DatabaseTarget::Postgres(server) => Box::new(
            postgres::PostgresStore::connect(server)
                .with_context(|| format!("Failed to connect to PostgreSQL at {}", server.host))?,
        ),
        DatabaseTarget::MySql(server) => Box::new(
            mysql::MySqlStore::connect(server)
                .with_context(|| format!("Failed to connect to MySQL at {}", server.host))?,
        ),
    };
    info!("Connected to {} database", store.backend());
    Ok(store)
}
