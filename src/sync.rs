//! # Synchronization Module
//!
//! Reconciles the freshly fetched liked list against the `liked_songs` table.
//!
//! The fetched songs are passed in explicitly; this module keeps no state of
//! its own. Deciding *what* to change ([`plan`]) is pure and separate from
//! *applying* it ([`run`]), which goes through a [`SongStore`].
//!
//! ## Ordering
//!
//! Fetched songs carry order numbers `1..=N`, newest first. Existing rows are
//! shifted up by `additions + 1` to make room, the new songs are inserted with
//! their fetched numbers, and finally every row is renumbered to its fetched
//! position so the table ends as a dense `1..=N` sequence.

use crate::song::Song;
use crate::store::{SongStore, StoreError};
use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use std::collections::HashSet;

/// What a sync run has to change in an existing table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Stored ids that are no longer liked.
    pub removals: Vec<String>,
    /// Liked songs missing from the table, with their fetched order numbers.
    pub additions: Vec<Song>,
    /// Amount added to every existing `order_num` before inserting.
    pub shift_by: i64,
    /// Final `(song_id, order_num)` for every fetched song.
    pub ordering: Vec<(String, i64)>,
}

impl Reconciliation {
    /// True when the table already matches the liked list.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.additions.is_empty()
    }
}

/// Result of [`run`].
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The table did not exist; it was created and filled.
    Bootstrapped { inserted: usize },
    /// The table existed and was brought up to date.
    Reconciled {
        removed: Vec<String>,
        added: usize,
        shift_by: i64,
    },
    /// An insert collided with a row that is already stored, so another
    /// writer got there first. Nothing from this run was committed.
    AlreadyCurrent { song_id: String },
}

/// Stored ids that no longer show up in `remote`, sorted.
#[must_use]
pub fn determine_removals(remote: &[Song], existing: &HashSet<String>) -> Vec<String> {
    let liked: HashSet<&str> = remote.iter().map(|song| song.song_id.as_str()).collect();
    let mut removals: Vec<String> = existing
        .iter()
        .filter(|id| !liked.contains(id.as_str()))
        .cloned()
        .collect();
    removals.sort();
    removals
}

/// Songs in `remote` that are not stored yet, in fetched order.
#[must_use]
pub fn determine_additions(remote: &[Song], existing: &HashSet<String>) -> Vec<Song> {
    remote
        .iter()
        .filter(|song| !existing.contains(&song.song_id))
        .cloned()
        .collect()
}

/// Work out everything [`SongStore::reconcile`] has to do.
#[must_use]
pub fn plan(remote: &[Song], existing: &HashSet<String>) -> Reconciliation {
    let removals = determine_removals(remote, existing);
    let additions = determine_additions(remote, existing);
    let shift_by = i64::try_from(additions.len()).unwrap_or(i64::MAX - 1) + 1;
    let ordering = remote
        .iter()
        .map(|song| (song.song_id.clone(), song.order_num))
        .collect();

    Reconciliation {
        removals,
        additions,
        shift_by,
        ordering,
    }
}

/// Bring the table in line with `remote`.
///
/// Creates and fills the table on first run. Otherwise computes a
/// [`Reconciliation`] from a fresh read of the stored ids and applies it in
/// one transaction.
///
/// # Errors
///
/// Database failures, and unique violations that cannot be explained by the
/// song already being stored.
pub fn run(store: &mut dyn SongStore, remote: &[Song]) -> Result<SyncOutcome> {
    let table_exists = store
        .table_exists()
        .context("Failed to check whether the liked songs table exists")?;

    if !table_exists {
        info!("Creating liked songs table.");
        store
            .initial_load(remote)
            .context("Failed to create and fill the liked songs table")?;
        info!("Inserted {} songs into the new table", remote.len());
        return Ok(SyncOutcome::Bootstrapped {
            inserted: remote.len(),
        });
    }

    let existing = store
        .existing_ids()
        .context("Failed to read stored song ids")?;
    debug!("{} songs stored, {} liked", existing.len(), remote.len());

    let plan = plan(remote, &existing);

    info!("Attempting to remove songs from database...");
    if plan.removals.is_empty() {
        info!("No songs to remove!");
    } else {
        info!("Songs to remove:");
        for song_id in &plan.removals {
            info!("  {song_id}");
        }
    }

    info!("Checking if new songs have been added to the library...");
    if plan.additions.is_empty() {
        info!("No new songs to add.");
    } else {
        info!("Adding {} new songs to the database...", plan.additions.len());
        info!("Updating song order (shifting by {}).", plan.shift_by);
    }

    if plan.is_empty() {
        info!("The database is currently up to date!");
        return Ok(SyncOutcome::Reconciled {
            removed: Vec::new(),
            added: 0,
            shift_by: plan.shift_by,
        });
    }

    match store.reconcile(&plan) {
        Ok(()) => {
            info!(
                "Removed {} and added {} songs",
                plan.removals.len(),
                plan.additions.len()
            );
            Ok(SyncOutcome::Reconciled {
                added: plan.additions.len(),
                shift_by: plan.shift_by,
                removed: plan.removals,
            })
        }
        Err(StoreError::Duplicate { song_id }) => {
            let stored = store
                .existing_ids()
                .context("Failed to re-read stored song ids after a duplicate insert")?;
            if stored.contains(&song_id) {
                warn!("Song {song_id} was stored by someone else meanwhile");
                info!("The database is currently up to date!");
                Ok(SyncOutcome::AlreadyCurrent { song_id })
            } else {
                bail!(
                    "Inserting song {song_id} violated a unique constraint although it is not \
                     stored (duplicate playback URL?)"
                )
            }
        }
        Err(err) => Err(err).context("Failed to apply liked songs changes"),
    }
}
