//! # Integration Tests for Likesync
//!
//! End-to-end checks from a user's point of view: the CLI binary itself, and
//! a full fetch, sync and pick cycle against a SQLite file. Spotify is
//! replaced by an in-memory source.

use anyhow::Result;
use chrono::NaiveDate;
use likesync::config::DatabaseTarget;
use likesync::song::StoredSong;
use likesync::sotd::{self, DailyPick, SotdFilter};
use likesync::spotify::client::{fetch_liked_songs, SavedTracksSource};
use likesync::spotify::models::{SavedTrack, SavedTracksPage};
use likesync::store::sqlite::SqliteStore;
use likesync::store::{self, SongStore};
use likesync::sync::{self, SyncOutcome};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// A liked library held in memory, newest first.
struct Library {
    items: Vec<SavedTrack>,
}

impl Library {
    fn new(tracks: &[(&str, &str, &str)]) -> Self {
        let items = tracks
            .iter()
            .map(|(id, album, artist)| {
                serde_json::from_value(json!({
                    "added_at": "2024-05-01T12:00:00Z",
                    "track": {
                        "id": id,
                        "name": format!("Track {id}"),
                        "duration_ms": 200_000,
                        "external_urls": {
                            "spotify": format!("https://open.spotify.com/track/{id}")
                        },
                        "artists": [{"id": format!("artist-{id}"), "name": artist}],
                        "album": {
                            "id": format!("album-{id}"),
                            "uri": format!("spotify:album:album-{id}"),
                            "name": album,
                            "images": [{"url": format!("https://i.scdn.co/image/{id}")}]
                        }
                    }
                }))
                .expect("valid saved track JSON")
            })
            .collect();
        Self { items }
    }
}

impl SavedTracksSource for Library {
    fn saved_tracks_page(&mut self, offset: usize, limit: usize) -> Result<SavedTracksPage> {
        Ok(SavedTracksPage {
            items: self.items.iter().skip(offset).take(limit).cloned().collect(),
            ..Default::default()
        })
    }
}

fn likesync() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_likesync"));
    cmd.env_remove("LIKESYNC_PROFILE")
        .env_remove("DATABASE_URL")
        .env("RUST_LOG", "warn");
    cmd
}

fn sync_library(db_path: &Path, library: &[(&str, &str, &str)]) -> Result<SyncOutcome> {
    let songs = fetch_liked_songs(&mut Library::new(library), "P006")?;
    let mut store = SqliteStore::open(db_path)?;
    sync::run(&mut store, &songs)
}

fn stored(db_path: &Path) -> Vec<StoredSong> {
    SqliteStore::open(db_path)
        .and_then(|mut store| store.list_songs(None))
        .expect("readable database")
}

#[test]
fn test_cli_help() {
    let output = likesync().arg("--help").output().expect("Failed to run likesync");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["sync", "pick", "list", "auth", "completion"] {
        assert!(stdout.contains(command), "help is missing {command}");
    }
    assert!(stdout.contains("--database-url"));
}

#[test]
fn test_cli_version() {
    let output = likesync().arg("--version").output().expect("Failed to run likesync");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_completion_bash() {
    let output = likesync()
        .args(["completion", "bash"])
        .output()
        .expect("Failed to run likesync");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("likesync"));
}

#[test]
fn test_cli_rejects_unknown_database_scheme() {
    let output = likesync()
        .args(["--database-url", "redis://localhost/0", "pick"])
        .output()
        .expect("Failed to run likesync");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("redis"));
}

#[test]
fn test_full_cycle_on_sqlite_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("likes.db");

    // First run creates the table.
    let first = sync_library(
        &db_path,
        &[
            ("A", "Rumours", "Fleetwood Mac"),
            ("D", "Dune (Original Motion Picture Soundtrack)", "Hans Zimmer"),
        ],
    )?;
    assert_eq!(first, SyncOutcome::Bootstrapped { inserted: 2 });

    // D was unliked, B and C were liked.
    let second = sync_library(
        &db_path,
        &[
            ("A", "Rumours", "Fleetwood Mac"),
            ("B", "Blue", "Joni Mitchell"),
            ("C", "Lounge Against the Machine", "Richard Cheese"),
        ],
    )?;
    assert_eq!(
        second,
        SyncOutcome::Reconciled {
            removed: vec!["D".to_string()],
            added: 2,
            shift_by: 3,
        }
    );

    let rows = stored(&db_path);
    let order: Vec<(&str, i64)> = rows
        .iter()
        .map(|row| (row.song_id.as_str(), row.order_num))
        .collect();
    assert_eq!(order, vec![("A", 1), ("B", 2), ("C", 3)]);

    // C is excluded by artist, so only A or B can be picked.
    let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    let mut store = SqliteStore::open(&db_path)?;
    let mut rng = StdRng::seed_from_u64(11);
    let pick = sotd::pick(&mut store, day, &SotdFilter::default(), &mut rng)?;
    let DailyPick::Chosen { song_id } = pick else {
        panic!("expected a song of the day, got {pick:?}");
    };
    assert!(song_id == "A" || song_id == "B");

    let again = sotd::pick(&mut store, day, &SotdFilter::default(), &mut rng)?;
    assert_eq!(again, DailyPick::AlreadyChosen { song_id });
    drop(store);

    let dated = stored(&db_path)
        .into_iter()
        .filter(|row| row.sotd_date == Some(day))
        .count();
    assert_eq!(dated, 1);

    Ok(())
}

#[test]
fn test_cli_list_and_pick_on_sqlite_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("likes.db");
    let url = format!("sqlite:{}", db_path.display());

    let empty = likesync().args(["--database-url", &url, "list"]).output()?;
    assert!(empty.status.success());
    assert!(String::from_utf8_lossy(&empty.stdout).contains("No liked songs stored yet"));

    sync_library(
        &db_path,
        &[("A", "Rumours", "Fleetwood Mac"), ("B", "Blue", "Joni Mitchell")],
    )?;

    let listed = likesync()
        .args(["--database-url", &url, "list", "--limit", "1"])
        .output()?;
    assert!(listed.status.success());
    let stdout = String::from_utf8_lossy(&listed.stdout);
    assert!(stdout.contains("Track A"));
    assert!(!stdout.contains("Track B"));

    let picked = likesync().args(["--database-url", &url, "pick"]).output()?;
    assert!(picked.status.success());
    assert!(String::from_utf8_lossy(&picked.stdout).contains("Song of the day"));

    let dated = stored(&db_path)
        .iter()
        .filter(|row| row.sotd_date.is_some())
        .count();
    assert_eq!(dated, 1);

    Ok(())
}

#[test]
fn test_repeated_sync_through_store_open() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let target = DatabaseTarget::Sqlite {
        path: temp_dir.path().join("likes.db"),
    };
    let library = [
        ("A", "Rumours", "Fleetwood Mac"),
        ("B", "Blue", "Joni Mitchell"),
        ("C", "Hejira", "Joni Mitchell"),
    ];

    let songs = fetch_liked_songs(&mut Library::new(&library), "P006")?;
    let mut store = store::open(&target)?;
    assert_eq!(
        sync::run(store.as_mut(), &songs)?,
        SyncOutcome::Bootstrapped { inserted: 3 }
    );
    drop(store);

    // Nothing changed remotely, so the second run only renumbers.
    let mut store = store::open(&target)?;
    assert_eq!(
        sync::run(store.as_mut(), &songs)?,
        SyncOutcome::Reconciled {
            removed: Vec::new(),
            added: 0,
            shift_by: 1,
        }
    );

    let order: Vec<(String, i64)> = store
        .list_songs(None)?
        .into_iter()
        .map(|row| (row.song_id, row.order_num))
        .collect();
    assert_eq!(
        order,
        vec![
            ("A".to_string(), 1),
            ("B".to_string(), 2),
            ("C".to_string(), 3)
        ]
    );

    Ok(())
}

#[test]
fn test_cli_pick_before_any_sync() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let url = format!("sqlite:{}", temp_dir.path().join("likes.db").display());

    let output = likesync().args(["--database-url", &url, "pick"]).output()?;

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No liked songs stored yet"));
    Ok(())
}
