//! # Song of the Day
//!
//! Picks one stored song at random and stamps today's date on it.
//!
//! A song is eligible when it has never been song of the day and neither its
//! album nor its artist matches [`SotdFilter`]. Matching is a plain,
//! case-sensitive substring test done here rather than in SQL, so every
//! database backend excludes exactly the same rows.
//!
//! Picking twice on the same day is a no-op: the song already holding today's
//! date is reported back, which keeps `sotd_date` unique.

use crate::song::SotdCandidate;
use crate::store::SongStore;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{info, warn};
use rand::seq::SliceRandom;
use rand::Rng;

/// Substrings that disqualify a song from being song of the day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SotdFilter {
    pub album_exclusions: Vec<String>,
    pub artist_exclusions: Vec<String>,
}

impl Default for SotdFilter {
    fn default() -> Self {
        Self {
            album_exclusions: ["Soundtrack", "OST", "TV", "Season", "Motion Picture"]
                .into_iter()
                .map(String::from)
                .collect(),
            artist_exclusions: vec!["Richard Cheese".to_string()],
        }
    }
}

impl SotdFilter {
    #[must_use]
    pub fn is_eligible(&self, candidate: &SotdCandidate) -> bool {
        !self
            .album_exclusions
            .iter()
            .any(|word| candidate.album_name.contains(word.as_str()))
            && !self
                .artist_exclusions
                .iter()
                .any(|word| candidate.artist_name.contains(word.as_str()))
    }
}

/// What [`pick`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DailyPick {
    /// `song_id` was chosen and stamped with the date.
    Chosen { song_id: String },
    /// A song already holds the date; nothing changed.
    AlreadyChosen { song_id: String },
    /// Every song is excluded or has had its day.
    NoCandidates,
    /// The liked songs table has not been created yet.
    NothingStored,
}

/// Choose one eligible candidate uniformly at random.
pub fn choose<'a, R: Rng + ?Sized>(
    candidates: &'a [SotdCandidate],
    filter: &SotdFilter,
    rng: &mut R,
) -> Option<&'a SotdCandidate> {
    let eligible: Vec<&SotdCandidate> = candidates
        .iter()
        .filter(|candidate| filter.is_eligible(candidate))
        .collect();
    eligible.choose(rng).copied()
}

/// Pick the song of the day for `date`, unless one is already set.
pub fn pick<R: Rng + ?Sized>(
    store: &mut dyn SongStore,
    date: NaiveDate,
    filter: &SotdFilter,
    rng: &mut R,
) -> Result<DailyPick> {
    info!("Updating song of the day...");

    if !store
        .table_exists()
        .context("Failed to check whether the liked songs table exists")?
    {
        warn!("No liked songs stored yet; nothing to pick from");
        return Ok(DailyPick::NothingStored);
    }

    if let Some(song_id) = store
        .todays_pick(date)
        .context("Failed to look up today's song of the day")?
    {
        info!("Song of the Day for {date} was already chosen: {song_id}");
        return Ok(DailyPick::AlreadyChosen { song_id });
    }

    let candidates = store
        .daily_candidates()
        .context("Failed to read song of the day candidates")?;

    let Some(chosen) = choose(&candidates, filter, rng) else {
        warn!(
            "No song is eligible for song of the day ({} unpicked rows, all excluded)",
            candidates.len()
        );
        return Ok(DailyPick::NoCandidates);
    };

    store
        .mark_daily_pick(&chosen.song_id, date)
        .with_context(|| format!("Failed to mark {} as song of the day", chosen.song_id))?;
    info!("Song of the Day chosen! {}", chosen.song_id);

    Ok(DailyPick::Chosen {
        song_id: chosen.song_id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::Song;
    use crate::store::sqlite::SqliteStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn candidate(id: &str, album: &str, artist: &str) -> SotdCandidate {
        SotdCandidate {
            song_id: id.to_string(),
            album_name: album.to_string(),
            artist_name: artist.to_string(),
        }
    }

    fn song(id: &str, order_num: i64, album: &str, artist: &str) -> Song {
        Song {
            song_id: id.to_string(),
            playback: format!("https://open.spotify.com/track/{id}"),
            album_name: album.to_string(),
            artist_name: artist.to_string(),
            order_num,
            project_id: "P006".to_string(),
            ..Default::default()
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_filter_excludes_album_words() {
        let filter = SotdFilter::default();
        let excluded = [
            candidate("1", "Interstellar (Original Motion Picture Soundtrack)", "Hans Zimmer"),
            candidate("2", "Attack on Titan OST", "Sawano"),
            candidate("3", "Fearless (TV)", "Someone"),
            candidate("4", "Season Two", "Someone"),
        ];
        for song in &excluded {
            assert!(!filter.is_eligible(song), "{} should be excluded", song.album_name);
        }
        assert!(filter.is_eligible(&candidate("5", "Blue", "Joni Mitchell")));
    }

    #[test]
    fn test_filter_excludes_artist() {
        let filter = SotdFilter::default();
        let lounge = candidate("1", "Lounge Against the Machine", "Richard Cheese");
        assert!(!filter.is_eligible(&lounge));
    }

    #[test]
    fn test_filter_is_case_sensitive() {
        let filter = SotdFilter::default();
        assert!(filter.is_eligible(&candidate("1", "original soundtrack", "someone")));
        assert!(filter.is_eligible(&candidate("2", "Ghost", "someone")));
    }

    #[test]
    fn test_choose_only_returns_eligible() {
        let candidates = vec![
            candidate("a", "Frozen (Original Motion Picture Soundtrack)", "Idina Menzel"),
            candidate("b", "Rumours", "Fleetwood Mac"),
        ];
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let chosen = choose(&candidates, &SotdFilter::default(), &mut rng).unwrap();
            assert_eq!(chosen.song_id, "b");
        }
    }

    #[test]
    fn test_choose_none_when_all_excluded() {
        let candidates = vec![candidate("a", "Some OST", "X")];
        let mut rng = StdRng::seed_from_u64(7);
        assert!(choose(&candidates, &SotdFilter::default(), &mut rng).is_none());
    }

    #[test]
    fn test_pick_marks_exactly_one_row() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .initial_load(&[
                song("a", 1, "Rumours", "Fleetwood Mac"),
                song("b", 2, "Blue", "Joni Mitchell"),
                song("c", 3, "Dune OST", "Hans Zimmer"),
            ])
            .unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let result = pick(&mut store, day(1), &SotdFilter::default(), &mut rng).unwrap();

        let DailyPick::Chosen { song_id } = result else {
            panic!("expected a pick, got {result:?}");
        };
        assert_ne!(song_id, "c");
        let dated: Vec<_> = store
            .list_songs(None)
            .unwrap()
            .into_iter()
            .filter(|row| row.sotd_date == Some(day(1)))
            .collect();
        assert_eq!(dated.len(), 1);
        assert_eq!(dated[0].song_id, song_id);
    }

    #[test]
    fn test_pick_before_any_sync() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut rng = StdRng::seed_from_u64(5);

        let result = pick(&mut store, day(6), &SotdFilter::default(), &mut rng).unwrap();

        assert_eq!(result, DailyPick::NothingStored);
        assert!(!store.table_exists().unwrap());
    }

    #[test]
    fn test_pick_twice_same_day_keeps_first() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .initial_load(&[
                song("a", 1, "Rumours", "Fleetwood Mac"),
                song("b", 2, "Blue", "Joni Mitchell"),
            ])
            .unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let first = pick(&mut store, day(2), &SotdFilter::default(), &mut rng).unwrap();
        let second = pick(&mut store, day(2), &SotdFilter::default(), &mut rng).unwrap();

        let DailyPick::Chosen { song_id } = first else {
            panic!("expected a pick, got {first:?}");
        };
        assert_eq!(second, DailyPick::AlreadyChosen { song_id });
    }

    #[test]
    fn test_pick_never_repeats_a_song() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .initial_load(&[
                song("a", 1, "Rumours", "Fleetwood Mac"),
                song("b", 2, "Blue", "Joni Mitchell"),
            ])
            .unwrap();
        let mut rng = StdRng::seed_from_u64(9);

        let first = pick(&mut store, day(3), &SotdFilter::default(), &mut rng).unwrap();
        let second = pick(&mut store, day(4), &SotdFilter::default(), &mut rng).unwrap();
        let third = pick(&mut store, day(5), &SotdFilter::default(), &mut rng).unwrap();

        assert_ne!(first, second);
        assert!(matches!(second, DailyPick::Chosen { .. }));
        assert_eq!(third, DailyPick::NoCandidates);
    }
}
