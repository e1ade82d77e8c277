use chrono::NaiveDate;

/// Project tag stamped on every row unless `PROJECT_ID` says otherwise.
pub const DEFAULT_PROJECT_ID: &str = "P006";

/// Prefix Spotify puts in front of album ids inside `album.uri`.
const ALBUM_URI_PREFIX: &str = "spotify:album:";

/// One liked song, flattened from the Spotify payload.
/// This is what gets written into the `liked_songs` table.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Song {
    /// Spotify track id. Primary key in the table.
    pub song_id: String,
    pub title: String,
    /// Public `open.spotify.com` link. Unique in the table.
    pub playback: String,
    pub artist_id: String,
    pub artist_name: String,
    pub album_id: String,
    pub album_name: String,
    pub album_cover: String,
    /// Rounded to two decimals, see [`duration_minutes`].
    pub duration_min: f64,
    /// 1-based position in the liked list, newest first.
    pub order_num: i64,
    pub project_id: String,
}

/// A row as read back from the table for `likesync list`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSong {
    pub order_num: i64,
    pub song_id: String,
    pub title: String,
    pub artist_name: String,
    pub album_name: String,
    pub sotd_date: Option<NaiveDate>,
}

/// The columns the daily pick needs to judge a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SotdCandidate {
    pub song_id: String,
    pub album_name: String,
    pub artist_name: String,
}

/// Milliseconds to minutes, rounded to two decimal places.
#[must_use]
pub fn duration_minutes(duration_ms: u64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let minutes = duration_ms as f64 / 60_000.0;
    (minutes * 100.0).round() / 100.0
}

/// `spotify:album:4aawyAB9vmqN3uQ7FjRGTy` -> `4aawyAB9vmqN3uQ7FjRGTy`.
/// Anything without the prefix is returned unchanged.
#[must_use]
pub fn album_id_from_uri(uri: &str) -> String {
    uri.strip_prefix(ALBUM_URI_PREFIX).unwrap_or(uri).to_string()
}
