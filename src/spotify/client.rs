use super::models::{SavedTrack, SavedTracksPage};
use super::{agent, http_error};
use crate::song::{album_id_from_uri, duration_minutes, Song};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::HashSet;

pub const API_BASE: &str = "https://api.spotify.com/v1";

/// Saved tracks are requested this many at a time (the API maximum).
pub const PAGE_SIZE: usize = 50;

/// Anything that can hand out pages of the user's saved tracks.
pub trait SavedTracksSource {
    fn saved_tracks_page(&mut self, offset: usize, limit: usize) -> Result<SavedTracksPage>;
}

/// Bearer-token client for the Spotify Web API.
pub struct SpotifyClient {
    agent: ureq::Agent,
    access_token: String,
    api_base: String,
}

impl SpotifyClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            agent: agent(),
            access_token: access_token.into(),
            api_base: API_BASE.to_string(),
        }
    }

    /// Point at another server, e.g. a local mock.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

impl SavedTracksSource for SpotifyClient {
    fn saved_tracks_page(&mut self, offset: usize, limit: usize) -> Result<SavedTracksPage> {
        debug!("GET /me/tracks offset={offset} limit={limit}");
        let response = self
            .agent
            .get(&format!("{}/me/tracks", self.api_base))
            .set("Authorization", &format!("Bearer {}", self.access_token))
            .query("limit", &limit.to_string())
            .query("offset", &offset.to_string())
            .call()
            .map_err(|err| http_error("Fetching saved tracks", err))?;

        response
            .into_json::<SavedTracksPage>()
            .with_context(|| format!("Malformed saved tracks page at offset {offset}"))
    }
}

/// Page through every saved track and flatten them into [`Song`]s.
///
/// Starts at offset 0 and keeps going until a page comes back empty. Order
/// numbers start at 1 and follow the API order (most recently liked first).
/// Items without a usable track are skipped and do not use up a number.
/// A track seen again on a later page (the library changed while paging)
/// keeps its first position.
pub fn fetch_liked_songs(
    source: &mut dyn SavedTracksSource,
    project_id: &str,
) -> Result<Vec<Song>> {
    info!("Calling the Spotify API...");

    let mut songs = Vec::new();
    let mut seen = HashSet::new();
    let mut offset = 0;
    let mut order_num = 1;

    loop {
        let page = source.saved_tracks_page(offset, PAGE_SIZE)?;
        if page.items.is_empty() {
            break;
        }

        for item in &page.items {
            match normalize(item, order_num, project_id) {
                Some(song) if !seen.insert(song.song_id.clone()) => {
                    debug!("Track {} showed up twice while paging", song.song_id);
                }
                Some(song) => {
                    songs.push(song);
                    order_num += 1;
                }
                None => warn!(
                    "Skipping saved item without a Spotify track id or link (added {})",
                    item.added_at.as_deref().unwrap_or("at an unknown time")
                ),
            }
        }

        offset += PAGE_SIZE;
    }

    info!("Fetched {} liked songs", songs.len());
    Ok(songs)
}

/// Flatten one saved item. `None` when there is no track, no track id, or no
/// `open.spotify.com` link (the link is unique in the table).
#[must_use]
pub fn normalize(item: &SavedTrack, order_num: i64, project_id: &str) -> Option<Song> {
    let track = item.track.as_ref()?;
    let song_id = track.id.clone().filter(|id| !id.is_empty())?;
    let Some(playback) = track.external_urls.spotify.clone().filter(|url| !url.is_empty()) else {
        debug!("Track {song_id} has no Spotify link");
        return None;
    };

    let (artist_id, artist_name) = match track.artists.first() {
        Some(artist) => (artist.id.clone().unwrap_or_default(), artist.name.clone()),
        None => {
            debug!("Track {song_id} lists no artist");
            (String::new(), String::new())
        }
    };

    let album_cover = match track.album.images.first() {
        Some(image) => image.url.clone(),
        None => {
            debug!("Album of track {song_id} has no cover image");
            String::new()
        }
    };

    let album_id = if track.album.uri.is_empty() {
        track.album.id.clone().unwrap_or_default()
    } else {
        album_id_from_uri(&track.album.uri)
    };

    Some(Song {
        playback,
        title: track.name.clone(),
        artist_id,
        artist_name,
        album_id,
        album_name: track.album.name.clone(),
        album_cover,
        duration_min: duration_minutes(track.duration_ms),
        order_num,
        project_id: project_id.to_string(),
        song_id,
    })
}
