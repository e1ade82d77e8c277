//! Serde shapes for the parts of the Spotify Web API responses we read.
//!
//! Only the fields likesync needs are declared; everything else is ignored.
//! Optional or sometimes-missing fields default instead of failing the page.

use serde::{Deserialize, Deserializer};

/// Treat an explicit `null` like a missing field. Spotify sends `null` for
/// many fields of local files and unavailable tracks.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One page of `GET /v1/me/tracks`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SavedTracksPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<SavedTrack>,
    #[serde(default)]
    pub total: Option<u32>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SavedTrack {
    #[serde(default)]
    pub added_at: Option<String>,
    /// `null` for tracks that are no longer available.
    #[serde(default)]
    pub track: Option<Track>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Track {
    /// `null` for local files.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub external_urls: ExternalUrls,
    #[serde(default, deserialize_with = "null_as_default")]
    pub artists: Vec<Artist>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub album: Album,
    #[serde(default, deserialize_with = "null_as_default")]
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Artist {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Album {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uri: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Widest first, as Spotify returns them.
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Image {
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
}

/// Body of a successful `POST /api/token`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Seconds.
    pub expires_in: i64,
    /// Absent on most refresh responses.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_tolerates_nulls_and_missing_fields() {
        let json = r#"{
            "items": [
                {"added_at": "2024-01-01T00:00:00Z", "track": null},
                {"track": {"id": null, "artists": [], "album": {"images": []}}}
            ],
            "next": null
        }"#;

        let page: SavedTracksPage = serde_json::from_str(json).unwrap();

        assert_eq!(page.items.len(), 2);
        assert!(page.items[0].track.is_none());
        let local = page.items[1].track.as_ref().unwrap();
        assert!(local.id.is_none());
        assert_eq!(local.duration_ms, 0);
        assert!(local.external_urls.spotify.is_none());
    }

    #[test]
    fn test_local_file_payload_with_explicit_nulls() {
        let json = r#"{
            "items": [{
                "added_at": "2023-11-05T18:22:10Z",
                "track": {
                    "id": null,
                    "uri": "spotify:local:Band:Demo:My+Demo:201",
                    "name": "My Demo",
                    "is_local": true,
                    "duration_ms": 201000,
                    "external_urls": {},
                    "artists": [{"id": null, "name": "Band", "uri": null}],
                    "album": {
                        "id": null,
                        "uri": null,
                        "name": null,
                        "images": null,
                        "release_date": null
                    }
                }
            }],
            "total": 1,
            "next": null
        }"#;

        let page: SavedTracksPage = serde_json::from_str(json).unwrap();

        let track = page.items[0].track.as_ref().unwrap();
        assert!(track.id.is_none());
        assert_eq!(track.name, "My Demo");
        assert_eq!(track.artists[0].name, "Band");
        assert!(track.artists[0].id.is_none());
        assert!(track.album.id.is_none());
        assert_eq!(track.album.uri, "");
        assert_eq!(track.album.name, "");
        assert!(track.album.images.is_empty());
    }

    #[test]
    fn test_null_scalars_fall_back_to_defaults() {
        let json = r#"{"id": "abc", "name": null, "duration_ms": null, "external_urls": null,
                       "artists": null, "album": null}"#;

        let track: Track = serde_json::from_str(json).unwrap();

        assert_eq!(track.id.as_deref(), Some("abc"));
        assert_eq!(track.name, "");
        assert_eq!(track.duration_ms, 0);
        assert!(track.artists.is_empty());
        assert_eq!(track.album.name, "");
    }

    #[test]
    fn test_token_response_without_refresh_token() {
        let json = r#"{
            "access_token": "abc",
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "user-library-read"
        }"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.expires_in, 3600);
        assert!(token.refresh_token.is_none());
    }
}
