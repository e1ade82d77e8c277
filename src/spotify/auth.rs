//! # Spotify OAuth
//!
//! Authorization-code flow for a single user, with the token kept in a JSON
//! file between runs.
//!
//! 1. No cached token: open the authorize page, let the user paste the URL
//!    Spotify redirected to, check `state`, exchange `code` for a token.
//! 2. Cached but expired: refresh it with the refresh token.
//! 3. Cached and fresh: use it.
//!
//! Tokens and codes are never logged.

use super::models::TokenResponse;
use super::{agent, http_error};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use url::Url;

pub const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Read access to the user's saved tracks is all likesync asks for.
pub const SCOPE: &str = "user-library-read";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// App credentials registered on the Spotify developer dashboard.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scope: String,
}

/// What goes into the token cache file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl CachedToken {
    /// Build from a token endpoint response. Refresh responses usually leave
    /// out the refresh token, in which case `previous_refresh` is kept.
    #[must_use]
    pub fn from_response(
        response: TokenResponse,
        previous_refresh: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh),
            expires_at: now + Duration::seconds(response.expires_in),
            scope: response.scope,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) >= self.expires_at
    }
}

/// JSON file holding one [`CachedToken`].
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when nothing has been cached yet.
    pub fn load(&self) -> Result<Option<CachedToken>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read token cache {}", self.path.display()))?;
        match serde_json::from_str(&content) {
            Ok(token) => Ok(Some(token)),
            Err(err) => {
                warn!(
                    "Ignoring unreadable token cache {}: {err}",
                    self.path.display()
                );
                Ok(None)
            }
        }
    }

    pub fn save(&self, token: &CachedToken) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(token)?;
        write_private(&self.path, content.as_bytes())
            .with_context(|| format!("Failed to write token cache {}", self.path.display()))?;
        debug!("Token cached at {}", self.path.display());
        Ok(())
    }
}

/// Write `content` readable by the owner only, since it holds a refresh token.
#[cfg(unix)]
fn write_private(path: &Path, content: &[u8]) -> io::Result<()> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies when the file is created.
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(content)
}

#[cfg(not(unix))]
fn write_private(path: &Path, content: &[u8]) -> io::Result<()> {
    fs::write(path, content)
}

/// Random value for the `state` parameter.
pub fn random_state<R: Rng + ?Sized>(rng: &mut R) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

/// Full authorize page URL for `config`.
pub fn authorize_url(config: &OAuthConfig, state: &str) -> Result<String> {
    let mut url = Url::parse(AUTHORIZE_URL).context("Invalid authorize URL")?;
    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("scope", &config.scope)
        .append_pair("state", state);
    Ok(url.to_string())
}

/// Pull the authorization code out of the URL Spotify redirected to.
///
/// # Errors
///
/// The URL does not parse, carries an `error` parameter, has no `code`, or
/// its `state` differs from `expected_state`.
pub fn parse_redirect(redirected: &str, expected_state: &str) -> Result<String> {
    let url = Url::parse(redirected.trim())
        .with_context(|| format!("Not a URL: {}", redirected.trim()))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => bail!("Spotify refused the authorization: {value}"),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        bail!("OAuth state mismatch; restart the authorization");
    }
    code.ok_or_else(|| anyhow!("Redirect URL has no authorization code"))
}

/// Hands out a valid access token, refreshing or authorizing as needed.
pub struct SpotifyAuth {
    config: OAuthConfig,
    cache: TokenCache,
    agent: ureq::Agent,
}

impl SpotifyAuth {
    pub fn new(config: OAuthConfig, cache: TokenCache) -> Self {
        Self {
            config,
            cache,
            agent: agent(),
        }
    }

    /// A bearer token good for at least another minute.
    pub fn access_token(&self) -> Result<String> {
        let now = Utc::now();
        let token = match self.cache.load()? {
            Some(token) if !token.is_expired(now) => {
                debug!("Using cached Spotify token");
                token
            }
            Some(token) => match token.refresh_token.clone() {
                Some(refresh_token) => {
                    info!("Refreshing Spotify access token");
                    let fresh = self.refresh(&refresh_token)?;
                    self.cache.save(&fresh)?;
                    fresh
                }
                None => self.authorize_interactively()?,
            },
            None => self.authorize_interactively()?,
        };
        Ok(token.access_token)
    }

    /// Run the browser flow and cache the result.
    pub fn authorize_interactively(&self) -> Result<CachedToken> {
        let state = random_state(&mut rand::thread_rng());
        let url = authorize_url(&self.config, &state)?;

        println!("Authorize likesync in your browser:");
        println!("  {url}");
        if let Err(err) = webbrowser::open(&url) {
            warn!("Could not open a browser: {err}");
        }
        print!("Paste the URL you were redirected to: ");
        io::stdout().flush()?;

        let mut redirected = String::new();
        io::stdin()
            .lock()
            .read_line(&mut redirected)
            .context("Failed to read the redirect URL")?;

        let code = parse_redirect(&redirected, &state)?;
        let token = self.exchange_code(&code)?;
        self.cache.save(&token)?;
        info!("Spotify authorization cached at {}", self.cache.path().display());
        Ok(token)
    }

    fn exchange_code(&self, code: &str) -> Result<CachedToken> {
        let response = self
            .agent
            .post(TOKEN_URL)
            .send_form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.config.redirect_uri),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
            ])
            .map_err(|err| http_error("Exchanging the authorization code", err))?;
        let body: TokenResponse = response
            .into_json()
            .context("Malformed token response")?;
        Ok(CachedToken::from_response(body, None, Utc::now()))
    }

    fn refresh(&self, refresh_token: &str) -> Result<CachedToken> {
        let response = self
            .agent
            .post(TOKEN_URL)
            .send_form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
            ])
            .map_err(|err| http_error("Refreshing the access token", err))?;
        let body: TokenResponse = response
            .into_json()
            .context("Malformed token response")?;
        Ok(CachedToken::from_response(
            body,
            Some(refresh_token.to_string()),
            Utc::now(),
        ))
    }
}
