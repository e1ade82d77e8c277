//! # Spotify Web API
//!
//! - [`auth`] - authorization-code OAuth with a cached, refreshable token
//! - [`client`] - paging through the user's saved tracks
//! - [`models`] - response shapes
//!
//! All requests go through a blocking `ureq` agent with a fixed timeout.

pub mod auth;
pub mod client;
pub mod models;

use std::time::Duration;

/// Applies to the whole request, connect included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

pub(crate) fn agent() -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build()
}

/// Turn a `ureq` failure into an error that carries the HTTP status and body.
pub(crate) fn http_error(what: &str, err: ureq::Error) -> anyhow::Error {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response
                .into_string()
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            anyhow::anyhow!("{what} failed with HTTP {code}: {}", body.trim())
        }
        ureq::Error::Transport(transport) => {
            anyhow::anyhow!("{what} failed: {transport}")
        }
    }
}
