//! Mirror a Spotify "Liked Songs" collection into SQL and pick a song of the day.
//!
//! Core modules:
//! - [`spotify`] - OAuth and paging through saved tracks
//! - [`sync`] - Reconciling the stored table with the remote list
//! - [`store`] - SQLite, PostgreSQL and MySQL backends behind one trait
//! - [`sotd`] - Song of the day selection
//!
//! ### Supporting Modules
//!
//! - [`song`] - Row types shared by the modules above
//! - [`config`] - Profiles, database URLs, credentials and data directory
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use likesync::sotd::{self, SotdFilter};
//! use likesync::spotify::auth::{SpotifyAuth, TokenCache};
//! use likesync::spotify::client::{fetch_liked_songs, SpotifyClient};
//! use likesync::store::sqlite::SqliteStore;
//! use likesync::{config, sync};
//!
//! let auth = SpotifyAuth::new(config::oauth_config_from_env()?, TokenCache::new("token.json"));
//! let mut client = SpotifyClient::new(auth.access_token()?);
//! let songs = fetch_liked_songs(&mut client, "P006")?;
//!
//! let mut store = SqliteStore::open("likes.db".as_ref())?;
//! let outcome = sync::run(&mut store, &songs)?;
//! println!("{outcome:?}");
//!
//! let today = chrono::Local::now().date_naive();
//! sotd::pick(&mut store, today, &SotdFilter::default(), &mut rand::thread_rng())?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Sync Semantics
//!
//! Each run compares the remote ids with the stored ids:
//!
//! - Stored songs no longer liked are deleted
//! - Existing rows move down by the number of new likes plus one
//! - New likes are inserted with their remote positions
//! - Everything is renumbered to a dense `1..N` in remote order
//!
//! All four steps share one transaction, so a failed run leaves the table as
//! it was. The first run against a missing table creates it and loads every
//! song instead.
//!
//! ## Error Handling
//!
//! Public functions return `anyhow::Result`. The storage layer uses
//! [`store::StoreError`] so a uniqueness violation can be told apart from
//! other database failures.

pub mod cli;
pub mod completion;
pub mod config;
pub mod song;
pub mod sotd;
pub mod spotify;
pub mod store;
pub mod sync;
