//! # Likesync
//!
//! Mirrors the Spotify "Liked Songs" collection into a `liked_songs` table and
//! picks a song of the day from it.
//!
//! ```bash
//! # First run: authorize, create the table, load everything
//! likesync --profile hosted sync
//!
//! # Daily run (cron): reconcile and pick
//! likesync --profile hosted sync
//!
//! # Try it without a server
//! likesync --database-url sqlite:likes.db sync
//! likesync --database-url sqlite:likes.db list --limit 10
//! ```

use anyhow::Result;
use chrono::Local;
use clap::{CommandFactory, Parser};
use likesync::cli::{self, Args, Command};
use likesync::config::{self, DatabaseTarget};
use likesync::sotd::{self, DailyPick, SotdFilter};
use likesync::spotify::auth::{SpotifyAuth, TokenCache};
use likesync::spotify::client::{fetch_liked_songs, SpotifyClient};
use likesync::store::{self, SongStore};
use likesync::{completion, sync};
use log::{debug, info};
use std::io;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match dotenvy::dotenv() {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(err) if err.not_found() => debug!("No .env file found"),
        Err(err) => return Err(err.into()),
    }

    let args = Args::parse();

    match &args.command {
        Command::Sync { no_pick } => {
            let songs = {
                let auth = spotify_auth(&args)?;
                let mut client = SpotifyClient::new(auth.access_token()?);
                fetch_liked_songs(&mut client, &config::project_id())?
            };

            let mut store = open_store(&args)?;
            sync::run(store.as_mut(), &songs)?;

            if !no_pick {
                pick_song_of_the_day(store.as_mut())?;
            }
        }
        Command::Pick => {
            let mut store = open_store(&args)?;
            pick_song_of_the_day(store.as_mut())?;
        }
        Command::List { limit } => {
            let mut store = open_store(&args)?;
            list_songs(store.as_mut(), *limit)?;
        }
        Command::Auth => {
            let auth = spotify_auth(&args)?;
            auth.authorize_interactively()?;
            println!("Spotify authorization saved.");
        }
        Command::Completion { shell } => {
            let mut cmd = Args::command();
            completion::generate_completions(
                completion::shell_to_completion_shell(*shell),
                &mut cmd,
                &mut io::stdout(),
            );
        }
    }

    Ok(())
}

/// `--database-url` wins, then `--profile`, then the interactive prompt.
fn resolve_target(args: &cli::Args) -> Result<DatabaseTarget> {
    if let Some(url) = &args.database_url {
        return DatabaseTarget::from_url(url);
    }
    let profile = match args.profile {
        Some(profile) => profile,
        None => config::prompt_profile(&mut io::stdin().lock(), &mut io::stdout())?,
    };
    info!("Using the {profile} database profile");
    DatabaseTarget::for_profile(profile, config::env_lookup)
}

fn open_store(args: &cli::Args) -> Result<Box<dyn SongStore>> {
    store::open(&resolve_target(args)?)
}

fn spotify_auth(args: &cli::Args) -> Result<SpotifyAuth> {
    let cache_path = match &args.token_cache {
        Some(path) => path.clone(),
        None => config::default_token_cache_path()?,
    };
    Ok(SpotifyAuth::new(
        config::oauth_config_from_env()?,
        TokenCache::new(cache_path),
    ))
}

fn pick_song_of_the_day(store: &mut dyn SongStore) -> Result<()> {
    let today = Local::now().date_naive();
    match sotd::pick(store, today, &SotdFilter::default(), &mut rand::thread_rng())? {
        DailyPick::Chosen { song_id } => println!("Song of the day for {today}: {song_id}"),
        DailyPick::AlreadyChosen { song_id } => {
            println!("Song of the day for {today} was already {song_id}");
        }
        DailyPick::NoCandidates => println!("No song is eligible for song of the day."),
        DailyPick::NothingStored => {
            println!("No liked songs stored yet. Run `likesync sync` first.");
        }
    }
    Ok(())
}

fn list_songs(store: &mut dyn SongStore, limit: Option<usize>) -> Result<()> {
    if !store.table_exists()? {
        println!("No liked songs stored yet. Run `likesync sync` first.");
        return Ok(());
    }

    let songs = store.list_songs(limit)?;
    println!("{:>5}  {:<10}  {:<40}  {:<30}  {}", "#", "SOTD", "Title", "Artist", "Album");
    for song in &songs {
        let sotd = song
            .sotd_date
            .map(|date| date.to_string())
            .unwrap_or_default();
        println!(
            "{:>5}  {:<10}  {:<40}  {:<30}  {}",
            song.order_num,
            sotd,
            truncate(&song.title, 40),
            truncate(&song.artist_name, 30),
            song.album_name
        );
    }
    println!("{} songs", songs.len());
    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut short: String = text.chars().take(width.saturating_sub(1)).collect();
        short.push('…');
        short
    }
}
