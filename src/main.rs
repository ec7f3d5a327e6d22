mod database;
mod enrich;
mod ingest;
mod models;
mod source;
mod utils;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam::channel::bounded;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::database::repo::SqliteStore;
use crate::enrich::coordinator::Coordinator;
use crate::ingest::playlist::{playlist_id_from, scan_playlist};
use crate::models::TrackSummary;
use crate::source::http::{HttpFetcher, RetryPolicy};
use crate::source::reccobeats::FeaturesClient;
use crate::source::spotify::{SearchQuery, SpotifyClient};
use crate::source::WebSource;
use crate::utils::config::{self, Settings};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file; defaults to the nearest `.env`
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[arg(short, long, global = true)]
    db_path: Option<PathBuf>,

    /// Maximum number of enrichment workers
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a playlist into the seed tables
    Seed {
        /// Playlist id or open.spotify.com link
        #[arg(short, long)]
        playlist: Option<String>,
    },
    /// Enrich every seeded track and artist
    Enrich {
        /// Refresh the seed tables from the playlist first
        #[arg(long)]
        seed_first: bool,
    },
    /// Search Spotify for tracks
    Search {
        query: Option<String>,
        #[arg(long)]
        track: Option<String>,
        #[arg(long)]
        artist: Option<String>,
        #[arg(long)]
        album: Option<String>,
        #[arg(long)]
        genre: Option<String>,
        #[arg(long)]
        year: Option<String>,
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
    /// Print row counts for every table
    Status,
    /// Rank artists, tracks, genres and albums from the enriched tables
    Insights {
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
    /// Write a settings template
    InitConfig {
        #[arg(default_value = config::ENV_FILE_NAME)]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut settings = config::load_settings(args.env_file.as_deref())?;
    if let Some(db_path) = args.db_path {
        settings.database_path = db_path;
    }
    if let Some(workers) = args.workers {
        settings.workers = workers;
    }

    match args.command {
        Command::Seed { playlist } => {
            let store = open_store(&settings)?;
            run_seed(&settings, &store, playlist.as_deref())?;
        }
        Command::Enrich { seed_first } => {
            let store = open_store(&settings)?;
            if seed_first {
                run_seed(&settings, &store, None)?;
            }
            let source = WebSource::new(spotify_client(&settings)?, features_client(&settings)?);
            let report = Coordinator::new(&source, &store)
                .with_max_workers(settings.workers)
                .with_progress(true)
                .run()?;
            println!("{report}");
        }
        Command::Search {
            query,
            track,
            artist,
            album,
            genre,
            year,
            limit,
        } => {
            let search = SearchQuery {
                text: query,
                track,
                artist,
                album,
                genre,
                year,
            };
            let Some(q) = search.to_query_string() else {
                bail!("Give a search query or at least one of --track, --artist, --album, --genre, --year");
            };
            let hits = spotify_client(&settings)?.search_tracks(&q, limit)?;
            if hits.is_empty() {
                println!("No tracks found for '{q}'");
            }
            for hit in hits {
                println!(
                    "{} - {} [{}] ({}) track={} artist={}",
                    hit.track_name,
                    hit.artist_name,
                    hit.album_name,
                    hit.release_date.as_deref().unwrap_or("?"),
                    hit.track_id,
                    hit.artist_id
                );
            }
        }
        Command::Status => {
            let store = open_store(&settings)?;
            println!("{:?}", settings.database_path);
            for (table, count) in store.table_counts()? {
                println!("  {table:<20} {count}");
            }
        }
        Command::Insights { limit } => {
            let store = open_store(&settings)?;
            print_insights(&store, limit)?;
        }
        Command::InitConfig { path } => {
            config::save_template(&path, &settings)?;
            println!("Wrote settings template to {:?}", path);
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_store(settings: &Settings) -> Result<SqliteStore> {
    info!("DB: {:?}", settings.database_path);
    SqliteStore::open_with(&settings.database_path, settings.pool_size, settings.checkout_timeout)
        .with_context(|| format!("Failed to open {:?}", settings.database_path))
}

fn print_insights(store: &SqliteStore, limit: u32) -> Result<()> {
    println!("Top artists by popularity:");
    for artist in store.top_artists(limit)? {
        println!(
            "  {:>3}  {} ({} followers) [{}]",
            artist.popularity,
            artist.name,
            artist.followers,
            artist.genres.join(", ")
        );
    }

    println!("Top tracks by popularity:");
    for track in store.top_tracks(limit)? {
        println!("  {:>3}  {} - {}", track.popularity, track.track_name, track.artist_name);
    }

    println!("Genres by average artist popularity:");
    for genre in store.genre_popularity(limit)? {
        println!("  {:>5.1}  {} ({} artists)", genre.avg_popularity, genre.genre, genre.artists);
    }

    println!("Albums by average track popularity:");
    for album in store.top_albums(limit)? {
        println!(
            "  {:>5.1}  {} - {} ({} tracks)",
            album.avg_popularity, album.album_name, album.artist_name, album.tracks
        );
    }

    match store.feature_averages()? {
        Some(avg) => {
            println!("Average audio features over {} seeded tracks:", avg.tracks);
            println!(
                "  danceability {:.3}  energy {:.3}  loudness {:.2} dB  speechiness {:.3}  acousticness {:.3}",
                avg.danceability, avg.energy, avg.loudness, avg.speechiness, avg.acousticness
            );
            println!(
                "  instrumentalness {:.3}  liveness {:.3}  valence {:.3}  tempo {:.1} bpm",
                avg.instrumentalness, avg.liveness, avg.valence, avg.tempo
            );
        }
        None => println!("No audio features stored for seeded tracks yet"),
    }
    Ok(())
}

fn retry_policy(settings: &Settings) -> RetryPolicy {
    RetryPolicy {
        max_retries: settings.max_retries,
        ..RetryPolicy::default()
    }
}

fn spotify_client(settings: &Settings) -> Result<SpotifyClient> {
    let token = settings.require_token()?.to_string();
    let http = HttpFetcher::new(settings.http_timeout, Some(token), retry_policy(settings))?;
    Ok(SpotifyClient::new(http, &settings.spotify_api_base))
}

fn features_client(settings: &Settings) -> Result<FeaturesClient> {
    let http = HttpFetcher::new(settings.http_timeout, None, retry_policy(settings))?;
    Ok(FeaturesClient::new(http, &settings.features_api_base))
}

/// Pager thread feeds a bounded channel, writer thread drains it into the seed tables.
fn run_seed(settings: &Settings, store: &SqliteStore, playlist: Option<&str>) -> Result<usize> {
    let playlist_id = playlist_id_from(playlist.unwrap_or(&settings.playlist_id)).to_string();
    let client = spotify_client(settings)?;
    let mut writer = store.seed_writer()?;

    info!("Seeding from playlist {}", playlist_id);
    let (tx, rx) = bounded::<TrackSummary>(1024);

    let pager_handle = thread::spawn(move || {
        info!("Pager started");
        let result = scan_playlist(&client, &playlist_id, tx);
        match &result {
            Ok(sent) => info!("Pager finished, {} tracks", sent),
            Err(e) => error!("Pager failed: {}", e),
        }
        result
    });

    let writer_handle = thread::spawn(move || -> Result<usize> {
        info!("Seed writer started");
        for track in rx {
            if let Err(e) = writer.add(track) {
                error!("Failed to add track to seed tables: {:#}", e);
            }
        }
        writer.flush().context("Failed to flush remaining tracks")?;
        info!("Seed writer finished");
        Ok(writer.written())
    });

    let fetched = pager_handle
        .join()
        .map_err(|_| anyhow!("Playlist pager thread panicked"))?;
    let written = writer_handle
        .join()
        .map_err(|_| anyhow!("Seed writer thread panicked"))??;

    let fetched = fetched.context("Playlist fetch failed")?;
    println!("Seeded {written} new tracks ({fetched} fetched from the playlist)");
    Ok(written)
}
