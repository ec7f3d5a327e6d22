use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::database::repo::DEFAULT_CHECKOUT_TIMEOUT;
use crate::enrich::partition::DEFAULT_MAX_CHUNKS;
use crate::ingest::playlist::DEFAULT_PLAYLIST_ID;
use crate::source::{reccobeats, spotify};

pub const ENV_FILE_NAME: &str = ".env";

const KEYS: [&str; 10] = [
    "SPOTIFY_ACCESS_TOKEN",
    "SPOTIFY_API_BASE",
    "FEATURES_API_BASE",
    "DATABASE_PATH",
    "ENRICH_WORKERS",
    "DB_POOL_SIZE",
    "DB_CHECKOUT_TIMEOUT_SECS",
    "HTTP_MAX_RETRIES",
    "HTTP_TIMEOUT_SECS",
    "PLAYLIST_ID",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub access_token: Option<String>,
    pub spotify_api_base: String,
    pub features_api_base: String,
    pub database_path: PathBuf,
    pub workers: usize,
    pub pool_size: u32,
    pub checkout_timeout: Duration,
    pub max_retries: u32,
    pub http_timeout: Duration,
    pub playlist_id: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            access_token: None,
            spotify_api_base: spotify::DEFAULT_API_BASE.to_string(),
            features_api_base: reccobeats::DEFAULT_API_BASE.to_string(),
            database_path: PathBuf::from("music.db"),
            workers: DEFAULT_MAX_CHUNKS,
            pool_size: 10,
            checkout_timeout: DEFAULT_CHECKOUT_TIMEOUT,
            max_retries: 3,
            http_timeout: Duration::from_secs(30),
            playlist_id: DEFAULT_PLAYLIST_ID.to_string(),
        }
    }
}

impl Settings {
    /// Token for the Spotify API; required by every command that talks to it.
    pub fn require_token(&self) -> Result<&str> {
        self.access_token
            .as_deref()
            .ok_or_else(|| anyhow!("SPOTIFY_ACCESS_TOKEN is not set (env file or environment)"))
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim().trim_matches('"');
        match key.trim() {
            "SPOTIFY_ACCESS_TOKEN" => self.access_token = Some(value.to_string()).filter(|v| !v.is_empty()),
            "SPOTIFY_API_BASE" => self.spotify_api_base = value.to_string(),
            "FEATURES_API_BASE" => self.features_api_base = value.to_string(),
            "DATABASE_PATH" => self.database_path = PathBuf::from(value),
            "ENRICH_WORKERS" => self.workers = parse_number(key, value)?,
            "DB_POOL_SIZE" => self.pool_size = parse_number(key, value)?,
            "DB_CHECKOUT_TIMEOUT_SECS" => {
                self.checkout_timeout = Duration::from_secs(parse_number(key, value)?)
            }
            "HTTP_MAX_RETRIES" => self.max_retries = parse_number(key, value)?,
            "HTTP_TIMEOUT_SECS" => self.http_timeout = Duration::from_secs(parse_number(key, value)?),
            "PLAYLIST_ID" => self.playlist_id = value.to_string(),
            other => debug!(key = other, "Ignoring unknown setting"),
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("{} must be a non-negative integer, got '{}'", key.trim(), value))
}

/// Defaults, then the env file (explicit path or the nearest `.env`), then the
/// process environment.
pub fn load_settings(env_file: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();

    let path = match env_file {
        Some(path) => Some(path.to_path_buf()),
        None => find_file(ENV_FILE_NAME, 3).ok(),
    };
    if let Some(path) = path {
        load_from_env(&path, &mut settings)
            .with_context(|| format!("Failed to load settings from {:?}", path))?;
        info!("Loaded settings from {:?}", path);
    }

    for key in KEYS {
        if let Ok(value) = std::env::var(key) {
            settings.apply(key, &value)?;
        }
    }
    Ok(settings)
}

fn find_file(filename: &str, max_depth: usize) -> Result<PathBuf> {
    let root = std::env::current_dir()?;

    let search_result = WalkDir::new(&root)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name() == filename);

    if let Some(entry) = search_result {
        return Ok(entry.path().to_path_buf());
    }

    // Running from a subdirectory of the project
    if let Some(parent) = root.parent() {
        let candidate = parent.join(filename);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    Err(anyhow!("Could not find file '{}' in nearby directories.", filename))
}

fn load_from_env(path: &Path, settings: &mut Settings) -> Result<()> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            settings.apply(key, value)?;
        }
    }
    Ok(())
}

/// Writes a template env file with every key; the token is left blank.
pub fn save_template(path: &Path, settings: &Settings) -> Result<()> {
    if path.exists() {
        return Err(anyhow!("{:?} already exists", path));
    }
    let mut file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    writeln!(file, "# Spotify bearer token, obtained outside this tool")?;
    writeln!(file, "SPOTIFY_ACCESS_TOKEN=")?;
    writeln!(file, "SPOTIFY_API_BASE={}", settings.spotify_api_base)?;
    writeln!(file, "FEATURES_API_BASE={}", settings.features_api_base)?;
    writeln!(file, "DATABASE_PATH={}", settings.database_path.display())?;
    writeln!(file, "ENRICH_WORKERS={}", settings.workers)?;
    writeln!(file, "DB_POOL_SIZE={}", settings.pool_size)?;
    writeln!(file, "DB_CHECKOUT_TIMEOUT_SECS={}", settings.checkout_timeout.as_secs())?;
    writeln!(file, "HTTP_MAX_RETRIES={}", settings.max_retries)?;
    writeln!(file, "HTTP_TIMEOUT_SECS={}", settings.http_timeout.as_secs())?;
    writeln!(file, "PLAYLIST_ID={}", settings.playlist_id)?;
    Ok(())
}
