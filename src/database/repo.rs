use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, Params};
use tracing::{debug, warn};

use crate::database::schema::{SCHEMA, TABLES};
use crate::database::seed::SeedWriter;
use crate::database::Gateway;
use crate::models::{Album, ArtistDetails, AudioFeatures, SeedPair};

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(15);
// r2d2 rejects a zero timeout
const MIN_CHECKOUT_TIMEOUT: Duration = Duration::from_millis(10);

/// SQLite behind a bounded r2d2 pool. Each write checks out one connection for one
/// statement and hands it back.
#[derive(Clone)]
pub struct SqliteStore {
    pub(super) pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    #[cfg(test)]
    pub fn open(path: &Path, pool_size: u32) -> Result<Self> {
        Self::open_with(path, pool_size, DEFAULT_CHECKOUT_TIMEOUT)
    }

    /// Like `open`, with how long a write waits for a free connection before it is
    /// dropped as failed.
    pub fn open_with(path: &Path, pool_size: u32, checkout_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {:?}", parent))?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch("PRAGMA journal_mode = WAL;")
        });
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(checkout_timeout.max(MIN_CHECKOUT_TIMEOUT))
            .build(manager)
            .context("Failed to open database")?;

        pool.get()
            .context("Failed to open database")?
            .execute_batch(SCHEMA)
            .context("Failed to initialize schema")?;

        Ok(Self { pool })
    }

    pub fn seed_writer(&self) -> Result<SeedWriter> {
        let conn = self.pool.get().context("No database connection for seed writer")?;
        Ok(SeedWriter::new(conn))
    }

    pub fn table_counts(&self) -> Result<Vec<(&'static str, i64)>> {
        let conn = self.pool.get().context("No database connection")?;
        TABLES
            .iter()
            .map(|table| -> Result<(&'static str, i64)> {
                let count: i64 = conn
                    .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                    .with_context(|| format!("Failed to count rows in {table}"))?;
                Ok((*table, count))
            })
            .collect()
    }

    fn connection(&self, table: &str) -> Option<PooledConnection<SqliteConnectionManager>> {
        match self.pool.get() {
            Ok(conn) => Some(conn),
            Err(e) => {
                warn!(table, error = %e, "No database connection available, write dropped");
                None
            }
        }
    }

    fn execute<P: Params>(&self, table: &str, key: &str, sql: &str, params: P) -> bool {
        let Some(conn) = self.connection(table) else {
            return false;
        };
        match conn.execute(sql, params) {
            Ok(changed) => {
                debug!(table, key, changed, "Upsert applied");
                true
            }
            Err(e) => {
                warn!(table, key, error = %e, "Upsert failed");
                false
            }
        }
    }
}

fn insert_features(conn: &mut Connection, features: &[AudioFeatures]) -> rusqlite::Result<usize> {
    let tx = conn.transaction()?;
    let mut inserted = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO audio_features (track_id, danceability, energy, key, loudness, mode,
                 speechiness, acousticness, instrumentalness, liveness, valence, tempo,
                 duration_ms, time_signature)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(track_id) DO NOTHING",
        )?;
        for f in features {
            inserted += stmt.execute(params![
                f.track_id,
                f.danceability,
                f.energy,
                f.key,
                f.loudness,
                f.mode,
                f.speechiness,
                f.acousticness,
                f.instrumentalness,
                f.liveness,
                f.valence,
                f.tempo,
                f.duration_ms,
                f.time_signature
            ])?;
        }
    }
    tx.commit()?;
    Ok(inserted)
}

impl Gateway for SqliteStore {
    fn seed_pairs(&self) -> Result<Vec<SeedPair>> {
        let conn = self.pool.get().context("No database connection for seed read")?;
        let mut stmt = conn.prepare(
            "SELECT t.track_id, i.artist_id
             FROM top_hundred_tracks t
             JOIN track_info i ON i.track_id = t.track_id
             ORDER BY t.rowid",
        )?;
        let pairs = stmt
            .query_map([], |row| Ok(SeedPair::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read seed pairs")?;
        Ok(pairs)
    }

    fn upsert_track_popularity(&self, track_id: &str, popularity: i64) -> bool {
        self.execute(
            "track_popularity",
            track_id,
            "INSERT INTO track_popularity (track_id, popularity) VALUES (?1, ?2)
             ON CONFLICT(track_id) DO UPDATE SET popularity = excluded.popularity",
            params![track_id, popularity],
        )
    }

    fn upsert_album(&self, album: &Album) -> bool {
        self.execute(
            "albums",
            &album.album_id,
            "INSERT INTO albums (album_id, album_name, release_date, artist_id, spotify_url, total_tracks)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(album_id) DO NOTHING",
            params![
                album.album_id,
                album.name,
                album.release_date,
                album.primary_artist_id,
                album.external_url,
                album.total_tracks
            ],
        )
    }

    fn upsert_artist_details(&self, artist: &ArtistDetails) -> bool {
        self.execute(
            "artist_details",
            &artist.artist_id,
            "INSERT INTO artist_details (artist_id, artist_name, genres, popularity, followers, spotify_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(artist_id) DO NOTHING",
            params![
                artist.artist_id,
                artist.name,
                artist.genres_csv(),
                artist.popularity,
                artist.followers,
                artist.external_url
            ],
        )
    }

    fn upsert_artist_popularity(&self, artist_id: &str, popularity: i64) -> bool {
        self.execute(
            "artist_popularity",
            artist_id,
            "INSERT INTO artist_popularity (artist_id, popularity) VALUES (?1, ?2)
             ON CONFLICT(artist_id) DO UPDATE SET popularity = excluded.popularity",
            params![artist_id, popularity],
        )
    }

    fn upsert_artist_genre(&self, artist_id: &str, genre: &str) -> bool {
        self.execute(
            "artist_genres",
            artist_id,
            "INSERT INTO artist_genres (artist_id, genre) VALUES (?1, ?2)
             ON CONFLICT(artist_id, genre) DO NOTHING",
            params![artist_id, genre],
        )
    }

    fn upsert_audio_features_batch(&self, features: &[AudioFeatures]) -> bool {
        if features.is_empty() {
            return true;
        }
        let Some(mut conn) = self.connection("audio_features") else {
            return false;
        };
        match insert_features(&mut conn, features) {
            Ok(inserted) => {
                debug!(table = "audio_features", offered = features.len(), inserted, "Batch applied");
                true
            }
            Err(e) => {
                warn!(table = "audio_features", count = features.len(), error = %e, "Batch upsert failed");
                false
            }
        }
    }
}
