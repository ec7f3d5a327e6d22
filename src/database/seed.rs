use anyhow::{Context, Result};
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use crate::models::TrackSummary;

/// Buffers playlist tracks and writes them to the seed tables in one transaction per
/// flush. Existing rows are left untouched, so re-seeding keeps the original order.
pub struct SeedWriter {
    conn: PooledConnection<SqliteConnectionManager>,
    buffer: Vec<TrackSummary>,
    buffer_limit: usize,
    written: usize,
}

impl SeedWriter {
    pub(crate) fn new(conn: PooledConnection<SqliteConnectionManager>) -> Self {
        Self {
            conn,
            buffer: Vec::new(),
            buffer_limit: 500,
            written: 0,
        }
    }

    pub fn add(&mut self, track: TrackSummary) -> Result<()> {
        self.buffer.push(track);
        if self.buffer.len() >= self.buffer_limit {
            self.flush()?;
        }
        Ok(())
    }

    /// Rows inserted so far; tracks already present are not counted.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction().context("Failed to begin transaction")?;
        let mut inserted = 0;

        {
            let mut stmt_info = tx.prepare(
                "INSERT INTO track_info (track_id, track_name, artist_name, artist_id, release_date)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(track_id) DO NOTHING",
            )?;

            let mut stmt_top = tx.prepare(
                "INSERT INTO top_hundred_tracks (track_id, track_name, artist_name, album_name, release_date)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(track_id) DO NOTHING",
            )?;

            for track in &self.buffer {
                stmt_info
                    .execute(params![
                        track.track_id,
                        track.track_name,
                        track.artist_name,
                        track.artist_id,
                        track.release_date
                    ])
                    .with_context(|| format!("Failed to insert track_info for {}", track.track_id))?;

                inserted += stmt_top
                    .execute(params![
                        track.track_id,
                        track.track_name,
                        track.artist_name,
                        track.album_name,
                        track.release_date
                    ])
                    .with_context(|| format!("Failed to insert top_hundred_tracks for {}", track.track_id))?;
            }
        }

        tx.commit().context("Failed to commit transaction")?;
        self.written += inserted;
        self.buffer.clear();
        Ok(())
    }
}
