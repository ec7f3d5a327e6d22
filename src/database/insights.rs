use anyhow::{Context, Result};
use rusqlite::{params, Row};

use crate::database::repo::SqliteStore;

#[derive(Debug, Clone, PartialEq)]
pub struct ArtistRank {
    pub name: String,
    pub popularity: i64,
    pub followers: i64,
    pub genres: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackRank {
    pub track_name: String,
    pub artist_name: String,
    pub popularity: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenreStat {
    pub genre: String,
    pub artists: i64,
    pub avg_popularity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlbumRank {
    pub album_name: String,
    pub artist_name: String,
    pub tracks: i64,
    pub avg_popularity: f64,
}

/// Mean audio features over the seeded tracks that have them.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureAverages {
    pub tracks: i64,
    pub danceability: f64,
    pub energy: f64,
    pub loudness: f64,
    pub speechiness: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub valence: f64,
    pub tempo: f64,
}

impl SqliteStore {
    pub fn top_artists(&self, limit: u32) -> Result<Vec<ArtistRank>> {
        self.ranked(
            "top artists",
            "SELECT d.artist_name, COALESCE(p.popularity, d.popularity) AS pop, d.followers, d.genres
             FROM artist_details d
             LEFT JOIN artist_popularity p ON p.artist_id = d.artist_id
             ORDER BY pop DESC, d.artist_name
             LIMIT ?1",
            limit,
            |row| {
                let genres: String = row.get(3)?;
                Ok(ArtistRank {
                    name: row.get(0)?,
                    popularity: row.get(1)?,
                    followers: row.get(2)?,
                    genres: genres
                        .split(',')
                        .filter(|g| !g.is_empty())
                        .map(str::to_string)
                        .collect(),
                })
            },
        )
    }

    pub fn top_tracks(&self, limit: u32) -> Result<Vec<TrackRank>> {
        self.ranked(
            "top tracks",
            "SELECT t.track_name, t.artist_name, p.popularity
             FROM track_info t
             JOIN track_popularity p ON p.track_id = t.track_id
             ORDER BY p.popularity DESC, t.track_name
             LIMIT ?1",
            limit,
            |row| {
                Ok(TrackRank {
                    track_name: row.get(0)?,
                    artist_name: row.get(1)?,
                    popularity: row.get(2)?,
                })
            },
        )
    }

    pub fn genre_popularity(&self, limit: u32) -> Result<Vec<GenreStat>> {
        self.ranked(
            "genre popularity",
            "SELECT g.genre, COUNT(*), AVG(p.popularity) AS avg_pop
             FROM artist_genres g
             JOIN artist_popularity p ON p.artist_id = g.artist_id
             GROUP BY g.genre
             ORDER BY avg_pop DESC, g.genre
             LIMIT ?1",
            limit,
            |row| {
                Ok(GenreStat {
                    genre: row.get(0)?,
                    artists: row.get(1)?,
                    avg_popularity: row.get(2)?,
                })
            },
        )
    }

    /// Albums of the seeded tracks, ranked by the mean popularity of those tracks.
    pub fn top_albums(&self, limit: u32) -> Result<Vec<AlbumRank>> {
        self.ranked(
            "top albums",
            "SELECT t.album_name, i.artist_name, COUNT(*), AVG(p.popularity) AS avg_pop
             FROM top_hundred_tracks t
             JOIN track_info i ON i.track_id = t.track_id
             JOIN track_popularity p ON p.track_id = t.track_id
             GROUP BY t.album_name, i.artist_name
             ORDER BY avg_pop DESC, t.album_name
             LIMIT ?1",
            limit,
            |row| {
                Ok(AlbumRank {
                    album_name: row.get(0)?,
                    artist_name: row.get(1)?,
                    tracks: row.get(2)?,
                    avg_popularity: row.get(3)?,
                })
            },
        )
    }

    /// `None` until at least one seeded track has audio features.
    pub fn feature_averages(&self) -> Result<Option<FeatureAverages>> {
        let conn = self.pool.get().context("No database connection for feature averages")?;
        let averages = conn
            .query_row(
                "SELECT COUNT(*), AVG(a.danceability), AVG(a.energy), AVG(a.loudness),
                        AVG(a.speechiness), AVG(a.acousticness), AVG(a.instrumentalness),
                        AVG(a.liveness), AVG(a.valence), AVG(a.tempo)
                 FROM audio_features a
                 JOIN top_hundred_tracks t ON t.track_id = a.track_id",
                [],
                |row| {
                    let tracks: i64 = row.get(0)?;
                    if tracks == 0 {
                        return Ok(None);
                    }
                    Ok(Some(FeatureAverages {
                        tracks,
                        danceability: row.get(1)?,
                        energy: row.get(2)?,
                        loudness: row.get(3)?,
                        speechiness: row.get(4)?,
                        acousticness: row.get(5)?,
                        instrumentalness: row.get(6)?,
                        liveness: row.get(7)?,
                        valence: row.get(8)?,
                        tempo: row.get(9)?,
                    }))
                },
            )
            .context("Failed to compute feature averages")?;
        Ok(averages)
    }

    fn ranked<T, F>(&self, what: &str, sql: &str, limit: u32, map: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self
            .pool
            .get()
            .with_context(|| format!("No database connection for {what}"))?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![limit], map)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to read {what}"))?;
        Ok(rows)
    }
}
