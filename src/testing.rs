//! In-memory fakes for the source and gateway seams.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use anyhow::Result;

use crate::database::Gateway;
use crate::models::{Album, ArtistDetails, AudioFeatures, SeedPair, TrackDetails};
use crate::source::{FetchError, RemoteSource};

pub fn track(id: &str, popularity: i64, album_id: Option<&str>) -> TrackDetails {
    TrackDetails {
        track_id: id.into(),
        popularity,
        album: album_id.map(|album_id| Album {
            album_id: album_id.into(),
            name: format!("Album {album_id}"),
            release_date: Some("2024-05-01".into()),
            primary_artist_id: Some("a1".into()),
            external_url: Some(format!("https://open.spotify.com/album/{album_id}")),
            total_tracks: Some(12),
        }),
    }
}

pub fn artist(id: &str, genres: &[&str]) -> ArtistDetails {
    ArtistDetails {
        artist_id: id.into(),
        name: format!("Artist {id}"),
        genres: genres.iter().map(|g| g.to_string()).collect(),
        popularity: 60,
        followers: 1_000,
        external_url: Some(format!("https://open.spotify.com/artist/{id}")),
    }
}

pub fn features(track_id: &str) -> AudioFeatures {
    AudioFeatures {
        track_id: track_id.into(),
        danceability: 0.7,
        energy: 0.6,
        key: 2,
        loudness: -5.0,
        mode: 1,
        speechiness: 0.04,
        acousticness: 0.2,
        instrumentalness: 0.0,
        liveness: 0.1,
        valence: 0.5,
        tempo: 118.0,
        duration_ms: Some(200_000),
        time_signature: Some(4),
    }
}

/// Fixture-backed source. Ids in `fail_on` fail with a server error, a track id in
/// `panic_on` panics the calling thread.
#[derive(Default)]
pub struct FixtureSource {
    tracks: HashMap<String, TrackDetails>,
    artists: HashMap<String, ArtistDetails>,
    features: HashMap<String, AudioFeatures>,
    fail_on: HashSet<String>,
    panic_on: Option<String>,
    fail_features: bool,
    feature_delay: Duration,
    detail_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    feature_requests: Mutex<Vec<Vec<String>>>,
}

impl FixtureSource {
    pub fn with_track(mut self, track: TrackDetails) -> Self {
        self.tracks.insert(track.track_id.clone(), track);
        self
    }

    pub fn with_artist(mut self, artist: ArtistDetails) -> Self {
        self.artists.insert(artist.artist_id.clone(), artist);
        self
    }

    pub fn with_features(mut self, track_id: &str) -> Self {
        self.features.insert(track_id.into(), features(track_id));
        self
    }

    pub fn failing_on(mut self, id: &str) -> Self {
        self.fail_on.insert(id.into());
        self
    }

    pub fn panicking_on(mut self, track_id: &str) -> Self {
        self.panic_on = Some(track_id.into());
        self
    }

    pub fn failing_features(mut self) -> Self {
        self.fail_features = true;
        self
    }

    pub fn with_feature_delay(mut self, delay: Duration) -> Self {
        self.feature_delay = delay;
        self
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_feature_calls(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn feature_requests(&self) -> Vec<Vec<String>> {
        self.feature_requests.lock().unwrap().clone()
    }

    fn check(&self, id: &str) -> Result<(), FetchError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on.as_deref() == Some(id) {
            panic!("fixture panic on {id}");
        }
        if self.fail_on.contains(id) {
            return Err(FetchError::Status {
                url: format!("fixture://{id}"),
                status: 500,
            });
        }
        Ok(())
    }
}

impl RemoteSource for FixtureSource {
    fn track_details(&self, track_id: &str) -> Result<TrackDetails, FetchError> {
        self.check(track_id)?;
        self.tracks
            .get(track_id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(track_id.into()))
    }

    fn artist_details(&self, artist_id: &str) -> Result<ArtistDetails, FetchError> {
        self.check(artist_id)?;
        self.artists
            .get(artist_id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(artist_id.into()))
    }

    fn batch_audio_features(
        &self,
        track_ids: &[String],
    ) -> Result<Vec<Option<AudioFeatures>>, FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.feature_requests.lock().unwrap().push(track_ids.to_vec());
        if !self.feature_delay.is_zero() {
            thread::sleep(self.feature_delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_features {
            return Err(FetchError::RateLimited {
                url: "fixture://audio-features".into(),
                attempts: 4,
            });
        }
        Ok(track_ids.iter().map(|id| self.features.get(id).cloned()).collect())
    }
}

/// Gateway that records `table:key` for every accepted write.
#[derive(Default)]
pub struct RecordingGateway {
    seeds: Vec<SeedPair>,
    failing_tables: HashSet<&'static str>,
    writes: Mutex<Vec<String>>,
}

impl RecordingGateway {
    pub fn with_seeds(seeds: Vec<SeedPair>) -> Self {
        Self {
            seeds,
            ..Default::default()
        }
    }

    pub fn failing_table(mut self, table: &'static str) -> Self {
        self.failing_tables.insert(table);
        self
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    fn write(&self, table: &'static str, key: String) -> bool {
        if self.failing_tables.contains(table) {
            return false;
        }
        self.writes.lock().unwrap().push(format!("{table}:{key}"));
        true
    }
}

impl Gateway for RecordingGateway {
    fn seed_pairs(&self) -> Result<Vec<SeedPair>> {
        Ok(self.seeds.clone())
    }

    fn upsert_track_popularity(&self, track_id: &str, _popularity: i64) -> bool {
        self.write("track_popularity", track_id.into())
    }

    fn upsert_album(&self, album: &Album) -> bool {
        self.write("albums", album.album_id.clone())
    }

    fn upsert_artist_details(&self, artist: &ArtistDetails) -> bool {
        self.write("artist_details", artist.artist_id.clone())
    }

    fn upsert_artist_popularity(&self, artist_id: &str, _popularity: i64) -> bool {
        self.write("artist_popularity", artist_id.into())
    }

    fn upsert_artist_genre(&self, artist_id: &str, genre: &str) -> bool {
        self.write("artist_genres", format!("{artist_id}:{genre}"))
    }

    fn upsert_audio_features_batch(&self, features: &[AudioFeatures]) -> bool {
        if self.failing_tables.contains("audio_features") {
            return false;
        }
        features
            .iter()
            .all(|f| self.write("audio_features", f.track_id.clone()))
    }
}
