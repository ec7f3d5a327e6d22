pub mod http;
pub mod reccobeats;
pub mod spotify;

use thiserror::Error;

use crate::models::{ArtistDetails, AudioFeatures, TrackDetails};
use crate::source::reccobeats::FeaturesClient;
use crate::source::spotify::SpotifyClient;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited by {url} after {attempts} attempts")]
    RateLimited { url: String, attempts: u32 },
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Remote lookups the enrichment workers depend on.
///
/// Implementations own transport concerns (auth headers, timeouts, retries). Payloads
/// are validated into typed records before they are returned.
pub trait RemoteSource: Send + Sync {
    fn track_details(&self, track_id: &str) -> Result<TrackDetails, FetchError>;

    fn artist_details(&self, artist_id: &str) -> Result<ArtistDetails, FetchError>;

    /// One logical call for many tracks. The result is aligned with `track_ids`;
    /// `None` marks a track the provider has no features for.
    fn batch_audio_features(
        &self,
        track_ids: &[String],
    ) -> Result<Vec<Option<AudioFeatures>>, FetchError>;
}

/// Spotify for details, ReccoBeats for audio features.
pub struct WebSource {
    spotify: SpotifyClient,
    features: FeaturesClient,
}

impl WebSource {
    pub fn new(spotify: SpotifyClient, features: FeaturesClient) -> Self {
        Self { spotify, features }
    }
}

impl RemoteSource for WebSource {
    fn track_details(&self, track_id: &str) -> Result<TrackDetails, FetchError> {
        self.spotify.track(track_id)
    }

    fn artist_details(&self, artist_id: &str) -> Result<ArtistDetails, FetchError> {
        self.spotify.artist(artist_id)
    }

    fn batch_audio_features(
        &self,
        track_ids: &[String],
    ) -> Result<Vec<Option<AudioFeatures>>, FetchError> {
        self.features.audio_features(track_ids)
    }
}
