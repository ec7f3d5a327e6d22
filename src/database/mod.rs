pub mod insights;
pub mod repo;
pub mod schema;
pub mod seed;

use anyhow::Result;

use crate::models::{Album, ArtistDetails, AudioFeatures, SeedPair};

/// Write side of the derived tables plus the seed read.
///
/// Every write reports success as a `bool` and logs its own failure; nothing here is
/// allowed to panic a worker. Albums, artist details, genres and audio features are
/// insert-if-absent. Popularity rows are overwritten.
pub trait Gateway: Send + Sync {
    fn seed_pairs(&self) -> Result<Vec<SeedPair>>;

    fn upsert_track_popularity(&self, track_id: &str, popularity: i64) -> bool;

    fn upsert_album(&self, album: &Album) -> bool;

    fn upsert_artist_details(&self, artist: &ArtistDetails) -> bool;

    fn upsert_artist_popularity(&self, artist_id: &str, popularity: i64) -> bool;

    fn upsert_artist_genre(&self, artist_id: &str, genre: &str) -> bool;

    fn upsert_audio_features_batch(&self, features: &[AudioFeatures]) -> bool;
}
