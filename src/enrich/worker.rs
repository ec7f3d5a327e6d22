use std::sync::{Mutex, PoisonError};

use crossbeam::channel::Sender;
use tracing::{debug, info, warn};

use crate::database::Gateway;
use crate::enrich::report::{Enriched, FeatureStep};
use crate::models::{ArtistDetails, AudioFeatures, SeedPair, TrackDetails};
use crate::source::{FetchError, RemoteSource};

/// Per-item result sent to the coordinator as soon as the item is done.
#[derive(Debug)]
pub struct ItemEvent {
    pub chunk_id: usize,
    pub pair: SeedPair,
    pub result: Result<Enriched, FetchError>,
}

/// Enriches one chunk, one item at a time.
pub struct Worker<'a, S: ?Sized, G: ?Sized> {
    chunk_id: usize,
    source: &'a S,
    gateway: &'a G,
    feature_lock: &'a Mutex<()>,
}

impl<'a, S, G> Worker<'a, S, G>
where
    S: RemoteSource + ?Sized,
    G: Gateway + ?Sized,
{
    pub fn new(chunk_id: usize, source: &'a S, gateway: &'a G, feature_lock: &'a Mutex<()>) -> Self {
        Self {
            chunk_id,
            source,
            gateway,
            feature_lock,
        }
    }

    /// Processes the chunk in order, reporting each item on `events`, then runs the
    /// batched audio-feature pass for every track id in the chunk.
    pub fn run(&self, chunk: &[SeedPair], events: &Sender<ItemEvent>) -> FeatureStep {
        info!(chunk = self.chunk_id, items = chunk.len(), "Worker started");

        for (index, pair) in chunk.iter().enumerate() {
            debug!(
                chunk = self.chunk_id,
                position = index + 1,
                of = chunk.len(),
                track_id = %pair.track_id,
                "Processing track"
            );
            let event = ItemEvent {
                chunk_id: self.chunk_id,
                pair: pair.clone(),
                result: self.enrich(pair),
            };
            if events.send(event).is_err() {
                debug!(chunk = self.chunk_id, "Coordinator stopped listening");
            }
        }

        let track_ids: Vec<String> = chunk.iter().map(|p| p.track_id.clone()).collect();
        let step = self.store_features(&track_ids);
        info!(chunk = self.chunk_id, features = step.written(), "Worker finished");
        step
    }

    /// Fetches both records, then issues every write independently. A failed fetch
    /// means nothing is written for the item.
    pub fn enrich(&self, pair: &SeedPair) -> Result<Enriched, FetchError> {
        let (track, artist) = self.fetch(pair).inspect_err(|e| {
            warn!(
                chunk = self.chunk_id,
                track_id = %pair.track_id,
                artist_id = %pair.artist_id,
                error = %e,
                "Could not fetch details, skipping item"
            );
        })?;

        let mut enriched = Enriched::default();
        self.write_track(&track, &mut enriched);
        self.write_artist(&artist, &mut enriched);

        if enriched.write_failures > 0 {
            warn!(
                chunk = self.chunk_id,
                track_id = %pair.track_id,
                failed = enriched.write_failures,
                of = enriched.writes,
                "Some writes failed"
            );
        }
        Ok(enriched)
    }

    fn fetch(&self, pair: &SeedPair) -> Result<(TrackDetails, ArtistDetails), FetchError> {
        let track = self.source.track_details(&pair.track_id)?;
        let artist = self.source.artist_details(&pair.artist_id)?;
        Ok((track, artist))
    }

    fn write_track(&self, track: &TrackDetails, enriched: &mut Enriched) {
        enriched.record(self.gateway.upsert_track_popularity(&track.track_id, track.popularity));
        if let Some(album) = &track.album {
            enriched.record(self.gateway.upsert_album(album));
        }
    }

    fn write_artist(&self, artist: &ArtistDetails, enriched: &mut Enriched) {
        enriched.record(self.gateway.upsert_artist_details(artist));
        enriched.record(self.gateway.upsert_artist_popularity(&artist.artist_id, artist.popularity));
        for genre in &artist.genres {
            enriched.record(self.gateway.upsert_artist_genre(&artist.artist_id, genre));
        }
    }

    /// The lock covers the remote call only. Chunks never share track ids, so the
    /// writes can overlap.
    fn store_features(&self, track_ids: &[String]) -> FeatureStep {
        let lookup = {
            let _guard = self.feature_lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.source.batch_audio_features(track_ids)
        };

        let found: Vec<AudioFeatures> = match lookup {
            Ok(entries) => entries.into_iter().flatten().collect(),
            Err(e) => {
                warn!(chunk = self.chunk_id, tracks = track_ids.len(), error = %e, "Audio feature lookup failed");
                return FeatureStep::LookupFailed(e);
            }
        };
        debug!(chunk = self.chunk_id, requested = track_ids.len(), found = found.len(), "Audio features fetched");

        if self.gateway.upsert_audio_features_batch(&found) {
            FeatureStep::Written {
                requested: track_ids.len(),
                found: found.len(),
            }
        } else {
            FeatureStep::WriteFailed { found: found.len() }
        }
    }
}
