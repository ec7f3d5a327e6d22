use std::any::Any;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use crossbeam::channel::unbounded;
use crossbeam::thread;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use crate::database::Gateway;
use crate::enrich::partition::{partition, DEFAULT_MAX_CHUNKS};
use crate::enrich::report::{BatchReport, ChunkOutcome};
use crate::enrich::worker::{ItemEvent, Worker};
use crate::source::RemoteSource;

/// Runs one enrichment batch over the seed table.
///
/// Owns the worker handles and the lock that serializes batched feature lookups.
/// Workers report items over a channel; a worker that panics is logged and its chunk
/// is reported as aborted without touching the others.
pub struct Coordinator<'a, S: ?Sized, G: ?Sized> {
    source: &'a S,
    gateway: &'a G,
    max_workers: usize,
    show_progress: bool,
}

impl<'a, S, G> Coordinator<'a, S, G>
where
    S: RemoteSource + ?Sized,
    G: Gateway + ?Sized,
{
    pub fn new(source: &'a S, gateway: &'a G) -> Self {
        Self {
            source,
            gateway,
            max_workers: DEFAULT_MAX_CHUNKS,
            show_progress: false,
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn run(&self) -> Result<BatchReport> {
        let seeds = self.gateway.seed_pairs().context("Failed to read seed pairs")?;
        if seeds.is_empty() {
            info!("No seed pairs to enrich");
            return Ok(BatchReport::default());
        }

        let chunks = partition(&seeds, self.max_workers);
        info!(seeds = seeds.len(), workers = chunks.len(), "Starting enrichment");

        let mut outcomes: Vec<ChunkOutcome> = chunks
            .iter()
            .enumerate()
            .map(|(chunk_id, chunk)| ChunkOutcome::new(chunk_id, chunk.len()))
            .collect();
        let feature_lock = Mutex::new(());
        let progress = self.progress_bar(seeds.len());
        let (tx, rx) = unbounded::<ItemEvent>();

        thread::scope(|scope| {
            let handles: Vec<_> = chunks
                .iter()
                .enumerate()
                .map(|(chunk_id, chunk)| {
                    let worker = Worker::new(chunk_id, self.source, self.gateway, &feature_lock);
                    let tx = tx.clone();
                    scope.spawn(move |_| worker.run(chunk, &tx))
                })
                .collect();
            // Drop the original tx so the loop below ends once every worker is gone
            drop(tx);

            for event in rx.iter() {
                progress.inc(1);
                outcomes[event.chunk_id].record(event.pair, event.result);
            }

            for (chunk_id, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(step) => outcomes[chunk_id].features = step,
                    Err(payload) => {
                        let reason = panic_message(&*payload);
                        error!(chunk = chunk_id, reason = %reason, "Worker aborted");
                        outcomes[chunk_id].aborted = Some(reason);
                    }
                }
            }
        })
        .map_err(|_| anyhow!("Enrichment worker scope panicked"))?;
        progress.finish_and_clear();

        let report = BatchReport {
            seeds: seeds.len(),
            chunks: outcomes,
        };
        if report.is_clean() {
            info!(enriched = report.enriched(), features = report.features_written(), "Enrichment completed");
        } else {
            warn!(
                enriched = report.enriched(),
                fetch_failures = report.fetch_failures(),
                write_failures = report.write_failures(),
                aborted = report.aborted_chunks(),
                not_attempted = report.not_attempted(),
                "Enrichment completed with failures"
            );
        }
        Ok(report)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} tracks") {
            bar.set_style(style);
        }
        bar
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repo::SqliteStore;
    use crate::enrich::report::FeatureStep;
    use crate::models::{SeedPair, TrackSummary};
    use crate::testing::{artist, track, FixtureSource, RecordingGateway};
    use std::time::Duration;

    fn seeds(pairs: &[(&str, &str)]) -> Vec<SeedPair> {
        pairs.iter().map(|(t, a)| SeedPair::new(*t, *a)).collect()
    }

    #[test]
    fn test_empty_seed_list_spawns_nothing_and_writes_nothing() {
        let source = FixtureSource::default();
        let gateway = RecordingGateway::default();

        let report = Coordinator::new(&source, &gateway).run().unwrap();

        assert_eq!(report.seeds, 0);
        assert!(report.chunks.is_empty());
        assert!(gateway.writes().is_empty());
        assert_eq!(source.detail_calls(), 0);
        assert!(source.feature_requests().is_empty());
    }

    #[test]
    fn test_three_seeds_two_workers_against_sqlite() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = SqliteStore::open(&dir.path().join("music.db"), 4)?;
        let mut writer = store.seed_writer()?;
        for (track_id, artist_id) in [("t1", "a1"), ("t2", "a2"), ("t3", "a1")] {
            writer.add(TrackSummary {
                track_id: track_id.into(),
                track_name: track_id.into(),
                artist_id: artist_id.into(),
                artist_name: artist_id.into(),
                album_name: "Album".into(),
                release_date: None,
            })?;
        }
        writer.flush()?;
        drop(writer);

        let source = FixtureSource::default()
            .with_track(track("t1", 11, Some("al1")))
            .with_track(track("t2", 22, Some("al2")))
            .with_track(track("t3", 33, Some("al1")))
            .with_artist(artist("a1", &["pop", "dance pop"]))
            .with_artist(artist("a2", &["jazz"]))
            .with_features("t1")
            .with_features("t2");

        let report = Coordinator::new(&source, &store).with_max_workers(2).run()?;

        assert_eq!(report.chunks.iter().map(|c| c.size).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(report.enriched(), 3);
        assert_eq!(report.fetch_failures(), 0);
        assert_eq!(report.write_failures(), 0);
        assert_eq!(report.features_written(), 2);

        let counts: std::collections::HashMap<_, _> = store.table_counts()?.into_iter().collect();
        assert_eq!(counts["track_popularity"], 3);
        assert_eq!(counts["albums"], 2);
        assert_eq!(counts["artist_details"], 2);
        assert_eq!(counts["artist_popularity"], 2);
        assert_eq!(counts["artist_genres"], 3);
        assert_eq!(counts["audio_features"], 2);

        // Re-running is safe and changes nothing but popularity.
        let again = Coordinator::new(&source, &store).with_max_workers(2).run()?;
        assert!(again.is_clean());
        let counts_again: std::collections::HashMap<_, _> = store.table_counts()?.into_iter().collect();
        assert_eq!(counts, counts_again);
        Ok(())
    }

    #[test]
    fn test_feature_lookups_never_overlap() {
        let pairs: Vec<(String, String)> = (0..10).map(|i| (format!("t{i}"), "a1".to_string())).collect();
        let mut source = FixtureSource::default()
            .with_artist(artist("a1", &["pop"]))
            .with_feature_delay(Duration::from_millis(25));
        for (track_id, _) in &pairs {
            source = source.with_track(track(track_id, 50, None)).with_features(track_id);
        }
        let gateway = RecordingGateway::with_seeds(
            pairs.iter().map(|(t, a)| SeedPair::new(t.as_str(), a.as_str())).collect(),
        );

        let report = Coordinator::new(&source, &gateway).run().unwrap();

        assert_eq!(report.chunks.len(), 5);
        assert_eq!(source.feature_requests().len(), 5);
        assert_eq!(source.max_concurrent_feature_calls(), 1);
        assert_eq!(report.features_written(), 10);
    }

    #[test]
    fn test_panicking_worker_is_isolated() {
        let source = FixtureSource::default()
            .with_track(track("t1", 1, None))
            .with_track(track("t2", 2, None))
            .with_track(track("t3", 3, None))
            .with_track(track("t4", 4, None))
            .with_artist(artist("a1", &[]))
            .panicking_on("t3");
        let gateway = RecordingGateway::with_seeds(seeds(&[("t1", "a1"), ("t2", "a1"), ("t3", "a1"), ("t4", "a1")]));

        let report = Coordinator::new(&source, &gateway).with_max_workers(2).run().unwrap();

        let broken = &report.chunks[1];
        assert!(broken.aborted.as_deref().unwrap().contains("fixture panic on t3"));
        assert_eq!(broken.not_attempted(), 2);
        assert!(matches!(broken.features, FeatureStep::NotRun));

        let healthy = &report.chunks[0];
        assert!(healthy.aborted.is_none());
        assert_eq!(healthy.enriched, 2);
        assert_eq!(report.aborted_chunks(), 1);

        let writes = gateway.writes();
        assert!(writes.contains(&"track_popularity:t1".to_string()));
        assert!(writes.contains(&"track_popularity:t2".to_string()));
        assert!(!writes.contains(&"track_popularity:t4".to_string()));
    }

    #[test]
    fn test_fetch_failures_are_listed_in_the_report() {
        let source = FixtureSource::default()
            .with_track(track("t1", 1, None))
            .with_artist(artist("a1", &["pop"]));
        let gateway = RecordingGateway::with_seeds(seeds(&[("t1", "a1"), ("missing", "a1")]));

        let report = Coordinator::new(&source, &gateway).run().unwrap();

        assert_eq!(report.enriched(), 1);
        let failed: Vec<_> = report.failures().map(|f| f.pair.track_id.as_str()).collect();
        assert_eq!(failed, vec!["missing"]);
        assert!(!report.is_clean());
    }
}
