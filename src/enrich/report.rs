use std::fmt;

use crate::models::SeedPair;
use crate::source::FetchError;

/// Writes issued for one successfully fetched item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Enriched {
    pub writes: usize,
    pub write_failures: usize,
}

impl Enriched {
    pub(crate) fn record(&mut self, ok: bool) {
        self.writes += 1;
        if !ok {
            self.write_failures += 1;
        }
    }
}

#[derive(Debug)]
pub struct ItemFailure {
    pub pair: SeedPair,
    pub error: FetchError,
}

/// What happened to a chunk's batched audio-feature pass.
#[derive(Debug)]
pub enum FeatureStep {
    /// The worker never got there.
    NotRun,
    Written { requested: usize, found: usize },
    LookupFailed(FetchError),
    WriteFailed { found: usize },
}

impl FeatureStep {
    pub fn written(&self) -> usize {
        match self {
            FeatureStep::Written { found, .. } => *found,
            _ => 0,
        }
    }
}

#[derive(Debug)]
pub struct ChunkOutcome {
    pub chunk_id: usize,
    pub size: usize,
    pub enriched: usize,
    pub write_failures: usize,
    pub failures: Vec<ItemFailure>,
    pub features: FeatureStep,
    /// Panic message when the worker died before finishing its chunk.
    pub aborted: Option<String>,
}

impl ChunkOutcome {
    pub fn new(chunk_id: usize, size: usize) -> Self {
        Self {
            chunk_id,
            size,
            enriched: 0,
            write_failures: 0,
            failures: Vec::new(),
            features: FeatureStep::NotRun,
            aborted: None,
        }
    }

    pub fn record(&mut self, pair: SeedPair, result: Result<Enriched, FetchError>) {
        match result {
            Ok(enriched) => {
                self.enriched += 1;
                self.write_failures += enriched.write_failures;
            }
            Err(error) => self.failures.push(ItemFailure { pair, error }),
        }
    }

    pub fn attempted(&self) -> usize {
        self.enriched + self.failures.len()
    }

    pub fn not_attempted(&self) -> usize {
        self.size.saturating_sub(self.attempted())
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub seeds: usize,
    pub chunks: Vec<ChunkOutcome>,
}

impl BatchReport {
    pub fn enriched(&self) -> usize {
        self.chunks.iter().map(|c| c.enriched).sum()
    }

    pub fn fetch_failures(&self) -> usize {
        self.chunks.iter().map(|c| c.failures.len()).sum()
    }

    pub fn write_failures(&self) -> usize {
        self.chunks.iter().map(|c| c.write_failures).sum()
    }

    pub fn features_written(&self) -> usize {
        self.chunks.iter().map(|c| c.features.written()).sum()
    }

    pub fn features_requested(&self) -> usize {
        self.chunks
            .iter()
            .map(|c| match c.features {
                FeatureStep::Written { requested, .. } => requested,
                _ => 0,
            })
            .sum()
    }

    pub fn feature_failures(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| matches!(c.features, FeatureStep::LookupFailed(_) | FeatureStep::WriteFailed { .. }))
            .count()
    }

    pub fn aborted_chunks(&self) -> usize {
        self.chunks.iter().filter(|c| c.aborted.is_some()).count()
    }

    pub fn not_attempted(&self) -> usize {
        self.chunks.iter().map(|c| c.not_attempted()).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemFailure> {
        self.chunks.iter().flat_map(|c| c.failures.iter())
    }

    pub fn is_clean(&self) -> bool {
        self.fetch_failures() == 0
            && self.write_failures() == 0
            && self.feature_failures() == 0
            && self.aborted_chunks() == 0
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} seed pairs over {} workers: {} enriched, {} fetch failures, {} write failures",
            self.seeds,
            self.chunks.len(),
            self.enriched(),
            self.fetch_failures(),
            self.write_failures()
        )?;
        write!(
            f,
            "audio features: {} written of {} requested, {} chunks failed",
            self.features_written(),
            self.features_requested(),
            self.feature_failures()
        )?;
        for chunk in self.chunks.iter().filter(|c| c.aborted.is_some()) {
            write!(
                f,
                "\nworker {} aborted ({} of {} items not attempted): {}",
                chunk.chunk_id,
                chunk.not_attempted(),
                chunk.size,
                chunk.aborted.as_deref().unwrap_or_default()
            )?;
        }
        for chunk in &self.chunks {
            match &chunk.features {
                FeatureStep::LookupFailed(error) => {
                    write!(f, "\nworker {} audio feature lookup failed: {}", chunk.chunk_id, error)?
                }
                FeatureStep::WriteFailed { found } => write!(
                    f,
                    "\nworker {} could not store {} audio feature rows",
                    chunk.chunk_id, found
                )?,
                FeatureStep::NotRun | FeatureStep::Written { .. } => {}
            }
        }
        for failure in self.failures() {
            write!(
                f,
                "\n  failed {} / {}: {}",
                failure.pair.track_id, failure.pair.artist_id, failure.error
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_tallies_items_and_write_failures() {
        let mut chunk = ChunkOutcome::new(0, 4);
        chunk.record(SeedPair::new("t1", "a1"), Ok(Enriched { writes: 5, write_failures: 1 }));
        chunk.record(SeedPair::new("t2", "a2"), Err(FetchError::NotFound("t2".into())));
        chunk.record(SeedPair::new("t3", "a3"), Ok(Enriched { writes: 4, write_failures: 0 }));

        assert_eq!(chunk.enriched, 2);
        assert_eq!(chunk.write_failures, 1);
        assert_eq!(chunk.attempted(), 3);
        assert_eq!(chunk.not_attempted(), 1);
    }

    #[test]
    fn test_batch_totals_and_summary() {
        let mut first = ChunkOutcome::new(0, 2);
        first.record(SeedPair::new("t1", "a1"), Ok(Enriched::default()));
        first.record(SeedPair::new("t2", "a2"), Err(FetchError::Malformed("no id".into())));
        first.features = FeatureStep::Written { requested: 2, found: 1 };

        let mut second = ChunkOutcome::new(1, 2);
        second.record(SeedPair::new("t3", "a3"), Ok(Enriched::default()));
        second.aborted = Some("boom".into());

        let mut third = ChunkOutcome::new(2, 1);
        third.record(SeedPair::new("t5", "a5"), Ok(Enriched::default()));
        third.features = FeatureStep::LookupFailed(FetchError::RateLimited {
            url: "https://api.reccobeats.com/v1/audio-features".into(),
            attempts: 4,
        });

        let mut fourth = ChunkOutcome::new(3, 1);
        fourth.record(SeedPair::new("t6", "a6"), Ok(Enriched::default()));
        fourth.features = FeatureStep::WriteFailed { found: 1 };

        let report = BatchReport { seeds: 6, chunks: vec![first, second, third, fourth] };

        assert_eq!(report.enriched(), 4);
        assert_eq!(report.fetch_failures(), 1);
        assert_eq!(report.features_written(), 1);
        assert_eq!(report.features_requested(), 2);
        assert_eq!(report.feature_failures(), 2);
        assert_eq!(report.aborted_chunks(), 1);
        assert_eq!(report.not_attempted(), 1);
        assert!(!report.is_clean());

        let text = report.to_string();
        assert!(text.contains("6 seed pairs over 4 workers"));
        assert!(text.contains("audio features: 1 written of 2 requested, 2 chunks failed"));
        assert!(text.contains("worker 1 aborted (1 of 2 items not attempted): boom"));
        assert!(text.contains(
            "worker 2 audio feature lookup failed: rate limited by https://api.reccobeats.com/v1/audio-features after 4 attempts"
        ));
        assert!(text.contains("worker 3 could not store 1 audio feature rows"));
        assert!(text.contains("failed t2 / a2: malformed payload: no id"));
    }

    #[test]
    fn test_empty_report_is_clean() {
        let report = BatchReport::default();
        assert!(report.is_clean());
        assert_eq!(report.enriched(), 0);
    }
}
