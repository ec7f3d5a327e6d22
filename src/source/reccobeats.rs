use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::models::AudioFeatures;
use crate::source::http::HttpFetcher;
use crate::source::FetchError;

pub const DEFAULT_API_BASE: &str = "https://api.reccobeats.com";

/// Largest id list the audio-features endpoint accepts in one request.
const MAX_IDS_PER_REQUEST: usize = 40;

#[derive(Debug, Deserialize)]
struct RawFeaturesPage {
    #[serde(default)]
    content: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFeatures {
    href: Option<String>,
    danceability: f64,
    energy: f64,
    key: i32,
    loudness: f64,
    mode: i32,
    speechiness: f64,
    acousticness: f64,
    instrumentalness: f64,
    liveness: f64,
    valence: f64,
    tempo: f64,
    #[serde(alias = "duration_ms")]
    duration_ms: Option<i64>,
    #[serde(alias = "time_signature")]
    time_signature: Option<i32>,
}

/// `https://open.spotify.com/track/<id>?si=...` -> `<id>`
fn track_id_from_href(href: &str) -> Option<&str> {
    let path = href.split(&['?', '#'][..]).next()?;
    let mut segments = path.trim_end_matches('/').rsplit('/');
    let id = segments.next()?;
    (segments.next() == Some("track") && !id.is_empty()).then_some(id)
}

fn features_from_entry(entry: Value) -> Option<AudioFeatures> {
    let raw: RawFeatures = match serde_json::from_value(entry) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(error = %e, "Dropping malformed audio-features entry");
            return None;
        }
    };
    let track_id = raw.href.as_deref().and_then(track_id_from_href)?.to_string();

    Some(AudioFeatures {
        track_id,
        danceability: raw.danceability,
        energy: raw.energy,
        key: raw.key,
        loudness: raw.loudness,
        mode: raw.mode,
        speechiness: raw.speechiness,
        acousticness: raw.acousticness,
        instrumentalness: raw.instrumentalness,
        liveness: raw.liveness,
        valence: raw.valence,
        tempo: raw.tempo,
        duration_ms: raw.duration_ms,
        time_signature: raw.time_signature,
    })
}

/// Aligns provider entries with the requested ids. Unknown ids come back as `None`.
fn align(track_ids: &[String], entries: Vec<Value>) -> Vec<Option<AudioFeatures>> {
    let mut by_id: HashMap<String, AudioFeatures> = entries
        .into_iter()
        .filter_map(features_from_entry)
        .map(|f| (f.track_id.clone(), f))
        .collect();
    track_ids.iter().map(|id| by_id.remove(id)).collect()
}

pub struct FeaturesClient {
    http: HttpFetcher,
    base: String,
}

impl FeaturesClient {
    pub fn new(http: HttpFetcher, base: &str) -> Self {
        Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn audio_features(
        &self,
        track_ids: &[String],
    ) -> Result<Vec<Option<AudioFeatures>>, FetchError> {
        let url = format!("{}/v1/audio-features", self.base);
        let mut entries = Vec::new();
        for ids in track_ids.chunks(MAX_IDS_PER_REQUEST) {
            let page: RawFeaturesPage = self.http.get_json(&url, &[("ids", ids.join(","))])?;
            entries.extend(page.content);
        }
        Ok(align(track_ids, entries))
    }
}
