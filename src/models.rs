/// A (track, artist) pair naming one item to enrich.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedPair {
    pub track_id: String,
    pub artist_id: String,
}

impl SeedPair {
    pub fn new(track_id: impl Into<String>, artist_id: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            artist_id: artist_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackDetails {
    pub track_id: String,
    pub popularity: i64,
    pub album: Option<Album>,
}

/// Album embedded in a track payload. Only built when the payload carries a non-empty id.
#[derive(Debug, Clone, PartialEq)]
pub struct Album {
    pub album_id: String,
    pub name: String,
    pub release_date: Option<String>,
    pub primary_artist_id: Option<String>,
    pub external_url: Option<String>,
    pub total_tracks: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtistDetails {
    pub artist_id: String,
    pub name: String,
    pub genres: Vec<String>,
    pub popularity: i64,
    pub followers: i64,
    pub external_url: Option<String>,
}

impl ArtistDetails {
    /// Genres flattened for the display column of `artist_details`.
    pub fn genres_csv(&self) -> String {
        self.genres.join(",")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioFeatures {
    pub track_id: String,
    pub danceability: f64,
    pub energy: f64,
    pub key: i32,
    pub loudness: f64,
    pub mode: i32,
    pub speechiness: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub valence: f64,
    pub tempo: f64,
    pub duration_ms: Option<i64>,
    pub time_signature: Option<i32>,
}

/// Flat view of a track as listed by playlists and search results.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSummary {
    pub track_id: String,
    pub track_name: String,
    pub artist_id: String,
    pub artist_name: String,
    pub album_name: String,
    pub release_date: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genres_join_in_order_without_spaces() {
        let artist = ArtistDetails {
            artist_id: "a1".into(),
            name: "Someone".into(),
            genres: vec!["pop".into(), "dance pop".into(), "k-pop".into()],
            popularity: 80,
            followers: 1000,
            external_url: None,
        };
        assert_eq!(artist.genres_csv(), "pop,dance pop,k-pop");
    }

    #[test]
    fn test_no_genres_is_empty_string() {
        let artist = ArtistDetails {
            artist_id: "a1".into(),
            name: "Someone".into(),
            genres: Vec::new(),
            popularity: 0,
            followers: 0,
            external_url: None,
        };
        assert_eq!(artist.genres_csv(), "");
    }
}
