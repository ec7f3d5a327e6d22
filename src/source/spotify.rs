//! Spotify Web API adapter.
//!
//! Raw payloads are deserialized into the `Raw*` shapes below and validated into the
//! crate's records here, so a missing id or popularity never reaches a worker.

use serde::Deserialize;
use tracing::debug;

use crate::ingest::playlist::{PlaylistPage, PlaylistSource};
use crate::models::{Album, ArtistDetails, TrackDetails, TrackSummary};
use crate::source::http::HttpFetcher;
use crate::source::FetchError;

pub const DEFAULT_API_BASE: &str = "https://api.spotify.com";

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawArtistRef {
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAlbum {
    id: Option<String>,
    name: Option<String>,
    release_date: Option<String>,
    #[serde(default)]
    artists: Vec<RawArtistRef>,
    #[serde(default)]
    external_urls: ExternalUrls,
    total_tracks: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    id: Option<String>,
    name: Option<String>,
    popularity: Option<i64>,
    album: Option<RawAlbum>,
    #[serde(default)]
    artists: Vec<RawArtistRef>,
}

#[derive(Debug, Deserialize)]
struct RawFollowers {
    total: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawArtist {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    genres: Vec<String>,
    popularity: Option<i64>,
    followers: Option<RawFollowers>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct RawPlaylistItem {
    track: Option<RawTrack>,
}

#[derive(Debug, Deserialize)]
struct RawPlaylistPage {
    #[serde(default)]
    items: Vec<RawPlaylistItem>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTrackPaging {
    #[serde(default)]
    items: Vec<RawTrack>,
}

#[derive(Debug, Deserialize)]
struct RawSearch {
    tracks: Option<RawTrackPaging>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TryFrom<RawTrack> for TrackDetails {
    type Error = FetchError;

    fn try_from(raw: RawTrack) -> Result<Self, Self::Error> {
        let track_id = non_empty(raw.id)
            .ok_or_else(|| FetchError::Malformed("track without id".into()))?;
        let popularity = raw
            .popularity
            .ok_or_else(|| FetchError::Malformed(format!("track {track_id} without popularity")))?;

        let album = raw.album.and_then(|album| {
            let album_id = non_empty(album.id)?;
            Some(Album {
                album_id,
                name: album.name.unwrap_or_default(),
                release_date: album.release_date,
                primary_artist_id: album.artists.into_iter().next().and_then(|a| non_empty(a.id)),
                external_url: album.external_urls.spotify,
                total_tracks: album.total_tracks,
            })
        });

        Ok(TrackDetails {
            track_id,
            popularity,
            album,
        })
    }
}

impl TryFrom<RawArtist> for ArtistDetails {
    type Error = FetchError;

    fn try_from(raw: RawArtist) -> Result<Self, Self::Error> {
        let artist_id = non_empty(raw.id)
            .ok_or_else(|| FetchError::Malformed("artist without id".into()))?;
        let popularity = raw
            .popularity
            .ok_or_else(|| FetchError::Malformed(format!("artist {artist_id} without popularity")))?;
        let followers = raw
            .followers
            .and_then(|f| f.total)
            .ok_or_else(|| FetchError::Malformed(format!("artist {artist_id} without follower count")))?;

        Ok(ArtistDetails {
            artist_id,
            name: raw.name.unwrap_or_default(),
            genres: raw.genres,
            popularity,
            followers,
            external_url: raw.external_urls.spotify,
        })
    }
}

/// Listing view; entries without a track id or a primary artist id are dropped.
fn summarize(raw: RawTrack) -> Option<TrackSummary> {
    let track_id = non_empty(raw.id)?;
    let artist = raw.artists.into_iter().next()?;
    let artist_id = non_empty(artist.id)?;
    let (album_name, release_date) = match raw.album {
        Some(album) => (album.name.unwrap_or_default(), album.release_date),
        None => (String::new(), None),
    };

    Some(TrackSummary {
        track_id,
        track_name: raw.name.unwrap_or_default(),
        artist_id,
        artist_name: artist.name.unwrap_or_default(),
        album_name,
        release_date,
    })
}

/// Filters for a track search. Field filters win over the free-text query.
#[derive(Debug, Default, Clone)]
pub struct SearchQuery {
    pub text: Option<String>,
    pub track: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<String>,
}

impl SearchQuery {
    /// `None` when neither a filter nor free text was given.
    pub fn to_query_string(&self) -> Option<String> {
        let filters = [
            ("track", &self.track),
            ("artist", &self.artist),
            ("album", &self.album),
            ("genre", &self.genre),
            ("year", &self.year),
        ];
        let parts: Vec<String> = filters
            .iter()
            .filter_map(|(field, value)| {
                let value = value.as_deref()?.trim();
                (!value.is_empty()).then(|| format!("{field}:{value}"))
            })
            .collect();

        if !parts.is_empty() {
            return Some(parts.join(" "));
        }
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }
}

pub struct SpotifyClient {
    http: HttpFetcher,
    base: String,
}

impl SpotifyClient {
    pub fn new(http: HttpFetcher, base: &str) -> Self {
        Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn track(&self, track_id: &str) -> Result<TrackDetails, FetchError> {
        let url = format!("{}/v1/tracks/{}", self.base, track_id);
        let raw: RawTrack = self.http.get_json(&url, &[])?;
        TrackDetails::try_from(raw)
    }

    pub fn artist(&self, artist_id: &str) -> Result<ArtistDetails, FetchError> {
        let url = format!("{}/v1/artists/{}", self.base, artist_id);
        let raw: RawArtist = self.http.get_json(&url, &[])?;
        ArtistDetails::try_from(raw)
    }

    pub fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<TrackSummary>, FetchError> {
        let url = format!("{}/v1/search", self.base);
        let raw: RawSearch = self.http.get_json(
            &url,
            &[
                ("q", query.to_string()),
                ("type", "track".to_string()),
                ("limit", limit.to_string()),
            ],
        )?;
        Ok(raw
            .tracks
            .map(|paging| paging.items.into_iter().filter_map(summarize).collect())
            .unwrap_or_default())
    }
}

impl PlaylistSource for SpotifyClient {
    fn playlist_page(
        &self,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<PlaylistPage, FetchError> {
        let url = format!("{}/v1/playlists/{}/tracks", self.base, playlist_id);
        let raw: RawPlaylistPage = self.http.get_json(
            &url,
            &[("limit", limit.to_string()), ("offset", offset.to_string())],
        )?;
        Ok(page_from_raw(raw))
    }
}

fn page_from_raw(raw: RawPlaylistPage) -> PlaylistPage {
    let item_count = raw.items.len();
    let tracks: Vec<TrackSummary> = raw
        .items
        .into_iter()
        .filter_map(|item| item.track)
        .filter_map(summarize)
        .collect();
    if tracks.len() < item_count {
        debug!(skipped = item_count - tracks.len(), "Skipped playlist items without track or artist id");
    }

    PlaylistPage {
        tracks,
        item_count,
        has_next: raw.next.is_some(),
    }
}
