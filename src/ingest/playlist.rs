use crossbeam::channel::Sender;
use tracing::debug;

use crate::models::TrackSummary;
use crate::source::FetchError;

/// The global Top 100 playlist the seed tables are built from by default.
pub const DEFAULT_PLAYLIST_ID: &str = "5ABHKGoOzxkaa28ttQV9sE";

const PAGE_LIMIT: u32 = 100;

#[derive(Debug, Default)]
pub struct PlaylistPage {
    pub tracks: Vec<TrackSummary>,
    /// Raw entries on the page, including ones dropped for missing ids.
    pub item_count: usize,
    pub has_next: bool,
}

pub trait PlaylistSource {
    fn playlist_page(&self, playlist_id: &str, offset: u32, limit: u32)
        -> Result<PlaylistPage, FetchError>;
}

/// Accepts a bare id or an `open.spotify.com/playlist/<id>?si=...` link.
pub fn playlist_id_from(input: &str) -> &str {
    let input = input.trim();
    if !input.contains("spotify.com") {
        return input;
    }
    let path = input.split(&['?', '#'][..]).next().unwrap_or(input);
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

/// Pages through a playlist and sends every usable track to `tx`.
///
/// Stops at the last page, on an empty page, or when the receiver is gone.
/// Returns the number of tracks sent.
pub fn scan_playlist<S: PlaylistSource + ?Sized>(
    source: &S,
    playlist_id: &str,
    tx: Sender<TrackSummary>,
) -> Result<usize, FetchError> {
    let mut offset = 0;
    let mut sent = 0;

    loop {
        let page = source.playlist_page(playlist_id, offset, PAGE_LIMIT)?;
        debug!(playlist_id, offset, items = page.item_count, "Playlist page fetched");
        if page.item_count == 0 {
            break;
        }

        for track in page.tracks {
            if tx.send(track).is_err() {
                return Ok(sent);
            }
            sent += 1;
        }

        if !page.has_next {
            break;
        }
        offset += PAGE_LIMIT;
    }
    Ok(sent)
}
