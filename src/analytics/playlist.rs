use super::sessions::Session;
use crate::catalog_store::EventDetails;
use crate::listening::normalize;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistEntry {
    pub track_id: i64,
    pub track_title: String,
    pub album_title: String,
    pub artist: String,
    /// Sessions in which the track was heard alongside the seed artist.
    pub sessions: u32,
}

/// Tracks by other artists that shared listening sessions with
/// `seed_artist`, most frequent first.
///
/// Each track counts at most once per session.
pub fn session_playlist(
    sessions: &[Session<EventDetails>],
    seed_artist: &str,
    limit: usize,
) -> Vec<PlaylistEntry> {
    let seed = normalize(seed_artist);
    let by_seed = |e: &EventDetails| e.artist_names.iter().any(|a| normalize(a) == seed);

    let mut entries: HashMap<i64, PlaylistEntry> = HashMap::new();
    for session in sessions {
        if !session.events.iter().any(by_seed) {
            continue;
        }
        let mut seen = HashSet::new();
        for event in session.events.iter().filter(|e| !by_seed(*e)) {
            if !seen.insert(event.event.track_id) {
                continue;
            }
            entries
                .entry(event.event.track_id)
                .or_insert_with(|| PlaylistEntry {
                    track_id: event.event.track_id,
                    track_title: event.track_title.clone(),
                    album_title: event.album_title.clone(),
                    artist: event.primary_artist().unwrap_or_default().to_string(),
                    sessions: 0,
                })
                .sessions += 1;
        }
    }

    let mut playlist: Vec<PlaylistEntry> = entries.into_values().collect();
    playlist.sort_by(|a, b| {
        b.sessions
            .cmp(&a.sessions)
            .then_with(|| a.artist.cmp(&b.artist))
            .then_with(|| a.track_title.cmp(&b.track_title))
            .then_with(|| a.track_id.cmp(&b.track_id))
    });
    playlist.truncate(limit);
    playlist
}
