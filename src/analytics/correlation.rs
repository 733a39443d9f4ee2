use super::sessions::segment_sessions;
use crate::catalog_store::EventDetails;
use crate::listening::normalize;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Two artists heard back to back, `count` times. `first` sorts before
/// `second` by normalized name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtistPair {
    pub first: String,
    pub second: String,
    pub count: u32,
}

/// Counts consecutive plays of different primary artists inside sessions.
///
/// Ranked by count, most frequent first, then by names.
pub fn correlate_artists(events: &[EventDetails], gap_threshold: Duration) -> Vec<ArtistPair> {
    let mut counts: HashMap<(String, String), ArtistPair> = HashMap::new();

    for session in segment_sessions(events, gap_threshold) {
        for window in session.events.windows(2) {
            let (Some(a), Some(b)) = (window[0].primary_artist(), window[1].primary_artist())
            else {
                continue;
            };
            let (key_a, key_b) = (normalize(a), normalize(b));
            if key_a == key_b {
                continue;
            }
            let (key, first, second) = if key_a < key_b {
                ((key_a, key_b), a, b)
            } else {
                ((key_b, key_a), b, a)
            };
            counts
                .entry(key)
                .or_insert_with(|| ArtistPair {
                    first: first.to_string(),
                    second: second.to_string(),
                    count: 0,
                })
                .count += 1;
        }
    }

    let mut pairs: Vec<((String, String), ArtistPair)> = counts.into_iter().collect();
    pairs.sort_by(|(key_a, a), (key_b, b)| b.count.cmp(&a.count).then_with(|| key_a.cmp(key_b)));
    pairs.into_iter().map(|(_, pair)| pair).collect()
}
