use crate::catalog_store::{EventDetails, ListeningEvent};
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_SESSION_GAP: Duration = Duration::from_secs(1800);

/// Anything with a unix timestamp in seconds.
pub trait Timed {
    fn timestamp(&self) -> i64;
}

impl Timed for i64 {
    fn timestamp(&self) -> i64 {
        *self
    }
}

impl Timed for ListeningEvent {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

impl Timed for EventDetails {
    fn timestamp(&self) -> i64 {
        self.event.timestamp
    }
}

/// A maximal run of events with no gap above the threshold. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session<T = EventDetails> {
    pub events: Vec<T>,
}

impl<T: Timed> Session<T> {
    pub fn start(&self) -> i64 {
        self.events.first().map(Timed::timestamp).unwrap_or_default()
    }

    pub fn end(&self) -> i64 {
        self.events.last().map(Timed::timestamp).unwrap_or_default()
    }

    /// Seconds between the first and the last event.
    pub fn duration_secs(&self) -> i64 {
        self.end() - self.start()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Splits `events` into sessions. Input order does not matter: events are
/// sorted by timestamp first, keeping the given order among equal
/// timestamps.
pub fn segment_sessions<T: Timed + Clone>(events: &[T], gap_threshold: Duration) -> Vec<Session<T>> {
    let gap = i64::try_from(gap_threshold.as_secs()).unwrap_or(i64::MAX);
    let mut sorted = events.to_vec();
    sorted.sort_by_key(Timed::timestamp);

    let mut sessions: Vec<Session<T>> = Vec::new();
    for event in sorted {
        match sessions.last_mut() {
            Some(current) if event.timestamp().saturating_sub(current.end()) <= gap => {
                current.events.push(event)
            }
            _ => sessions.push(Session {
                events: vec![event],
            }),
        }
    }
    sessions
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionStats {
    pub session_count: usize,
    pub event_count: usize,
    pub mean_events_per_session: f64,
    pub longest_session_events: usize,
    pub mean_duration_secs: f64,
    pub longest_duration_secs: i64,
}

pub fn session_stats<T: Timed>(sessions: &[Session<T>]) -> SessionStats {
    if sessions.is_empty() {
        return SessionStats::default();
    }
    let count = sessions.len();
    let event_count: usize = sessions.iter().map(Session::len).sum();
    let total_duration: i64 = sessions.iter().map(Session::duration_secs).sum();
    SessionStats {
        session_count: count,
        event_count,
        mean_events_per_session: event_count as f64 / count as f64,
        longest_session_events: sessions.iter().map(Session::len).max().unwrap_or(0),
        mean_duration_secs: total_duration as f64 / count as f64,
        longest_duration_secs: sessions
            .iter()
            .map(Session::duration_secs)
            .max()
            .unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timestamps(sessions: &[Session<i64>]) -> Vec<Vec<i64>> {
        sessions.iter().map(|s| s.events.clone()).collect()
    }

    #[test]
    fn splits_on_gaps_above_threshold() {
        let sessions = segment_sessions(&[0, 100, 200, 2200, 2300], DEFAULT_SESSION_GAP);
        assert_eq!(timestamps(&sessions), vec![vec![0, 100, 200], vec![2200, 2300]]);
    }

    #[test]
    fn gap_equal_to_threshold_stays_in_session() {
        let sessions = segment_sessions(&[0, 1800, 3601], DEFAULT_SESSION_GAP);
        assert_eq!(timestamps(&sessions), vec![vec![0, 1800], vec![3601]]);
    }

    #[test]
    fn unordered_input_is_sorted_first() {
        let sessions = segment_sessions(&[2300, 0, 2200, 100], DEFAULT_SESSION_GAP);
        assert_eq!(timestamps(&sessions), vec![vec![0, 100], vec![2200, 2300]]);
    }

    #[test]
    fn empty_input_has_no_sessions() {
        assert!(segment_sessions::<i64>(&[], DEFAULT_SESSION_GAP).is_empty());
        assert_eq!(session_stats::<i64>(&[]), SessionStats::default());
    }

    #[test]
    fn stats_summarize_sessions() {
        let sessions = segment_sessions(&[0, 100, 200, 2200, 2300], DEFAULT_SESSION_GAP);
        let stats = session_stats(&sessions);
        assert_eq!(stats.session_count, 2);
        assert_eq!(stats.event_count, 5);
        assert_eq!(stats.mean_events_per_session, 2.5);
        assert_eq!(stats.longest_session_events, 3);
        assert_eq!(stats.mean_duration_secs, 150.0);
        assert_eq!(stats.longest_duration_secs, 200);
    }
}
