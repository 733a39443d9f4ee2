//! Property-based tests for the dedup window.
//!
//! Verifies:
//! - Accepted detections of one identity are more than a window apart
//! - The first detection after a window has elapsed is always accepted
//! - Identities never suppress each other

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use std::time::Duration;

use listenlog::listening::{RawSample, SharedDedupWindow};

const WINDOW_SECS: i64 = 600;
const SOURCES: &[&str] = &["bridge", "scrobble"];

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

/// Increasing detection times, each tagged with a source.
fn arb_detections() -> impl Strategy<Value = Vec<(i64, usize)>> {
    prop::collection::vec((0i64..400, 0..SOURCES.len()), 1..80).prop_map(|steps| {
        let mut now = 1_000;
        steps
            .into_iter()
            .map(|(delta, source)| {
                now += delta;
                (now, source)
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn at_most_one_acceptance_per_window(detections in arb_detections()) {
        let window = SharedDedupWindow::new(Duration::from_secs(WINDOW_SECS as u64));
        let identity = RawSample::new("bridge", "Pink Floyd", "Time", "Meddle").identity();

        let mut accepted = Vec::new();
        for (now, source) in &detections {
            if !window.check(&identity, SOURCES[*source], at(*now)).is_suppressed() {
                accepted.push(*now);
            }
        }

        prop_assert_eq!(accepted.first(), detections.first().map(|(t, _)| t));
        for pair in accepted.windows(2) {
            prop_assert!(pair[1] - pair[0] > WINDOW_SECS);
        }
    }

    #[test]
    fn first_detection_after_window_is_accepted(detections in arb_detections()) {
        let window = SharedDedupWindow::new(Duration::from_secs(WINDOW_SECS as u64));
        let identity = RawSample::new("bridge", "Can", "Mother Sky", "Soundtracks").identity();

        let mut last_accepted: Option<i64> = None;
        for (now, source) in &detections {
            let suppressed = window.check(&identity, SOURCES[*source], at(*now)).is_suppressed();
            let expired = last_accepted.map_or(true, |t| now - t > WINDOW_SECS);
            prop_assert_eq!(suppressed, !expired);
            if !suppressed {
                last_accepted = Some(*now);
            }
        }
    }

    #[test]
    fn identities_are_independent(detections in arb_detections()) {
        let window = SharedDedupWindow::new(Duration::from_secs(WINDOW_SECS as u64));
        let first = RawSample::new("bridge", "Yes", "Roundabout", "Fragile").identity();
        let second = RawSample::new("bridge", "Yes", "Heart of the Sunrise", "Fragile").identity();

        let (start, _) = detections[0];
        prop_assert!(!window.check(&first, "bridge", at(start)).is_suppressed());
        prop_assert!(!window.check(&second, "scrobble", at(start)).is_suppressed());
        prop_assert!(window.check(&first, "scrobble", at(start + 1)).is_suppressed());
    }
}
