//! Time-window suppression of repeated detections.
//!
//! Two sources report the same playback at unrelated moments, and a single
//! source reports it again on every tick while the track plays. Both cases
//! collapse to "this identity was accepted less than `window` ago".

use super::identity::EventIdentity;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const DEFAULT_DEDUP_WINDOW_SECS: u64 = 600;

#[derive(Debug, Clone)]
struct SeenEntry {
    accepted_at: DateTime<Utc>,
    source_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupDecision {
    Accepted,
    Suppressed {
        /// Source whose detection opened the window.
        first_source: String,
        age_secs: i64,
    },
}

impl DedupDecision {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, DedupDecision::Suppressed { .. })
    }

    /// "cross_source" when another source already reported the identity,
    /// "repeat" when it is the same source seeing it again.
    pub fn reason(&self, source_id: &str) -> &'static str {
        match self {
            DedupDecision::Accepted => "accepted",
            DedupDecision::Suppressed { first_source, .. } if first_source == source_id => {
                "repeat"
            }
            DedupDecision::Suppressed { .. } => "cross_source",
        }
    }
}

#[derive(Debug)]
pub struct DedupWindow {
    window: Duration,
    seen: HashMap<EventIdentity, SeenEntry>,
}

impl DedupWindow {
    pub fn new(window: std::time::Duration) -> Self {
        Self {
            window: Duration::from_std(window).unwrap_or(Duration::MAX),
            seen: HashMap::new(),
        }
    }

    /// True when `identity` was accepted within the window, in which case the
    /// caller must not create an event. Otherwise the identity is recorded as
    /// accepted at `now`.
    pub fn should_skip(&mut self, identity: &EventIdentity, now: DateTime<Utc>) -> bool {
        self.check(identity, "", now).is_suppressed()
    }

    /// Same as [`DedupWindow::should_skip`], remembering which source opened
    /// the window. A suppressed detection does not extend the window.
    pub fn check(
        &mut self,
        identity: &EventIdentity,
        source_id: &str,
        now: DateTime<Utc>,
    ) -> DedupDecision {
        self.purge_expired(now);

        if let Some(entry) = self.seen.get(identity) {
            return DedupDecision::Suppressed {
                first_source: entry.source_id.clone(),
                age_secs: (now - entry.accepted_at).num_seconds(),
            };
        }

        self.seen.insert(
            identity.clone(),
            SeenEntry {
                accepted_at: now,
                source_id: source_id.to_string(),
            },
        );
        DedupDecision::Accepted
    }

    /// Drops the record for `identity`, so the next detection is accepted.
    /// Used when an accepted sample was not recorded after all.
    pub fn forget(&mut self, identity: &EventIdentity) {
        self.seen.remove(identity);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) {
        let window = self.window;
        self.seen
            .retain(|_, entry| now.signed_duration_since(entry.accepted_at) <= window);
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(DEFAULT_DEDUP_WINDOW_SECS))
    }
}

/// One window shared by every poller of the process. The lock is never held
/// across an await point.
#[derive(Debug, Clone, Default)]
pub struct SharedDedupWindow {
    inner: Arc<Mutex<DedupWindow>>,
}

impl SharedDedupWindow {
    pub fn new(window: std::time::Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DedupWindow::new(window))),
        }
    }

    pub fn check(&self, identity: &EventIdentity, source_id: &str, now: DateTime<Utc>) -> DedupDecision {
        self.lock().check(identity, source_id, now)
    }

    pub fn forget(&self, identity: &EventIdentity) {
        self.lock().forget(identity);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DedupWindow> {
        // The window holds no invariant a panicking holder could break.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
