#![allow(dead_code)]

use listenlog::catalog_store::SqliteCatalogStore;
use listenlog::clock::ManualClock;
use listenlog::enrichment::{EnrichmentOrchestrator, EnrichmentSettings, Providers};
use listenlog::listening::{ArtistMatcher, SharedDedupWindow};
use listenlog::poller::{DedupLookupPolicy, Poller, PollerSettings};
use listenlog::resilience::{CircuitBreakerConfig, ResilientCaller, RetryPolicy};
use listenlog::sources::Source;
use std::sync::Arc;
use std::time::Duration;

pub const START_TIMESTAMP: i64 = 1_000;
pub const DEDUP_WINDOW: Duration = Duration::from_secs(600);

/// In-memory catalog, manual clock and orchestrator shared by the pollers a
/// test creates.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<SqliteCatalogStore>,
    pub orchestrator: Arc<EnrichmentOrchestrator>,
    pub dedup: SharedDedupWindow,
}

impl Harness {
    pub fn new(providers: Providers) -> Self {
        Self::with_resilience(
            providers,
            RetryPolicy::immediate(3),
            CircuitBreakerConfig::default(),
        )
    }

    pub fn with_resilience(
        providers: Providers,
        retry: RetryPolicy,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        let clock = Arc::new(ManualClock::at_timestamp(START_TIMESTAMP));
        let store = Arc::new(SqliteCatalogStore::in_memory().unwrap());
        let orchestrator = Arc::new(EnrichmentOrchestrator::new(
            store.clone(),
            providers,
            ResilientCaller::new(retry, breaker, clock.clone()),
            ArtistMatcher::Exact,
            clock.clone(),
            EnrichmentSettings::default(),
        ));
        Self {
            clock,
            store,
            orchestrator,
            dedup: SharedDedupWindow::new(DEDUP_WINDOW),
        }
    }

    /// A poller sharing this harness's dedup window.
    pub fn poller(&self, source: Arc<dyn Source>) -> Poller {
        Poller::new(
            source,
            self.orchestrator.clone(),
            self.dedup.clone(),
            self.clock.clone(),
            PollerSettings {
                interval: Duration::from_secs(60),
                active_hours: None,
                dedup_window: DEDUP_WINDOW,
                lookup_policy: DedupLookupPolicy::FailOpen,
            },
        )
    }

    pub fn at(&self, timestamp: i64) {
        self.clock.set_timestamp(timestamp);
    }
}
