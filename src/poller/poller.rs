use super::ActiveHours;
use crate::clock::Clock;
use crate::enrichment::EnrichmentOrchestrator;
use crate::listening::{DedupDecision, EventIdentity, RawSample, SharedDedupWindow};
use crate::metrics;
use crate::sources::Source;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What to do when the persisted recent-event lookup itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupLookupPolicy {
    /// Treat the sample as new and log a warning.
    #[default]
    FailOpen,
    /// Skip the sample. The next tick tries again.
    FailClosed,
}

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub interval: Duration,
    pub active_hours: Option<ActiveHours>,
    /// Window of the persisted recent-event check.
    pub dedup_window: Duration,
    pub lookup_policy: DedupLookupPolicy,
}

/// Result of one tick. Ticks never fail; every problem ends up here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    OutsideActiveHours,
    SourceUnavailable { recovered: bool },
    /// Nothing is playing.
    Idle,
    /// Missing artist or title.
    Incomplete,
    /// Same sample as the previous tick.
    Unchanged,
    Duplicate { reason: &'static str },
    /// The catalog already holds a recent event for this identity.
    RecentlyRecorded,
    LookupFailed,
    Ingested { event_id: i64 },
    IngestFailed { error: String },
}

impl TickOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickOutcome::OutsideActiveHours => "outside_active_hours",
            TickOutcome::SourceUnavailable { .. } => "source_unavailable",
            TickOutcome::Idle => "idle",
            TickOutcome::Incomplete => "incomplete",
            TickOutcome::Unchanged => "unchanged",
            TickOutcome::Duplicate { .. } => "duplicate",
            TickOutcome::RecentlyRecorded => "recently_recorded",
            TickOutcome::LookupFailed => "lookup_failed",
            TickOutcome::Ingested { .. } => "ingested",
            TickOutcome::IngestFailed { .. } => "ingest_failed",
        }
    }
}

/// Asks one source what is playing and records it once.
pub struct Poller {
    source: Arc<dyn Source>,
    orchestrator: Arc<EnrichmentOrchestrator>,
    dedup: SharedDedupWindow,
    clock: Arc<dyn Clock>,
    settings: PollerSettings,
    last_identity: Option<EventIdentity>,
}

impl Poller {
    pub fn new(
        source: Arc<dyn Source>,
        orchestrator: Arc<EnrichmentOrchestrator>,
        dedup: SharedDedupWindow,
        clock: Arc<dyn Clock>,
        settings: PollerSettings,
    ) -> Self {
        Self {
            source,
            orchestrator,
            dedup,
            clock,
            settings,
            last_identity: None,
        }
    }

    pub fn source_id(&self) -> &str {
        self.source.id()
    }

    pub fn interval(&self) -> Duration {
        self.settings.interval
    }

    /// Identity of the sample seen on the previous tick, if any.
    pub fn last_identity(&self) -> Option<&EventIdentity> {
        self.last_identity.as_ref()
    }

    pub async fn tick(&mut self) -> TickOutcome {
        let outcome = self.poll().await;
        metrics::record_poll(self.source.id(), outcome.as_str());
        outcome
    }

    async fn poll(&mut self) -> TickOutcome {
        let now = self.clock.now();
        if let Some(hours) = &self.settings.active_hours {
            if !hours.is_active_at(now) {
                debug!("{}: outside active hours {}", self.source.id(), hours);
                return TickOutcome::OutsideActiveHours;
            }
        }

        let sample = match self.fetch().await {
            Ok(Some(sample)) => sample,
            Ok(None) => {
                self.last_identity = None;
                return TickOutcome::Idle;
            }
            Err(outcome) => return outcome,
        };
        if !sample.is_complete() {
            debug!("{}: ignoring incomplete sample {:?}", self.source.id(), sample);
            return TickOutcome::Incomplete;
        }

        let identity = sample.identity();
        if self.last_identity.as_ref() == Some(&identity) {
            return TickOutcome::Unchanged;
        }
        self.last_identity = Some(identity.clone());

        let source_id = self.source.id().to_string();
        let decision = self.dedup.check(&identity, &source_id, now);
        if let DedupDecision::Suppressed {
            first_source,
            age_secs,
        } = &decision
        {
            let reason = decision.reason(&source_id);
            debug!(
                "{}: {} already accepted from {} {}s ago ({})",
                source_id, identity, first_source, age_secs, reason
            );
            metrics::record_dedup_skip(&source_id, reason);
            return TickOutcome::Duplicate { reason };
        }

        match self.orchestrator.store().has_recent_event(
            &identity,
            self.settings.dedup_window,
            now.timestamp(),
        ) {
            Ok(true) => {
                debug!("{}: {} is already in the catalog", source_id, identity);
                metrics::record_dedup_skip(&source_id, "persisted");
                // The window only holds accepted detections; the catalog keeps
                // suppressing until its own event ages out.
                self.dedup.forget(&identity);
                return TickOutcome::RecentlyRecorded;
            }
            Ok(false) => {}
            Err(e) => match self.settings.lookup_policy {
                DedupLookupPolicy::FailOpen => {
                    warn!(
                        "{}: recent-event lookup failed, recording {} anyway: {:#}",
                        source_id, identity, e
                    );
                }
                DedupLookupPolicy::FailClosed => {
                    warn!(
                        "{}: recent-event lookup failed, skipping {}: {:#}",
                        source_id, identity, e
                    );
                    self.retry_next_tick(&identity);
                    return TickOutcome::LookupFailed;
                }
            },
        }

        self.ingest(&sample, &identity).await
    }

    /// Queries the source, running its recovery once on failure.
    async fn fetch(&self) -> Result<Option<RawSample>, TickOutcome> {
        let error = match self.source.fetch_now_playing().await {
            Ok(sample) => return Ok(sample),
            Err(e) => e,
        };
        warn!("{}: {}", self.source.id(), error);

        if !self.source.recover().await {
            return Err(TickOutcome::SourceUnavailable { recovered: false });
        }
        match self.source.fetch_now_playing().await {
            Ok(sample) => Ok(sample),
            Err(e) => {
                warn!("{}: still failing after recovery: {}", self.source.id(), e);
                Err(TickOutcome::SourceUnavailable { recovered: true })
            }
        }
    }

    async fn ingest(&mut self, sample: &RawSample, identity: &EventIdentity) -> TickOutcome {
        match self.orchestrator.ingest(sample).await {
            Ok(outcome) => {
                if outcome.report.has_failures() {
                    info!(
                        "{}: recorded {} with incomplete enrichment",
                        self.source.id(),
                        identity
                    );
                }
                TickOutcome::Ingested {
                    event_id: outcome.event.id,
                }
            }
            Err(e) => {
                error!("{}: failed to record {}: {}", self.source.id(), identity, e);
                self.retry_next_tick(identity);
                TickOutcome::IngestFailed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Nothing was recorded, so the identity must not keep suppressing.
    fn retry_next_tick(&mut self, identity: &EventIdentity) {
        self.dedup.forget(identity);
        self.last_identity = None;
    }
}
