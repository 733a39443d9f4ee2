//! Scheduling loop driving every poller at its own interval.

use super::{Poller, TickOutcome};
use crate::clock::Clock;
use crate::enrichment::EnrichmentOrchestrator;
use crate::resilience::BreakerSnapshot;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on how long `stop` waits for an in-flight tick.
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize)]
pub struct PollerStatus {
    pub source: String,
    pub running: bool,
    pub interval_secs: u64,
    pub last_poll_time: Option<String>,
    pub last_identity: Option<String>,
    pub next_run_time: Option<String>,
    pub last_outcome: Option<TickOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub pollers: Vec<PollerStatus>,
    pub breakers: Vec<BreakerSnapshot>,
}

struct PollerSlot {
    poller: Arc<Mutex<Poller>>,
    status: Arc<RwLock<PollerStatus>>,
    interval: Duration,
}

struct Running {
    shutdown_token: CancellationToken,
    handles: Vec<(String, JoinHandle<()>)>,
}

/// Owns the pollers and runs each on its own task while started.
pub struct PollingService {
    slots: Vec<PollerSlot>,
    orchestrator: Arc<EnrichmentOrchestrator>,
    clock: Arc<dyn Clock>,
    running: Mutex<Option<Running>>,
    join_timeout: Duration,
}

impl PollingService {
    pub fn new(
        pollers: Vec<Poller>,
        orchestrator: Arc<EnrichmentOrchestrator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let slots = pollers
            .into_iter()
            .map(|poller| {
                let interval = poller.interval();
                let status = PollerStatus {
                    source: poller.source_id().to_string(),
                    running: false,
                    interval_secs: interval.as_secs(),
                    last_poll_time: None,
                    last_identity: None,
                    next_run_time: None,
                    last_outcome: None,
                };
                PollerSlot {
                    poller: Arc::new(Mutex::new(poller)),
                    status: Arc::new(RwLock::new(status)),
                    interval,
                }
            })
            .collect();
        Self {
            slots,
            orchestrator,
            clock,
            running: Mutex::new(None),
            join_timeout: SHUTDOWN_JOIN_TIMEOUT,
        }
    }

    /// Spawns one task per poller. Returns false if already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("Polling service already running");
            return false;
        }

        let shutdown_token = CancellationToken::new();
        let mut handles = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let source = slot.status.read().await.source.clone();
            info!(
                "Starting poller for {} every {:?}",
                source, slot.interval
            );
            let handle = tokio::spawn(run_poller(
                slot.poller.clone(),
                slot.status.clone(),
                slot.interval,
                self.clock.clone(),
                shutdown_token.child_token(),
            ));
            handles.push((source, handle));
        }

        *running = Some(Running {
            shutdown_token,
            handles,
        });
        true
    }

    /// Cancels the waits between ticks and lets in-flight ticks finish.
    /// A tick still running after the join timeout is aborted. Returns false
    /// if not running.
    pub async fn stop(&self) -> bool {
        let Some(running) = self.running.lock().await.take() else {
            debug!("Polling service not running");
            return false;
        };

        info!("Stopping polling service...");
        running.shutdown_token.cancel();
        for (source, mut handle) in running.handles {
            match tokio::time::timeout(self.join_timeout, &mut handle).await {
                Ok(Ok(())) => debug!("Poller for {} stopped", source),
                Ok(Err(e)) => warn!("Poller for {} ended abnormally: {}", source, e),
                Err(_) => {
                    warn!(
                        "Poller for {} did not stop within {:?}, aborting",
                        source, self.join_timeout
                    );
                    // A detached tick would keep the poller locked across a restart
                    handle.abort();
                    let _ = handle.await;
                }
            }
        }
        for slot in &self.slots {
            let mut status = slot.status.write().await;
            status.running = false;
            status.next_run_time = None;
        }
        info!("Polling service stopped");
        true
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub async fn status(&self) -> ServiceStatus {
        let mut pollers = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            pollers.push(slot.status.read().await.clone());
        }
        ServiceStatus {
            running: self.is_running().await,
            pollers,
            breakers: self.orchestrator.breaker_snapshots(),
        }
    }
}

async fn run_poller(
    poller: Arc<Mutex<Poller>>,
    status: Arc<RwLock<PollerStatus>>,
    interval: Duration,
    clock: Arc<dyn Clock>,
    shutdown_token: CancellationToken,
) {
    status.write().await.running = true;
    loop {
        let (outcome, last_identity) = {
            let mut poller = poller.lock().await;
            let outcome = poller.tick().await;
            (outcome, poller.last_identity().map(|i| i.to_string()))
        };

        let now = clock.now();
        let next_run = chrono::Duration::from_std(interval)
            .ok()
            .and_then(|d| now.checked_add_signed(d));
        {
            let mut status = status.write().await;
            status.last_poll_time = Some(now.to_rfc3339());
            status.last_identity = last_identity;
            status.next_run_time = next_run.map(|t| t.to_rfc3339());
            status.last_outcome = Some(outcome);
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown_token.cancelled() => break,
        }
    }
    let mut status = status.write().await;
    status.running = false;
    status.next_run_time = None;
}
