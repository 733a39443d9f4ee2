//! Origins of now-playing samples.
//!
//! A source answers "what is playing right now" and can diagnose its own
//! connectivity. The poller drives both through the [`Source`] trait.

mod bridge;
mod scrobble;

pub use bridge::{BridgeSource, BRIDGE_SOURCE_ID};
pub use scrobble::{ScrobbleSource, SCROBBLE_SOURCE_ID};

use crate::listening::RawSample;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_RECONNECT_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source {source_id} unavailable: {reason}")]
    Unavailable { source_id: String, reason: String },
}

impl SourceError {
    pub fn unavailable(source_id: &str, reason: impl Into<String>) -> Self {
        SourceError::Unavailable {
            source_id: source_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result of a health probe. The three checks are independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthProbe {
    pub reachable: bool,
    /// The source is talking to its playback backend.
    pub connected: bool,
    /// At least one playback zone is initialized.
    pub zones_active: bool,
}

impl HealthProbe {
    pub fn unreachable() -> Self {
        Self::default()
    }

    pub fn healthy() -> Self {
        Self {
            reachable: true,
            connected: true,
            zones_active: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPlan {
    /// Only reachability matters.
    SingleStage,
    /// Reachable, then connected, then zones initialized, waiting between
    /// stages.
    Staged,
}

#[async_trait]
pub trait Source: Send + Sync {
    /// Stable identifier recorded on every listening event.
    fn id(&self) -> &str;

    /// The single sample currently playing, `None` when idle.
    async fn fetch_now_playing(&self) -> Result<Option<RawSample>, SourceError>;

    async fn probe_health(&self) -> HealthProbe;

    fn recovery_plan(&self) -> RecoveryPlan {
        RecoveryPlan::SingleStage
    }

    fn reconnect_wait(&self) -> Duration {
        DEFAULT_RECONNECT_WAIT
    }

    /// Tries to bring the source back. Never fails; `false` means the next
    /// tick should try again.
    async fn recover(&self) -> bool {
        run_recovery(self).await
    }
}

async fn run_recovery<S: Source + ?Sized>(source: &S) -> bool {
    let id = source.id();
    let mut probe = source.probe_health().await;
    if !probe.reachable {
        warn!("Source {} is unreachable", id);
        return false;
    }
    if source.recovery_plan() == RecoveryPlan::SingleStage {
        info!("Source {} is reachable again", id);
        return true;
    }

    if !probe.connected {
        info!(
            "Source {} reachable but not connected to its backend, waiting {:?}",
            id,
            source.reconnect_wait()
        );
        tokio::time::sleep(source.reconnect_wait()).await;
        probe = source.probe_health().await;
        if !probe.reachable || !probe.connected {
            warn!("Source {} still not connected to its backend", id);
            return false;
        }
    }

    if !probe.zones_active {
        info!(
            "Source {} connected but no zone is active, waiting {:?}",
            id,
            source.reconnect_wait()
        );
        tokio::time::sleep(source.reconnect_wait()).await;
        probe = source.probe_health().await;
        if !(probe.reachable && probe.connected && probe.zones_active) {
            warn!("Source {} has no active zone", id);
            return false;
        }
    }

    info!("Source {} recovered", id);
    true
}
