//! Periodic polling of playback sources.

mod active_hours;
#[allow(clippy::module_inception)]
mod poller;
mod service;

pub use active_hours::ActiveHours;
pub use poller::{DedupLookupPolicy, Poller, PollerSettings, TickOutcome};
pub use service::{PollerStatus, PollingService, ServiceStatus};
