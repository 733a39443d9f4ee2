//! listenlog library
//!
//! Polls now-playing sources, records deduplicated listening events into a
//! SQLite catalog and enriches them with external metadata. Modules are
//! exposed for the binaries and the integration tests.

pub mod analytics;
pub mod catalog_store;
pub mod clock;
pub mod config;
pub mod enrichment;
pub mod listening;
pub mod metrics;
pub mod poller;
pub mod providers;
pub mod resilience;
pub mod server;
pub mod sources;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use catalog_store::{CatalogStore, SqliteCatalogStore};
pub use enrichment::{EnrichmentOrchestrator, Providers};
pub use poller::{Poller, PollingService};
