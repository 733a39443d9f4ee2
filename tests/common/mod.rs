//! Common test infrastructure
//!
//! Fake sources and providers with call counters, plus a harness wiring an
//! in-memory catalog, a manual clock and the orchestrator together.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{Harness, PlaybackSource};
//!
//! #[tokio::test]
//! async fn test_records_playback() {
//!     let harness = Harness::new(Default::default());
//!     let source = PlaybackSource::new("bridge");
//!     let mut poller = harness.poller(source.clone());
//!     source.play("Can", "Vitamin C", "Ege Bamyasi");
//!     poller.tick().await;
//! }
//! ```

mod fakes;
mod fixtures;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use fakes::*;
#[allow(unused_imports)]
pub use fixtures::*;
