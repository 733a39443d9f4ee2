//! Catalog resolution and best-effort metadata enrichment for detected
//! samples.

mod error;
mod orchestrator;
mod report;

pub use error::IngestError;
pub use orchestrator::{
    EnrichmentOrchestrator, EnrichmentSettings, Providers, DEFAULT_DESCRIPTION_MAX_TOKENS,
};
pub use report::{EnrichmentReport, EnrichmentStep, EventOutcome, StepReport, StepStatus};
