//! Per-step outcome of an ingestion or album refresh.

use crate::catalog_store::{Album, ListeningEvent, Track};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStep {
    ArtistImage,
    AlbumDetails,
    AlbumImage,
    AiDescription,
}

impl EnrichmentStep {
    pub const ALBUM_STEPS: [EnrichmentStep; 3] = [
        EnrichmentStep::AlbumDetails,
        EnrichmentStep::AlbumImage,
        EnrichmentStep::AiDescription,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentStep::ArtistImage => "artist_image",
            EnrichmentStep::AlbumDetails => "album_details",
            EnrichmentStep::AlbumImage => "album_image",
            EnrichmentStep::AiDescription => "ai_description",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum StepStatus {
    /// New data was written to the catalog.
    Applied,
    /// The field was already populated, no provider was asked.
    NotNeeded,
    /// The provider answered but had nothing usable.
    NothingFound,
    NotConfigured,
    BreakerOpen,
    Failed(String),
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Applied => "applied",
            StepStatus::NotNeeded => "not_needed",
            StepStatus::NothingFound => "nothing_found",
            StepStatus::NotConfigured => "not_configured",
            StepStatus::BreakerOpen => "breaker_open",
            StepStatus::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: EnrichmentStep,
    /// Artist the step ran for, on artist steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(flatten)]
    pub status: StepStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentReport {
    pub steps: Vec<StepReport>,
}

impl EnrichmentReport {
    pub fn record(&mut self, step: EnrichmentStep, status: StepStatus) {
        self.steps.push(StepReport {
            step,
            subject: None,
            status,
        });
    }

    pub fn record_for(&mut self, step: EnrichmentStep, subject: &str, status: StepStatus) {
        self.steps.push(StepReport {
            step,
            subject: Some(subject.to_string()),
            status,
        });
    }

    /// Status of the first report for `step`.
    pub fn status(&self, step: EnrichmentStep) -> Option<&StepStatus> {
        self.steps.iter().find(|s| s.step == step).map(|s| &s.status)
    }

    pub fn has_failures(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s.status, StepStatus::Failed(_) | StepStatus::BreakerOpen))
    }
}

/// What a successful ingestion wrote.
#[derive(Debug, Clone, Serialize)]
pub struct EventOutcome {
    pub event: ListeningEvent,
    pub artist_ids: Vec<i64>,
    pub album: Album,
    pub album_created: bool,
    pub track: Track,
    pub report: EnrichmentReport,
}
