use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The sample lacks an artist or a track title.
    #[error("incomplete sample from {source_id}")]
    InvalidSample { source_id: String },

    #[error("catalog store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl IngestError {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestError::NotFound { .. } => "not_found",
            IngestError::InvalidSample { .. } => "invalid_sample",
            IngestError::Store(_) => "store",
        }
    }
}
