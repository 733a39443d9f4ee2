use std::fmt;
use thiserror::Error;

/// Failures that are worth trying again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    Timeout,
    ConnectionRefused,
    ConnectionReset,
    /// HTTP 429 or 503.
    RateLimited,
}

impl TransientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransientKind::Timeout => "timeout",
            TransientKind::ConnectionRefused => "connection_refused",
            TransientKind::ConnectionReset => "connection_reset",
            TransientKind::RateLimited => "rate_limited",
        }
    }
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a failed call to an external metadata or text provider.
///
/// Whether a failure is retried is decided by its variant alone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("transient provider failure ({kind}): {message}")]
    Transient { kind: TransientKind, message: String },

    /// Auth failures, rejected requests, unparseable responses.
    #[error("provider failure: {0}")]
    Permanent(String),

    #[error("circuit breaker open for {service}")]
    BreakerOpen { service: String },
}

impl ProviderError {
    pub fn transient(kind: TransientKind, message: impl Into<String>) -> Self {
        ProviderError::Transient {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::transient(TransientKind::Timeout, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        ProviderError::Permanent(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient { .. })
    }

    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderError::Transient { kind, .. } => kind.as_str(),
            ProviderError::Permanent(_) => "permanent",
            ProviderError::BreakerOpen { .. } => "breaker_open",
        }
    }
}
