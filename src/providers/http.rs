//! Mapping of HTTP transport failures and status codes onto `ProviderError`.

use super::{ProviderError, TransientKind};
use reqwest::StatusCode;
use std::error::Error as _;
use std::io;

/// Classifies a failed request. Timeouts and refused or reset connections
/// are transient; everything else is permanent.
pub(crate) fn classify_request_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        return ProviderError::timeout(e.to_string());
    }
    if let Some(kind) = io_error_kind(&e) {
        return ProviderError::transient(kind, e.to_string());
    }
    if e.is_connect() {
        return ProviderError::transient(TransientKind::ConnectionRefused, e.to_string());
    }
    if e.is_decode() {
        return ProviderError::permanent(format!("invalid response: {}", e));
    }
    ProviderError::permanent(e.to_string())
}

fn io_error_kind(e: &reqwest::Error) -> Option<TransientKind> {
    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::ConnectionRefused => return Some(TransientKind::ConnectionRefused),
                io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                    return Some(TransientKind::ConnectionReset)
                }
                io::ErrorKind::TimedOut => return Some(TransientKind::Timeout),
                _ => {}
            }
        }
        source = err.source();
    }
    None
}

/// 429 and 503 are rate limiting, other non-success codes are permanent.
pub(crate) fn check_status(service: &str, status: StatusCode) -> Result<(), ProviderError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => Err(
            ProviderError::transient(TransientKind::RateLimited, format!("{} returned {}", service, status)),
        ),
        StatusCode::GATEWAY_TIMEOUT => Err(ProviderError::timeout(format!(
            "{} returned {}",
            service, status
        ))),
        _ => Err(ProviderError::permanent(format!(
            "{} returned {}",
            service, status
        ))),
    }
}
