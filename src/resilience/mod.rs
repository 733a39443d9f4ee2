//! Retry and circuit breaking around provider calls.

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{
    BreakerRegistry, BreakerSnapshot, BreakerState, CircuitBreaker, CircuitBreakerConfig,
};
pub use retry::RetryPolicy;

use crate::clock::Clock;
use crate::metrics;
use crate::providers::ProviderError;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Wraps provider calls in the retry policy and the breaker of the named
/// service. The breaker sees one outcome per call, after retries.
pub struct ResilientCaller {
    retry: RetryPolicy,
    breakers: BreakerRegistry,
}

impl ResilientCaller {
    pub fn new(retry: RetryPolicy, breaker_config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            retry,
            breakers: BreakerRegistry::new(breaker_config, clock),
        }
    }

    pub async fn call<T, F, Fut>(&self, service: &str, op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let breaker = self.breakers.get(service);
        if !breaker.allow() {
            debug!("Skipping call to {}: circuit open", service);
            metrics::record_provider_call(service, "breaker_open");
            return Err(ProviderError::BreakerOpen {
                service: service.to_string(),
            });
        }

        let result = self.retry.run(service, op).await;
        match &result {
            Ok(_) => {
                breaker.record_success();
                metrics::record_provider_call(service, "ok");
            }
            Err(e) => {
                breaker.record_failure();
                metrics::record_provider_call(service, e.as_str());
            }
        }
        result
    }

    pub fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        self.breakers.snapshots()
    }
}
