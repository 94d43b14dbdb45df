use failsafe::futures::CircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error, StateMachine};
use std::time::Duration;

use crate::core::errors::ServiceError;

/// Circuit breaker guarding one upstream provider
///
/// Policy:
/// - 5 consecutive failures trigger OPEN state
/// - 10 seconds cool-down before HALF-OPEN
///
/// An open breaker rejects calls immediately; it never retries on the caller's behalf.
pub type UpstreamCircuitBreaker =
    StateMachine<failure_policy::ConsecutiveFailures<backoff::Constant>, ()>;

pub fn create_circuit_breaker() -> UpstreamCircuitBreaker {
    Config::new()
        .failure_policy(failure_policy::consecutive_failures(
            5,
            backoff::constant(Duration::from_secs(10)),
        ))
        .build()
}

/// Run an upstream call under the breaker
///
/// The operation's own error is returned untouched; a rejected call becomes
/// `UpstreamError` for `service`. Only `ServiceError::is_upstream_fault` errors
/// count toward opening the breaker.
pub async fn execute_with_cb<F, Fut, T>(
    cb: &UpstreamCircuitBreaker,
    service: &str,
    operation: F,
) -> Result<T, ServiceError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, ServiceError>>,
{
    match cb
        .call_with(ServiceError::is_upstream_fault, operation())
        .await
    {
        Ok(val) => Ok(val),
        Err(Error::Inner(e)) => Err(e),
        Err(Error::Rejected) => Err(ServiceError::upstream(
            service,
            "circuit breaker open",
        )),
    }
}
