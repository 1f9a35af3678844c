// Resilience - circuit breaker around hosted backend calls

use crate::core::errors::FetchError;
use failsafe::futures::CircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error, StateMachine};
use std::future::Future;
use std::time::Duration;

/// Circuit breaker guarding calls to the hosted backend
///
/// Policy:
/// - 5 consecutive transient failures trigger OPEN state
/// - 5 seconds cool-down period before HALF-OPEN
///
/// Only transient failures count; an invalid session or a rejected write is
/// an answer from a healthy backend.
pub type BackendCircuitBreaker =
    StateMachine<failure_policy::ConsecutiveFailures<backoff::Constant>, ()>;

pub fn create_circuit_breaker() -> BackendCircuitBreaker {
    Config::new()
        .failure_policy(failure_policy::consecutive_failures(
            5,
            backoff::constant(Duration::from_secs(5)),
        ))
        .build()
}

/// Run a backend call under the circuit breaker. A rejected call (circuit
/// open) surfaces as `FetchError::Transient` without touching the network.
pub async fn execute_with_cb<F, Fut, T>(
    cb: &BackendCircuitBreaker,
    operation: F,
) -> Result<T, FetchError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let counts_as_failure = |e: &FetchError| e.is_transient();
    match cb.call_with(counts_as_failure, operation()).await {
        Ok(val) => Ok(val),
        Err(Error::Inner(e)) => Err(e),
        Err(Error::Rejected) => Err(FetchError::Transient(
            "Circuit Breaker Open: Backend Unavailable".to_string(),
        )),
    }
}
