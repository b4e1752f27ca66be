//! Bounded retry with exponential backoff, composed with the breaker.
//!
//! Only transient failures are retried and only transient outcomes feed
//! the breaker window; a permanent error means the dependency answered
//! and says nothing about its health.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use super::breaker::{Admission, CircuitBreaker};
use super::{Dependency, FailureKind, Retryable};
use crate::config::RetryPolicy;

/// Terminal outcome of a guarded call.
#[derive(Debug, Error)]
pub enum CallError<E: std::error::Error + 'static> {
    /// The breaker was open; no attempt was made. Callers map this to the
    /// dependency's fallback.
    #[error("{dependency} unavailable (circuit open)")]
    ShortCircuited { dependency: Dependency },

    #[error("{dependency} failed after retries: {source}")]
    Exhausted {
        dependency: Dependency,
        source: E,
    },

    #[error("{dependency} rejected the request: {source}")]
    Permanent {
        dependency: Dependency,
        source: E,
    },
}

impl<E: std::error::Error + 'static> CallError<E> {
    pub fn dependency(&self) -> Dependency {
        match self {
            Self::ShortCircuited { dependency }
            | Self::Exhausted { dependency, .. }
            | Self::Permanent { dependency, .. } => *dependency,
        }
    }
}

/// Run `op` through the breaker with bounded retries and a per-attempt
/// timeout. Each attempt consults breaker state first; an open circuit
/// short-circuits without consuming an attempt.
pub async fn guarded_call<T, E, F, Fut>(
    breaker: &CircuitBreaker,
    policy: &RetryPolicy,
    timeout: Duration,
    mut op: F,
) -> Result<T, CallError<E>>
where
    E: Retryable + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let dependency = breaker.dependency();
    let mut attempt = 1u32;
    loop {
        let probe = match breaker.try_acquire() {
            Admission::ShortCircuit => {
                return Err(CallError::ShortCircuited { dependency });
            }
            Admission::Allow { probe } => probe,
        };

        let error = match tokio::time::timeout(timeout, op()).await {
            Ok(Ok(value)) => {
                breaker.record_success(probe);
                return Ok(value);
            }
            Ok(Err(e)) => e,
            Err(_) => E::timed_out(),
        };

        match error.failure_kind() {
            FailureKind::Permanent => {
                if probe {
                    breaker.record_success(probe);
                }
                return Err(CallError::Permanent {
                    dependency,
                    source: error,
                });
            }
            FailureKind::Transient => {
                breaker.record_failure(probe);
                if attempt >= policy.max_attempts {
                    return Err(CallError::Exhausted {
                        dependency,
                        source: error,
                    });
                }
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    dependency = %dependency,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Retry-only variant for internal stores (no breaker, no call bound).
#[derive(Debug, Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    #[error("exhausted retries: {source}")]
    Exhausted { source: E },

    #[error(transparent)]
    Permanent { source: E },
}

pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, RetryError<E>>
where
    E: Retryable + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1u32;
    loop {
        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        match error.failure_kind() {
            FailureKind::Permanent => return Err(RetryError::Permanent { source: error }),
            FailureKind::Transient => {
                if attempt >= policy.max_attempts {
                    return Err(RetryError::Exhausted { source: error });
                }
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient store failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
