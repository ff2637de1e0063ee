//! Retry logic.
//!
//! # Responsibilities
//! - Determine if a request may be retried (idempotent methods only)
//! - Determine if an attempt's failure is worth retrying
//! - Execute retries with exponential backoff + jitter
//!
//! # Design Decisions
//! - Never retry POST/PATCH (non-idempotent)
//! - Connection errors and timeouts always retryable; of the 5xx only
//!   502/503/504
//! - Retries are visible to the backend; idempotency is its job

use std::future::Future;

use axum::http::{Method, StatusCode};

use crate::config::RetryConfig;
use crate::error::ForwardError;
use crate::registry::RouteDefinition;
use crate::resilience::backoff::calculate_backoff;

/// How often and how patiently one request is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first.
    pub retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            retries: 0,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Policy for one request through `route`.
    pub fn for_route(route: &RouteDefinition, method: &Method, config: &RetryConfig) -> Self {
        if !config.enabled || !method.is_idempotent() {
            return Self::none();
        }
        Self {
            retries: route.retries.unwrap_or(config.default_retries),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }

    /// Run `attempt` until it succeeds, fails with a non-retryable error,
    /// or the retries are used up. `attempt` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T, ForwardError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ForwardError>>,
    {
        let mut number = 1;
        loop {
            match attempt(number).await {
                Ok(value) => return Ok(value),
                Err(e) if number <= self.retries && is_retryable(&e) => {
                    let delay = calculate_backoff(number, self.base_delay_ms, self.max_delay_ms);
                    tracing::info!(attempt = number, delay = ?delay, error = %e, "Retrying upstream request");
                    tokio::time::sleep(delay).await;
                    number += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Whether a failed attempt may succeed if repeated.
pub fn is_retryable(error: &ForwardError) -> bool {
    match error {
        ForwardError::Transport(_) | ForwardError::Timeout(_) => true,
        ForwardError::ServerError(response) => matches!(
            response.status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ),
    }
}
