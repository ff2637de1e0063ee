//! Timeout enforcement.
//!
//! An attempt that exceeds its deadline becomes [`ForwardError::Timeout`],
//! which the breaker counts like any other forwarding failure. The dropped
//! future closes the connection; nothing is signalled to the backend.

use std::future::Future;
use std::time::Duration;

use crate::config::{RetryConfig, TimeoutConfig};
use crate::error::ForwardError;
use crate::registry::RouteDefinition;

/// Per-attempt deadline for a route.
pub fn upstream_timeout(route: &RouteDefinition, config: &TimeoutConfig) -> Duration {
    Duration::from_millis(route.timeout_ms.unwrap_or(config.upstream_ms))
}

/// Longest a request through `route` can spend upstream: every attempt
/// timing out, with the maximum backoff between attempts.
pub fn worst_case_budget(route: &RouteDefinition, timeouts: &TimeoutConfig, retries: &RetryConfig) -> Duration {
    let retry_count = if retries.enabled {
        route.retries.unwrap_or(retries.default_retries)
    } else {
        0
    };
    let attempts = upstream_timeout(route, timeouts) * (retry_count + 1);
    attempts + Duration::from_millis(retries.max_delay_ms) * retry_count
}

/// Run one upstream attempt under a deadline.
pub async fn with_deadline<T, F>(deadline: Duration, attempt: F) -> Result<T, ForwardError>
where
    F: Future<Output = Result<T, ForwardError>>,
{
    match tokio::time::timeout(deadline, attempt).await {
        Ok(result) => result,
        Err(_) => Err(ForwardError::Timeout(deadline)),
    }
}
