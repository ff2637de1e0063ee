//! Error taxonomy of the request path.
//!
//! Every failure a caller can observe is a [`GatewayError`]; each variant maps
//! to exactly one status code and renders as a short JSON body. Internal
//! details (backend addresses, error chains) only go to the log.

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::http::forward::UpstreamResponse;

/// Failures surfaced to the client.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Admission denied by the rate limiter.
    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    /// No route matches the request.
    #[error("No route matches {method} {path}")]
    RouteNotFound { method: String, path: String },

    /// A protected route was called without credentials.
    #[error("Authentication required")]
    Unauthorized,

    /// The owning service has no instance that may take traffic.
    #[error("No healthy instance available for service '{0}'")]
    NoHealthyInstance(String),

    /// The circuit guarding the route is open.
    #[error("Circuit '{0}' is open")]
    CircuitOpen(String),

    /// Transport-level failure talking to the instance.
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    /// The instance did not answer within the route's timeout.
    #[error("Upstream request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::NoHealthyInstance(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::CircuitOpen(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::RouteNotFound { .. } => "route_not_found",
            GatewayError::Unauthorized => "unauthorized",
            GatewayError::NoHealthyInstance(_) => "service_unavailable",
            GatewayError::CircuitOpen(_) => "circuit_open",
            GatewayError::Upstream(_) => "upstream_error",
            GatewayError::Timeout(_) => "upstream_timeout",
            GatewayError::PayloadTooLarge => "payload_too_large",
            GatewayError::BadRequest(_) => "bad_request",
        }
    }

    /// Message safe to show to the client.
    fn public_message(&self) -> String {
        match self {
            // The cause may carry backend addresses.
            GatewayError::Upstream(_) => "Upstream request failed".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = json!({
            "error": self.code(),
            "message": self.public_message(),
        });

        let retry_after = match &self {
            GatewayError::RateLimited { retry_after_secs } => {
                body["retryAfter"] = json!(retry_after_secs);
                Some(*retry_after_secs)
            }
            _ => None,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Outcome of one failed forwarding attempt.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// Connection refused, reset, malformed response, oversized body...
    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The instance answered with a 5xx. The response is kept so it can
    /// still be relayed verbatim.
    #[error("upstream returned {}", .0.status)]
    ServerError(UpstreamResponse),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            GatewayError::RateLimited { retry_after_secs: 1 }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            GatewayError::RouteNotFound { method: "GET".into(), path: "/x".into() }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::NoHealthyInstance("svc".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::Timeout(Duration::from_secs(1)).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn rate_limited_response_carries_retry_hint() {
        let response = GatewayError::RateLimited { retry_after_secs: 7 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "7");
    }

    #[tokio::test]
    async fn upstream_details_are_not_leaked() {
        let response =
            GatewayError::Upstream("connect 10.0.0.7:3000 refused".into()).into_response();
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("10.0.0.7"));
        assert!(text.contains("upstream_error"));
    }
}
