//! Upstream forwarding.
//!
//! One [`Forwarder::send`] is one attempt: the outbound request is rebuilt
//! from buffered parts, so retries replay the same body. The whole attempt,
//! body read included, runs under the route's deadline.

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, Uri};
use bytes::Bytes;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::error::{ForwardError, GatewayError};
use crate::resilience::timeouts::with_deadline;

/// Largest upstream body relayed to a client.
const MAX_UPSTREAM_BODY: usize = 32 * 1024 * 1024;

/// Fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

/// Everything needed to (re)issue a call to one instance.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Shared HTTP client for backend calls.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
}

impl Forwarder {
    pub fn new() -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client }
    }

    /// Issue one attempt. A 5xx answer comes back as
    /// [`ForwardError::ServerError`] carrying the full response.
    pub async fn send(&self, outbound: &OutboundRequest, deadline: Duration) -> Result<UpstreamResponse, ForwardError> {
        let mut builder = Request::builder()
            .method(outbound.method.clone())
            .uri(outbound.uri.clone());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(outbound.headers.clone());
        }
        let request = builder
            .body(Body::from(outbound.body.clone()))
            .map_err(|e| ForwardError::Transport(e.to_string()))?;

        let response = with_deadline(deadline, async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| ForwardError::Transport(e.to_string()))?;

            let (parts, body) = response.into_parts();
            let body = axum::body::to_bytes(Body::new(body), MAX_UPSTREAM_BODY)
                .await
                .map_err(|e| ForwardError::Transport(format!("reading upstream body: {e}")))?;

            Ok(UpstreamResponse {
                status: parts.status,
                headers: parts.headers,
                body,
            })
        })
        .await?;

        if response.status.is_server_error() {
            return Err(ForwardError::ServerError(response));
        }
        Ok(response)
    }
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::new()
    }
}

/// Absolute URI for `path` (and the original query) on an instance.
pub fn target_uri(base: &Url, path: &str, query: Option<&str>) -> Result<Uri, GatewayError> {
    let mut target = format!("{}{}", base.as_str().trim_end_matches('/'), path);
    if let Some(query) = query {
        target.push('?');
        target.push_str(query);
    }
    target
        .parse::<Uri>()
        .map_err(|e| GatewayError::BadRequest(format!("invalid target uri: {e}")))
}
