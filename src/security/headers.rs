//! Header handling at the gateway boundary.
//!
//! # Responsibilities
//! - Copy only allow-listed inbound headers onto the outbound call
//! - Stamp `x-gateway`, `x-gateway-version` and append the client to
//!   `x-forwarded-for`
//! - Strip hop-by-hop and internal routing headers from upstream responses

use std::net::IpAddr;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::{IdentityConfig, SecurityConfig};

pub const X_GATEWAY: &str = "x-gateway";
pub const X_GATEWAY_VERSION: &str = "x-gateway-version";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Inbound headers forwarded to backends unless extended by configuration.
const DEFAULT_FORWARD_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "x-api-key",
    "x-user-id",
    "content-type",
    "accept",
    "accept-language",
    "user-agent",
    "x-request-id",
    "x-forwarded-for",
    "x-forwarded-proto",
    "x-forwarded-host",
    "x-real-ip",
];

/// Headers that describe one connection and must not be relayed.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Response headers that would reveal backend internals.
const INTERNAL_RESPONSE_HEADERS: &[&str] = &["server", "x-powered-by"];
const INTERNAL_RESPONSE_PREFIXES: &[&str] = &["x-internal-", "x-backend-", "x-upstream-"];

/// Allow-list and identity stamps applied to every forwarded call.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    allowed: Vec<HeaderName>,
    gateway_name: HeaderValue,
    gateway_version: HeaderValue,
}

impl HeaderPolicy {
    pub fn new(identity: &IdentityConfig, security: &SecurityConfig) -> Self {
        let mut allowed: Vec<HeaderName> = DEFAULT_FORWARD_HEADERS
            .iter()
            .map(|name| HeaderName::from_static(name))
            .collect();

        for extra in &security.forward_headers {
            match HeaderName::try_from(extra.to_ascii_lowercase()) {
                Ok(name) if !allowed.contains(&name) => allowed.push(name),
                Ok(_) => {}
                Err(_) => tracing::warn!(header = %extra, "Ignoring invalid forward header name"),
            }
        }

        Self {
            allowed,
            gateway_name: header_value(&identity.name, "api-gateway"),
            gateway_version: header_value(&identity.version, env!("CARGO_PKG_VERSION")),
        }
    }

    /// Build the header set for the outbound call.
    pub fn outbound_headers(&self, inbound: &HeaderMap, client: Option<IpAddr>) -> HeaderMap {
        let mut out = HeaderMap::with_capacity(self.allowed.len() + 2);
        for name in &self.allowed {
            for value in inbound.get_all(name) {
                out.append(name.clone(), value.clone());
            }
        }

        out.insert(X_GATEWAY, self.gateway_name.clone());
        out.insert(X_GATEWAY_VERSION, self.gateway_version.clone());

        if let Some(ip) = client {
            let chain = match inbound.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(existing) if !existing.trim().is_empty() => format!("{}, {ip}", existing.trim()),
                _ => ip.to_string(),
            };
            if let Ok(value) = HeaderValue::try_from(chain) {
                out.insert(X_FORWARDED_FOR, value);
            }
        }
        out
    }
}

fn header_value(value: &str, fallback: &'static str) -> HeaderValue {
    HeaderValue::try_from(value).unwrap_or_else(|_| HeaderValue::from_static(fallback))
}

/// Remove headers that must not reach the client. `content-length` goes too
/// since the response body is re-framed by the gateway.
pub fn filter_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        let n = name.as_str();
        let internal = HOP_BY_HOP.contains(&n)
            || INTERNAL_RESPONSE_HEADERS.contains(&n)
            || INTERNAL_RESPONSE_PREFIXES.iter().any(|p| n.starts_with(p))
            || n == "content-length";
        if !internal {
            out.append(name.clone(), value.clone());
        }
    }
    out
}
