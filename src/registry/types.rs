//! Service and route definitions.
//!
//! These are plain data: they deserialize straight out of the `[[services]]`
//! tables of the configuration file and are handed to the registry as-is.

use axum::http::Method;
use serde::{Deserialize, Serialize};

use crate::routing::RouteMethod;

/// A logical backend service and the routes it serves.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServiceRegistration {
    pub name: String,

    #[serde(default = "default_version")]
    pub version: String,

    /// Primary instance address, e.g. `http://10.0.0.5:3000`.
    pub base_url: String,

    /// Additional instances. The primary is always the first instance.
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,

    /// Overrides the gateway-wide health check endpoint.
    #[serde(default)]
    pub health_check_path: Option<String>,

    /// Informational; higher means more important.
    #[serde(default)]
    pub priority: u32,

    #[serde(default)]
    pub routes: Vec<RouteDefinition>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl ServiceRegistration {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: default_version(),
            base_url: base_url.into(),
            instances: Vec::new(),
            health_check_path: None,
            priority: 0,
            routes: Vec::new(),
        }
    }

    pub fn with_route(mut self, route: RouteDefinition) -> Self {
        self.routes.push(route);
        self
    }

    pub fn with_instance(mut self, url: impl Into<String>, weight: u32) -> Self {
        self.instances.push(InstanceConfig {
            url: url.into(),
            weight,
        });
        self
    }

    /// Every instance URL in registration order, primary first.
    pub fn instance_urls(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.base_url.as_str()).chain(self.instances.iter().map(|i| i.url.as_str()))
    }

    /// Every instance as `(url, weight)`, primary first with weight 1.
    pub fn weighted_instances(&self) -> Vec<(&str, u32)> {
        std::iter::once((self.base_url.as_str(), 1))
            .chain(self.instances.iter().map(|i| (i.url.as_str(), i.weight)))
            .collect()
    }
}

/// An additional physical endpoint of a service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InstanceConfig {
    pub url: String,

    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// One route of a service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RouteDefinition {
    /// `GET`, `POST`, ... or `*` / `ALL` for any method.
    #[serde(default)]
    pub method: RouteMethod,

    /// Exact path (`/users/me`) or prefix with trailing wildcard (`/users/*`).
    pub path: String,

    /// Path on the instance that replaces the literal part of `path`.
    /// Defaults to the literal part itself.
    #[serde(default)]
    pub target: Option<String>,

    /// Per-attempt upstream timeout override.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Retry count override.
    #[serde(default)]
    pub retries: Option<u32>,

    #[serde(default)]
    pub rate_limit: Option<RateLimitRule>,

    #[serde(default)]
    pub cache: Option<CacheRule>,

    /// Requests must carry credentials (`Authorization` or `X-API-Key`).
    #[serde(default)]
    pub protected: bool,
}

impl RouteDefinition {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self::with_method(RouteMethod::Exact(method), path)
    }

    /// A route matching every method.
    pub fn any(path: impl Into<String>) -> Self {
        Self::with_method(RouteMethod::Any, path)
    }

    fn with_method(method: RouteMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            target: None,
            timeout_ms: None,
            retries: None,
            rate_limit: None,
            cache: None,
            protected: false,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_rate_limit(mut self, rule: RateLimitRule) -> Self {
        self.rate_limit = Some(rule);
        self
    }

    pub fn with_cache(mut self, rule: CacheRule) -> Self {
        self.cache = Some(rule);
        self
    }

    pub fn protected(mut self) -> Self {
        self.protected = true;
        self
    }
}

/// Per-route admission ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RateLimitRule {
    pub window_ms: u64,
    pub max_requests: u32,
}

/// Per-route caching behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CacheRule {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub ttl_secs: Option<u64>,

    /// Request headers whose values become part of the cache key.
    #[serde(default)]
    pub vary_by: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for CacheRule {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: None,
            vary_by: Vec::new(),
        }
    }
}

impl CacheRule {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}
