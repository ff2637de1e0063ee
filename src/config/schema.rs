//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::registry::ServiceRegistration;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Gateway identity and mount point.
    pub gateway: IdentityConfig,

    /// Fixed-window admission control.
    pub rate_limit: RateLimitConfig,

    /// Failure isolation per service route.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Instance selection and liveness policy.
    pub load_balancing: LoadBalancingConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,

    pub security: SecurityConfig,

    /// Statically registered backend services.
    pub services: Vec<ServiceRegistration>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Identity stamped on forwarded requests, plus the path the gateway is mounted under.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Value of the `x-gateway` header.
    pub name: String,

    /// Value of the `x-gateway-version` header.
    pub version: String,

    /// Only paths under this prefix are routed; the prefix is stripped before matching.
    /// Empty means the whole path space.
    pub path_prefix: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: "api-gateway".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            path_prefix: String::new(),
        }
    }
}

/// Attribute a rate-limit key is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Client socket address, or the first `x-forwarded-for` hop when
    /// `trust_forwarded_for` is set.
    #[default]
    Ip,
    /// Authenticated user id, as forwarded by the auth layer in `x-user-id`.
    User,
    /// The `x-api-key` header.
    ApiKey,
}

impl KeyStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStrategy::Ip => "ip",
            KeyStrategy::User => "user",
            KeyStrategy::ApiKey => "api_key",
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Fixed window length in milliseconds.
    pub window_ms: u64,

    /// Requests admitted per key per window.
    pub max_requests: u32,

    /// How the limiter key is derived from a request.
    pub key_generator: KeyStrategy,

    /// Key on the first `X-Forwarded-For` hop instead of the socket address.
    /// Only safe behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,

    /// Interval between sweeps of expired windows.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: 60_000,
            max_requests: 100,
            key_generator: KeyStrategy::Ip,
            trust_forwarded_for: false,
            sweep_interval_secs: 60,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// When disabled every call goes straight to the backend.
    pub enabled: bool,

    /// Consecutive failures that trip a closed circuit.
    pub failure_threshold: u32,

    /// Cooldown after the last failure before a probe is admitted.
    pub reset_timeout_ms: u64,

    /// Serve a synthetic degraded response instead of an error when a
    /// call is short-circuited or fails.
    pub fallback_enabled: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            reset_timeout_ms: 30_000,
            fallback_enabled: true,
        }
    }
}

/// Instance selection algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    RoundRobin,
    Weighted,
    LeastConnections,
    IpHash,
}

/// Load balancing configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LoadBalancingConfig {
    pub algorithm: Algorithm,

    /// When no instance is healthy, route to the first registered one
    /// instead of failing with 503.
    pub fallback_to_first_instance: bool,

    pub health_check: HealthCheckConfig,
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Path probed when a service does not declare its own.
    pub endpoint: String,

    /// Probe interval in milliseconds.
    pub interval_ms: u64,

    /// Per-probe timeout in milliseconds.
    pub timeout_ms: u64,

    /// Number of consecutive failures before marking unhealthy.
    pub unhealthy_threshold: u32,

    /// Number of consecutive successes before marking healthy.
    pub healthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "/health".to_string(),
            interval_ms: 30_000,
            timeout_ms: 5_000,
            unhealthy_threshold: 3,
            healthy_threshold: 2,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// TTL applied when a route does not override it, in seconds.
    pub default_ttl_secs: u64,

    /// Budget for the aggregate estimated size of all entries, in bytes.
    pub max_size_bytes: usize,

    /// Upstream statuses whose responses may be stored.
    pub cacheable_status_codes: Vec<u16>,

    /// Request methods whose responses may be stored.
    pub cacheable_methods: Vec<String>,

    /// Interval between sweeps of expired entries.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: 300,
            max_size_bytes: 64 * 1024 * 1024,
            cacheable_status_codes: vec![200, 203, 300, 301, 404, 410],
            cacheable_methods: vec!["GET".to_string(), "HEAD".to_string()],
            sweep_interval_secs: 60,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound for handling one inbound request, in seconds.
    pub request_secs: u64,

    /// Default per-attempt upstream timeout, in milliseconds.
    pub upstream_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 60,
            upstream_ms: 10_000,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Retries per request when a route does not override it.
    pub default_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_retries: 0,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token). Empty locks the API.
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Request hygiene configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request and upstream response body size in bytes.
    pub max_body_size: usize,

    /// Extra inbound headers forwarded on top of the built-in allow-list.
    pub forward_headers: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
            forward_headers: Vec::new(),
        }
    }
}
