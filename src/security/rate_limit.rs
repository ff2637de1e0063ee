//! Fixed-window rate limiting.
//!
//! Each key owns one window: a counter and the instant the window resets.
//! The first request after a reset opens a fresh window with a count of 1.
//! A denied request does not increment the counter.
//!
//! Windows live in a `DashMap`, so the read-modify-write of one key happens
//! under that key's shard lock and never across an `.await`.

use std::net::IpAddr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::http::{HeaderMap, HeaderValue};
use dashmap::DashMap;

use crate::config::{KeyStrategy, RateLimitConfig};
use crate::registry::types::RateLimitRule;

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// Result of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the key's window resets.
    pub reset_after: Duration,
}

impl RateLimitDecision {
    /// Reset time as Unix epoch seconds, rounded up.
    pub fn reset_epoch_secs(&self) -> u64 {
        let reset = SystemTime::now() + self.reset_after;
        let since_epoch = reset.duration_since(UNIX_EPOCH).unwrap_or_default();
        since_epoch.as_secs() + u64::from(since_epoch.subsec_nanos() > 0)
    }

    /// Seconds a denied client should wait; never zero.
    pub fn retry_after_secs(&self) -> u64 {
        let millis = self.reset_after.as_millis() as u64;
        millis.div_ceil(1000).max(1)
    }
}

/// Per-key fixed-window limiter.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn key_strategy(&self) -> KeyStrategy {
        self.config.key_generator
    }

    /// Limiter key for a request under the configured strategy.
    pub fn key_for(&self, headers: &HeaderMap, client: Option<IpAddr>) -> String {
        key_for(self.config.key_generator, self.config.trust_forwarded_for, headers, client)
    }

    pub fn check_limit(&self, key: &str, rule: Option<&RateLimitRule>) -> RateLimitDecision {
        self.check_limit_at(key, rule, Instant::now())
    }

    /// Admit or deny one request for `key` at `now`. A route rule overrides
    /// the limiter's default window and ceiling.
    pub fn check_limit_at(&self, key: &str, rule: Option<&RateLimitRule>, now: Instant) -> RateLimitDecision {
        let (window_len, limit) = match rule {
            Some(rule) => (Duration::from_millis(rule.window_ms), rule.max_requests),
            None => (Duration::from_millis(self.config.window_ms), self.config.max_requests),
        };

        let mut window = self.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            reset_at: now + window_len,
        });

        if window.count == 0 || now >= window.reset_at {
            window.count = 1;
            window.reset_at = now + window_len;
        } else if window.count >= limit {
            return RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_after: window.reset_at.saturating_duration_since(now),
            };
        } else {
            window.count += 1;
        }

        RateLimitDecision {
            allowed: window.count <= limit,
            limit,
            remaining: limit.saturating_sub(window.count),
            reset_after: window.reset_at.saturating_duration_since(now),
        }
    }

    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    /// Drop every window whose reset time has passed. Returns how many went.
    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| window.reset_at > now);
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            tracing::debug!(removed, "Swept expired rate limit windows");
        }
        removed
    }

    /// Number of tracked windows.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Derive the limiter key for a request. Missing attributes fall back to the
/// client address, and a request without any address shares the `unknown` key.
/// `X-Forwarded-For` is only consulted when `trust_forwarded_for` is set.
pub fn key_for(
    strategy: KeyStrategy,
    trust_forwarded_for: bool,
    headers: &HeaderMap,
    client: Option<IpAddr>,
) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    match strategy {
        KeyStrategy::User => {
            if let Some(user) = header("x-user-id") {
                return format!("user:{user}");
            }
        }
        KeyStrategy::ApiKey => {
            if let Some(key) = header("x-api-key") {
                return format!("api_key:{key}");
            }
        }
        KeyStrategy::Ip => {}
    }

    let forwarded = header("x-forwarded-for")
        .filter(|_| trust_forwarded_for)
        .and_then(|v| v.split(',').next())
        .and_then(|hop| hop.trim().parse::<IpAddr>().ok());

    match forwarded.or(client) {
        Some(ip) => format!("ip:{ip}"),
        None => "ip:unknown".to_string(),
    }
}

/// Attach the `X-RateLimit-*` headers describing `decision`.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_epoch_secs()));
}
