//! Cache eligibility and key derivation.

use std::collections::HashSet;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

use axum::http::{header, HeaderMap, Method, StatusCode, Uri};

use crate::config::CacheConfig;
use crate::registry::types::CacheRule;

const CREDENTIAL_HEADERS: [&str; 2] = ["authorization", "x-api-key"];

/// Which requests and responses may be cached, and under which key.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    enabled: bool,
    methods: HashSet<Method>,
    statuses: HashSet<u16>,
}

impl CachePolicy {
    pub fn new(config: &CacheConfig) -> Self {
        let methods = config
            .cacheable_methods
            .iter()
            .filter_map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
            .collect();

        Self {
            enabled: config.enabled,
            methods,
            statuses: config.cacheable_status_codes.iter().copied().collect(),
        }
    }

    /// The request may be answered from, and stored into, the cache.
    pub fn is_cacheable_request(&self, method: &Method, rule: Option<&CacheRule>) -> bool {
        self.enabled && self.methods.contains(method) && rule.map_or(true, |r| r.enabled)
    }

    pub fn is_cacheable_status(&self, status: StatusCode) -> bool {
        self.statuses.contains(&status.as_u16())
    }

    /// Route TTL override, if any. `None` means the store's default.
    pub fn ttl(&self, rule: Option<&CacheRule>) -> Option<Duration> {
        rule.and_then(|r| r.ttl_secs).map(Duration::from_secs)
    }

    /// Responses that set cookies belong to one caller and are never stored.
    pub fn is_storable_response(&self, headers: &HeaderMap) -> bool {
        !headers.contains_key(header::SET_COOKIE)
    }

    /// `METHOD:path?query`, followed by one `|name=hash` segment per vary-by
    /// header. Protected routes always vary by the credential headers. Header
    /// values are hashed so credentials never appear in the key that is
    /// echoed back in `X-Cache-Key`.
    pub fn cache_key(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        rule: Option<&CacheRule>,
        protected: bool,
    ) -> String {
        let mut key = match uri.query() {
            Some(query) => format!("{}:{}?{}", method, uri.path(), query),
            None => format!("{}:{}", method, uri.path()),
        };

        let mut names: Vec<String> = rule
            .map(|r| r.vary_by.iter().map(|n| n.to_ascii_lowercase()).collect())
            .unwrap_or_default();
        if protected {
            for name in CREDENTIAL_HEADERS {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }

        for name in names {
            let mut hasher = DefaultHasher::new();
            for value in headers.get_all(name.as_str()) {
                value.as_bytes().hash(&mut hasher);
            }
            key.push_str(&format!("|{}={:016x}", name, hasher.finish()));
        }
        key
    }
}
