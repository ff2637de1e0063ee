//! Response cache.
//!
//! - `store.rs`: size-bounded TTL store with LRU eviction
//! - `policy.rs`: which requests/responses are cacheable, and their key

pub mod policy;
pub mod store;

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;

pub use policy::CachePolicy;
pub use store::{CacheStats, EntryInfo, TtlCache, Weigh};

/// A captured upstream response.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Weigh for CachedResponse {
    fn weight(&self) -> usize {
        let headers: usize = self
            .headers
            .iter()
            .map(|(name, value)| name.as_str().len() + value.len())
            .sum();
        self.body.len() + headers + 16
    }
}

/// The store used by the gateway.
pub type ResponseCache = TtlCache<CachedResponse>;
