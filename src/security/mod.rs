//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (fixed-window admission per client key)
//!     → headers.rs (allow-list, gateway stamps, X-Forwarded-For)
//!     → Forward
//! Upstream response:
//!     → headers.rs (strip hop-by-hop and internal headers)
//! ```

pub mod headers;
pub mod rate_limit;

pub use headers::HeaderPolicy;
pub use rate_limit::{RateLimitDecision, RateLimiter};
