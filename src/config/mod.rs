//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → component tunables copied into each component at construction
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → services re-registered wholesale
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Only the service table is hot-reloaded; tunables need a restart

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    AdminConfig, Algorithm, CacheConfig, CircuitBreakerConfig, GatewayConfig, HealthCheckConfig,
    IdentityConfig, KeyStrategy, ListenerConfig, LoadBalancingConfig, ObservabilityConfig,
    RateLimitConfig, RetryConfig, SecurityConfig, TimeoutConfig,
};
