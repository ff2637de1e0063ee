//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to an instance:
//!     → circuit_breaker.rs (short-circuit if the route's circuit is open)
//!         → retries.rs (repeat retryable failures of idempotent calls)
//!             → backoff.rs (delay between attempts)
//!             → timeouts.rs (deadline per attempt)
//!     ← one success/failure recorded against the circuit
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream attempt has a deadline
//! - Retries only for idempotent requests (GET, HEAD, etc.)
//! - The breaker sees one outcome per request, not per attempt

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{CircuitBreaker, CircuitError, CircuitSnapshot, CircuitState};
pub use retries::RetryPolicy;
