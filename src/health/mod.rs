//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe every instance concurrently, each with its own timeout
//!     → Feed the outcome into state.rs
//!
//! State machine (state.rs):
//!     Healthy ←→ Unhealthy
//!     With thresholds to prevent flapping
//! ```
//!
//! # Design Decisions
//! - State transitions require consecutive successes/failures
//! - Health state is per-instance, not per-service
//! - Only probes move the state machine; forwarded traffic does not

pub mod active;
pub mod state;

pub use active::HealthMonitor;
pub use state::{HealthThresholds, HealthTracker, HealthTransition};
