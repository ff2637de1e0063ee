//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!     → events.rs (circuit and instance state transitions)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Event subscribers (alerting, admin, tests)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through all log lines of a request
//! - Metrics are cheap (atomic increments)
//! - Events are pushed through an explicit bus handed to each component,
//!   never through a global

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{EventBus, GatewayEvent};
