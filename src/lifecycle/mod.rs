//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → listeners stop accepting → in-flight requests drain
//!             → health monitor, maintenance and reload tasks exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
