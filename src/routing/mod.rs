//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (exact `METHOD:path` lookup)
//!     → on miss: ordered scan of wildcard / any-method routes
//!     → matcher.rs (evaluate path pattern and method filter)
//!     → Return: matched RouteEntry or None
//!
//! Route Compilation (on every registry change):
//!     ServiceRegistration[]
//!     → Parse patterns
//!     → Split into exact map + scan list (registration order)
//!     → Freeze as immutable RouteTable, swapped in atomically
//! ```
//!
//! # Design Decisions
//! - Tables are immutable once built; readers never lock
//! - No regex in hot path (exact and prefix matching only)
//! - Exact routes always beat wildcard routes
//! - First registered wildcard match wins

pub mod matcher;
pub mod router;

pub use matcher::{PathPattern, PatternError, RouteMethod};
pub use router::{RouteEntry, RouteTable};
