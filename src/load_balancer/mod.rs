//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → owning service identified
//!     → pool.rs (healthy instances of the service)
//!     → Apply the configured strategy:
//!         - round_robin.rs (rotate through instances)
//!         - weighted.rs (random draw proportional to weight)
//!         - least_conn.rs (pick instance with fewest connections)
//!         - ip_hash.rs (stable hash of the client address)
//!     → instance.rs (connection guard for the forwarded call)
//! ```
//!
//! # Design Decisions
//! - Strategies are stateless apart from their own cursor
//! - One strategy object per service, so cursors are per service
//! - Unhealthy instances are excluded before the strategy runs

use std::fmt::Debug;
use std::net::IpAddr;
use std::sync::Arc;

use crate::config::Algorithm;

pub mod instance;
pub mod ip_hash;
pub mod least_conn;
pub mod pool;
pub mod round_robin;
pub mod weighted;

pub use instance::{ConnectionGuard, ServiceInstance};
pub use pool::{InstanceStatus, LoadBalancer};

/// Picks one instance out of a list of candidates.
pub trait Strategy: Send + Sync + Debug {
    /// `instances` only contains candidates that may take traffic.
    fn next_server(
        &self,
        instances: &[Arc<ServiceInstance>],
        client: Option<IpAddr>,
    ) -> Option<Arc<ServiceInstance>>;
}

/// Build a fresh strategy object for the configured algorithm.
pub fn strategy_for(algorithm: Algorithm) -> Box<dyn Strategy> {
    match algorithm {
        Algorithm::RoundRobin => Box::new(round_robin::RoundRobin::new()),
        Algorithm::Weighted => Box::new(weighted::Weighted::new()),
        Algorithm::LeastConnections => Box::new(least_conn::LeastConnections::new()),
        Algorithm::IpHash => Box::new(ip_hash::IpHash::new()),
    }
}
