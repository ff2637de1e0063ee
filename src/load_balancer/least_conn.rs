//! Least Connections load balancing strategy.

use std::net::IpAddr;
use std::sync::Arc;

use crate::load_balancer::{ServiceInstance, Strategy};

/// Least connections selector.
/// Selects the instance with the minimum number of active connections.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for LeastConnections {
    fn next_server(
        &self,
        instances: &[Arc<ServiceInstance>],
        _client: Option<IpAddr>,
    ) -> Option<Arc<ServiceInstance>> {
        // In case of tie, the first one is selected (stability)
        instances
            .iter()
            .min_by_key(|i| i.active_connections())
            .cloned()
    }
}
