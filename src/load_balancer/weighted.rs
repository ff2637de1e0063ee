//! Weighted random load balancing strategy.

use std::net::IpAddr;
use std::sync::Arc;

use crate::load_balancer::{ServiceInstance, Strategy};

/// Draws an instance with probability proportional to its weight.
#[derive(Debug, Default)]
pub struct Weighted;

impl Weighted {
    pub fn new() -> Self {
        Self
    }
}

/// Walk the list subtracting weights until `roll` is exhausted.
///
/// `roll` must be in `0..total_weight`.
fn pick(instances: &[Arc<ServiceInstance>], mut roll: u64) -> Option<&Arc<ServiceInstance>> {
    for instance in instances {
        let weight = u64::from(instance.weight);
        if roll < weight {
            return Some(instance);
        }
        roll -= weight;
    }
    None
}

impl Strategy for Weighted {
    fn next_server(
        &self,
        instances: &[Arc<ServiceInstance>],
        _client: Option<IpAddr>,
    ) -> Option<Arc<ServiceInstance>> {
        let total: u64 = instances.iter().map(|i| u64::from(i.weight)).sum();
        if total == 0 {
            // All weights zero: degrade to the first candidate.
            return instances.first().cloned();
        }

        pick(instances, fastrand::u64(0..total)).cloned()
    }
}
