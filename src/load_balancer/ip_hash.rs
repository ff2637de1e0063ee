//! Client-address affinity strategy.

use std::net::IpAddr;
use std::sync::Arc;

use crate::load_balancer::{ServiceInstance, Strategy};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Maps each client address to the same instance while the healthy set is stable.
#[derive(Debug, Default)]
pub struct IpHash;

impl IpHash {
    pub fn new() -> Self {
        Self
    }
}

/// FNV-1a; stable across processes and releases, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

impl Strategy for IpHash {
    fn next_server(
        &self,
        instances: &[Arc<ServiceInstance>],
        client: Option<IpAddr>,
    ) -> Option<Arc<ServiceInstance>> {
        if instances.is_empty() {
            return None;
        }

        let key = client.map(|ip| ip.to_string()).unwrap_or_else(|| "unknown".to_string());
        let index = (fnv1a(key.as_bytes()) % instances.len() as u64) as usize;
        Some(instances[index].clone())
    }
}
