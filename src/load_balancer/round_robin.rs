//! Round-robin load balancing strategy.

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::{ServiceInstance, Strategy};

/// Round-robin selector.
/// Stores an internal counter to rotate through instances.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for RoundRobin {
    fn next_server(
        &self,
        instances: &[Arc<ServiceInstance>],
        _client: Option<IpAddr>,
    ) -> Option<Arc<ServiceInstance>> {
        if instances.is_empty() {
            return None;
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % instances.len();
        Some(instances[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn inst(port: u16) -> Arc<ServiceInstance> {
        let url = Url::parse(&format!("http://127.0.0.1:{port}")).unwrap();
        Arc::new(ServiceInstance::new("svc", url, 1))
    }

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let a = inst(8080);
        let b = inst(8081);
        let c = inst(8082);
        let instances = vec![a.clone(), b.clone(), c.clone()];

        let picks: Vec<_> = (0..4)
            .map(|_| lb.next_server(&instances, None).unwrap().id().to_string())
            .collect();
        assert_eq!(picks, vec![a.id(), b.id(), c.id(), a.id()]);
    }

    #[test]
    fn test_empty() {
        assert!(RoundRobin::new().next_server(&[], None).is_none());
    }
}
