//! Per-service instance pools.
//!
//! # Responsibilities
//! - Hold the instances of every registered service, in registration order
//! - Apply the configured strategy to select an instance
//! - Decide what happens when no instance is healthy

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use url::Url;

use crate::config::{Algorithm, LoadBalancingConfig};
use crate::load_balancer::{strategy_for, ServiceInstance, Strategy};

#[derive(Debug)]
struct ServicePool {
    instances: Vec<Arc<ServiceInstance>>,
    strategy: Box<dyn Strategy>,
}

/// Snapshot of one instance for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatus {
    pub service: String,
    pub address: String,
    pub weight: u32,
    pub healthy: bool,
    pub active_connections: usize,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

/// Manages instance pools and selection.
#[derive(Debug)]
pub struct LoadBalancer {
    algorithm: Algorithm,
    fallback_to_first_instance: bool,
    pools: RwLock<HashMap<String, ServicePool>>,
}

impl LoadBalancer {
    pub fn new(config: &LoadBalancingConfig) -> Self {
        Self {
            algorithm: config.algorithm,
            fallback_to_first_instance: config.fallback_to_first_instance,
            pools: RwLock::new(HashMap::new()),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Install the instance list of a service, replacing any previous one.
    ///
    /// Instances whose address and weight did not change keep their health
    /// history and connection count; the selection cursor starts over.
    pub fn register(&self, service: &str, instances: Vec<(Url, u32)>, health_path: Option<String>) {
        let mut pools = self.pools.write().unwrap_or_else(PoisonError::into_inner);

        let previous: Vec<Arc<ServiceInstance>> = pools
            .get(service)
            .map(|p| p.instances.clone())
            .unwrap_or_default();

        let instances = instances
            .into_iter()
            .map(|(url, weight)| {
                previous
                    .iter()
                    .find(|p| p.base_url == url && p.weight == weight && p.health_path == health_path)
                    .cloned()
                    .unwrap_or_else(|| {
                        Arc::new(
                            ServiceInstance::new(service, url, weight)
                                .with_health_path(health_path.clone()),
                        )
                    })
            })
            .collect::<Vec<_>>();

        tracing::info!(
            service = %service,
            instances = instances.len(),
            algorithm = ?self.algorithm,
            "Service instances registered"
        );

        pools.insert(
            service.to_string(),
            ServicePool {
                instances,
                strategy: strategy_for(self.algorithm),
            },
        );
    }

    /// Remove a service's pool. Returns whether it existed.
    pub fn unregister(&self, service: &str) -> bool {
        let removed = self
            .pools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(service)
            .is_some();
        if removed {
            tracing::info!(service = %service, "Service instances removed");
        }
        removed
    }

    /// Select an instance of `service` for a request from `client`.
    ///
    /// Returns `None` when the service is unknown, or when no instance is
    /// healthy and the first-instance fallback is disabled.
    pub fn select(&self, service: &str, client: Option<IpAddr>) -> Option<Arc<ServiceInstance>> {
        let pools = self.pools.read().unwrap_or_else(PoisonError::into_inner);
        let Some(pool) = pools.get(service) else {
            tracing::debug!(service = %service, "Service not found in load balancer");
            return None;
        };

        let healthy: Vec<Arc<ServiceInstance>> = pool
            .instances
            .iter()
            .filter(|i| i.is_healthy())
            .cloned()
            .collect();

        if healthy.is_empty() {
            if self.fallback_to_first_instance {
                let first = pool.instances.first().cloned();
                if let Some(instance) = &first {
                    tracing::warn!(
                        service = %service,
                        instance = %instance.id(),
                        "No healthy instances, falling back to first registered instance"
                    );
                }
                return first;
            }
            tracing::debug!(
                service = %service,
                instance_count = pool.instances.len(),
                "No healthy instances found"
            );
            return None;
        }

        pool.strategy.next_server(&healthy, client)
    }

    /// Instances of one service, in registration order.
    pub fn instances(&self, service: &str) -> Vec<Arc<ServiceInstance>> {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service)
            .map(|p| p.instances.clone())
            .unwrap_or_default()
    }

    /// Every instance of every service (for health checking).
    pub fn all_instances(&self) -> Vec<Arc<ServiceInstance>> {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .flat_map(|p| p.instances.iter())
            .cloned()
            .collect()
    }

    pub fn status(&self) -> Vec<InstanceStatus> {
        let mut statuses: Vec<InstanceStatus> = self
            .all_instances()
            .into_iter()
            .map(|i| {
                let health = i.health();
                InstanceStatus {
                    service: i.service.clone(),
                    address: i.id().to_string(),
                    weight: i.weight,
                    healthy: health.is_healthy(),
                    active_connections: i.active_connections(),
                    consecutive_successes: health.consecutive_successes(),
                    consecutive_failures: health.consecutive_failures(),
                }
            })
            .collect();
        statuses.sort_by(|a, b| a.service.cmp(&b.service));
        statuses
    }
}
