//! Service registry.
//!
//! # Responsibilities
//! - Own the table of logical services and their routes
//! - Keep the load balancer's instance pools in step with registrations
//! - Publish a compiled [`RouteTable`] for lock-free request-path lookups
//!
//! # Design Decisions
//! - Re-registering a name replaces the service wholesale, in place
//! - The route table is rebuilt on every change and swapped atomically
//!   (`ArcSwap`), so readers never block writers
//! - Registrations are validated before anything is mutated

pub mod types;

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use arc_swap::ArcSwap;
use axum::http::Method;
use thiserror::Error;
use url::Url;

use crate::load_balancer::LoadBalancer;
use crate::routing::{PathPattern, PatternError, RouteEntry, RouteTable};

pub use types::{CacheRule, InstanceConfig, RateLimitRule, RouteDefinition, ServiceRegistration};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("service name must not be empty")]
    EmptyName,

    #[error("service '{service}' has invalid instance url '{url}': {reason}")]
    InvalidUrl {
        service: String,
        url: String,
        reason: String,
    },

    #[error("service '{service}' has invalid route: {source}")]
    InvalidRoute {
        service: String,
        #[source]
        source: PatternError,
    },

    #[error("service '{0}' is listed more than once")]
    Duplicate(String),
}

#[derive(Debug)]
pub struct ServiceRegistry {
    balancer: Arc<LoadBalancer>,
    services: RwLock<Vec<ServiceRegistration>>,
    routes: ArcSwap<RouteTable>,
}

impl ServiceRegistry {
    pub fn new(balancer: Arc<LoadBalancer>) -> Self {
        Self {
            balancer,
            services: RwLock::new(Vec::new()),
            routes: ArcSwap::from_pointee(RouteTable::default()),
        }
    }

    /// Register a service, replacing any previous registration of the same name.
    pub fn register(&self, service: ServiceRegistration) -> Result<(), RegistryError> {
        let instances = parse_service(&service)?;

        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        self.balancer
            .register(&service.name, instances, service.health_check_path.clone());

        tracing::info!(
            service = %service.name,
            version = %service.version,
            routes = service.routes.len(),
            instances = service.instance_urls().count(),
            "Service registered"
        );

        match services.iter_mut().find(|s| s.name == service.name) {
            Some(existing) => *existing = service,
            None => services.push(service),
        }
        self.rebuild(&services);
        Ok(())
    }

    /// Remove a service with its routes and instances.
    pub fn unregister(&self, name: &str) -> bool {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        let before = services.len();
        services.retain(|s| s.name != name);
        let removed = services.len() != before;

        if removed {
            self.balancer.unregister(name);
            self.rebuild(&services);
            tracing::info!(service = %name, "Service unregistered");
        }
        removed
    }

    /// Make the registered set equal to `desired`: every listed service is
    /// (re-)registered and every other one removed. Nothing changes when
    /// any entry is invalid.
    pub fn sync(&self, desired: Vec<ServiceRegistration>) -> Result<(), RegistryError> {
        let mut names = HashSet::new();
        for service in &desired {
            parse_service(service)?;
            if !names.insert(service.name.clone()) {
                return Err(RegistryError::Duplicate(service.name.clone()));
            }
        }

        let stale: Vec<String> = self
            .list()
            .into_iter()
            .map(|s| s.name)
            .filter(|name| !names.contains(name))
            .collect();
        for name in stale {
            self.unregister(&name);
        }
        for service in desired {
            self.register(service)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<ServiceRegistration> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    /// Every registered service in registration order.
    pub fn list(&self) -> Vec<ServiceRegistration> {
        self.services.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn match_route(&self, method: &Method, path: &str) -> Option<Arc<RouteEntry>> {
        self.routes.load().match_route(method, path)
    }

    /// Current compiled table.
    pub fn route_table(&self) -> Arc<RouteTable> {
        self.routes.load_full()
    }

    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.balancer
    }

    fn rebuild(&self, services: &[ServiceRegistration]) {
        let table = RouteTable::build(services);
        tracing::debug!(routes = table.len(), "Route table rebuilt");
        self.routes.store(Arc::new(table));
    }
}

fn parse_service(service: &ServiceRegistration) -> Result<Vec<(Url, u32)>, RegistryError> {
    if service.name.trim().is_empty() {
        return Err(RegistryError::EmptyName);
    }

    for route in &service.routes {
        PathPattern::parse(&route.path).map_err(|source| RegistryError::InvalidRoute {
            service: service.name.clone(),
            source,
        })?;
    }

    service
        .weighted_instances()
        .into_iter()
        .map(|(raw, weight)| {
            let url = Url::parse(raw).map_err(|e| RegistryError::InvalidUrl {
                service: service.name.clone(),
                url: raw.to_string(),
                reason: e.to_string(),
            })?;
            if !matches!(url.scheme(), "http") {
                return Err(RegistryError::InvalidUrl {
                    service: service.name.clone(),
                    url: raw.to_string(),
                    reason: "only http:// instances are supported".to_string(),
                });
            }
            Ok((url, weight))
        })
        .collect()
}
