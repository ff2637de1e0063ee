//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes of every registered service
//! - Look up the matching route for a method and path
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(1) exact lookup via HashMap keyed by `METHOD:path`
//! - O(n) ordered scan for wildcard and any-method routes

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;

use crate::registry::{RouteDefinition, ServiceRegistration};
use crate::routing::matcher::{PathPattern, RouteMethod};

/// A route bound to the service that owns it.
#[derive(Debug)]
pub struct RouteEntry {
    pub service: String,
    pub definition: RouteDefinition,
    pub pattern: PathPattern,
    /// Name of the circuit guarding calls through this route.
    pub circuit_name: String,
}

impl RouteEntry {
    fn new(service: &str, definition: RouteDefinition, pattern: PathPattern) -> Self {
        let circuit_name = format!("{}:{}:{}", service, definition.method, definition.path);
        Self {
            service: service.to_string(),
            definition,
            pattern,
            circuit_name,
        }
    }

    /// Path forwarded to the instance for a request path this route matched.
    ///
    /// The literal prefix of the pattern is replaced by the route's target.
    pub fn target_path(&self, request_path: &str) -> String {
        let target = self
            .definition
            .target
            .as_deref()
            .unwrap_or_else(|| self.pattern.literal());
        let remainder = self.pattern.remainder(request_path);

        let joined = format!("{}{}", target.trim_end_matches('/'), remainder);
        if joined.is_empty() {
            "/".to_string()
        } else {
            joined
        }
    }
}

/// Compiled routing table.
#[derive(Debug, Default)]
pub struct RouteTable {
    exact: HashMap<String, Arc<RouteEntry>>,
    scan: Vec<Arc<RouteEntry>>,
}

impl RouteTable {
    /// Compile routes of the given services, in order.
    ///
    /// Routes with unparseable patterns are skipped with a warning; the
    /// registry rejects them before they get here.
    pub fn build<'a>(services: impl IntoIterator<Item = &'a ServiceRegistration>) -> Self {
        let mut table = RouteTable::default();

        for service in services {
            for definition in &service.routes {
                let pattern = match PathPattern::parse(&definition.path) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!(service = %service.name, error = %e, "Skipping route");
                        continue;
                    }
                };

                let exact_key = match (&definition.method, &pattern) {
                    (RouteMethod::Exact(m), PathPattern::Exact(p)) => Some(route_key(m, p)),
                    _ => None,
                };
                let entry = Arc::new(RouteEntry::new(&service.name, definition.clone(), pattern));

                match exact_key {
                    Some(key) => {
                        if let Some(existing) = table.exact.get(&key) {
                            tracing::warn!(
                                key = %key,
                                owner = %existing.service,
                                ignored = %service.name,
                                "Duplicate route, keeping first registration"
                            );
                        } else {
                            table.exact.insert(key, entry);
                        }
                    }
                    None => table.scan.push(entry),
                }
            }
        }

        table
    }

    /// Find the route for a request. Exact keys win over scanned routes.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<Arc<RouteEntry>> {
        if let Some(entry) = self.exact.get(&route_key(method, path)) {
            return Some(entry.clone());
        }

        self.scan
            .iter()
            .find(|e| e.definition.method.matches(method) && e.pattern.matches(path))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.scan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn route_key(method: &Method, path: &str) -> String {
    format!("{method}:{path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str, routes: Vec<RouteDefinition>) -> ServiceRegistration {
        let mut s = ServiceRegistration::new(name, "http://127.0.0.1:3000");
        s.routes = routes;
        s
    }

    #[test]
    fn test_exact_beats_wildcard_regardless_of_order() {
        let services = vec![
            service("wild", vec![RouteDefinition::any("/api/*")]),
            service("exact", vec![RouteDefinition::new(Method::GET, "/api/foo")]),
        ];
        let table = RouteTable::build(&services);

        let hit = table.match_route(&Method::GET, "/api/foo").unwrap();
        assert_eq!(hit.service, "exact");

        let hit = table.match_route(&Method::POST, "/api/foo").unwrap();
        assert_eq!(hit.service, "wild");
    }

    #[test]
    fn test_first_wildcard_wins() {
        let services = vec![service(
            "svc",
            vec![
                RouteDefinition::new(Method::GET, "/api/*"),
                RouteDefinition::any("/api/*"),
            ],
        )];
        let table = RouteTable::build(&services);

        let hit = table.match_route(&Method::GET, "/api/x").unwrap();
        assert_eq!(hit.definition.method, RouteMethod::Exact(Method::GET));

        let hit = table.match_route(&Method::PUT, "/api/x").unwrap();
        assert_eq!(hit.definition.method, RouteMethod::Any);
    }

    #[test]
    fn test_no_match() {
        let services = vec![service("svc", vec![RouteDefinition::new(Method::GET, "/a")])];
        let table = RouteTable::build(&services);
        assert!(table.match_route(&Method::GET, "/b").is_none());
        assert!(table.match_route(&Method::POST, "/a").is_none());
    }

    #[test]
    fn test_target_path() {
        let services = vec![service(
            "svc",
            vec![
                RouteDefinition::any("/users/*").with_target("/v1/users"),
                RouteDefinition::new(Method::GET, "/health").with_target("/status"),
                RouteDefinition::any("/orders/*"),
            ],
        )];
        let table = RouteTable::build(&services);

        let users = table.match_route(&Method::GET, "/users/42").unwrap();
        assert_eq!(users.target_path("/users/42"), "/v1/users/42");
        assert_eq!(users.target_path("/users"), "/v1/users");

        let health = table.match_route(&Method::GET, "/health").unwrap();
        assert_eq!(health.target_path("/health"), "/status");

        let orders = table.match_route(&Method::GET, "/orders/7/items").unwrap();
        assert_eq!(orders.target_path("/orders/7/items"), "/orders/7/items");
    }

    #[test]
    fn test_circuit_name_is_per_service_route() {
        let services = vec![service("users", vec![RouteDefinition::new(Method::GET, "/u/*")])];
        let table = RouteTable::build(&services);
        let hit = table.match_route(&Method::GET, "/u/1").unwrap();
        assert_eq!(hit.circuit_name, "users:GET:/u/*");
    }
}
