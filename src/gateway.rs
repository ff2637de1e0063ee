//! Gateway composition root.
//!
//! # Request pipeline
//! ```text
//! inbound request
//!     → rate limiter (429)
//!     → cache lookup (HIT ends here)
//!     → route match (404), credential presence (401)
//!     → instance selection (503)
//!     → circuit breaker { retries { timeout { forward } } }
//!     → cache store, response headers
//! ```
//!
//! The route table is consulted read-only before admission so per-route
//! limits and cache rules apply; a missing route still surfaces after the
//! limiter and the cache.
//!
//! Every table lives in the component that owns it. A `Gateway` owns one
//! instance of each component, so separate gateways share nothing.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tokio::sync::broadcast;

use crate::cache::{CachePolicy, CachedResponse, ResponseCache};
use crate::config::{GatewayConfig, HealthCheckConfig, IdentityConfig, RetryConfig, TimeoutConfig};
use crate::error::{ForwardError, GatewayError};
use crate::health::HealthMonitor;
use crate::http::forward::{target_uri, Forwarder, OutboundRequest, UpstreamResponse};
use crate::http::request::RequestIdExt;
use crate::load_balancer::LoadBalancer;
use crate::observability::{metrics, EventBus};
use crate::registry::{RegistryError, ServiceRegistry};
use crate::resilience::timeouts::upstream_timeout;
use crate::resilience::{CircuitBreaker, CircuitError, RetryPolicy};
use crate::routing::RouteEntry;
use crate::security::headers::filter_response_headers;
use crate::security::rate_limit::apply_rate_limit_headers;
use crate::security::{HeaderPolicy, RateLimitDecision, RateLimiter};

pub const X_CACHE: &str = "x-cache";
pub const X_CACHE_KEY: &str = "x-cache-key";

/// Per-request facts gathered by the pipeline and applied to the final
/// response, whichever stage produced it.
#[derive(Debug, Default)]
struct RequestContext {
    service: Option<String>,
    rate_limit: Option<RateLimitDecision>,
}

/// The resilience core: every component plus the dispatch pipeline.
pub struct Gateway {
    identity: IdentityConfig,
    limiter: RateLimiter,
    cache: ResponseCache,
    cache_policy: CachePolicy,
    breaker: CircuitBreaker,
    balancer: Arc<LoadBalancer>,
    registry: ServiceRegistry,
    forwarder: Forwarder,
    header_policy: HeaderPolicy,
    timeouts: TimeoutConfig,
    retries: RetryConfig,
    health: HealthCheckConfig,
    max_body_size: usize,
    fallback_enabled: bool,
    rate_limit_sweep: Duration,
    cache_sweep: Duration,
    events: EventBus,
    started_at: Instant,
}

impl Gateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, RegistryError> {
        Self::with_events(config, EventBus::new())
    }

    /// Build a gateway publishing transitions on `events`.
    pub fn with_events(config: &GatewayConfig, events: EventBus) -> Result<Self, RegistryError> {
        let balancer = Arc::new(LoadBalancer::new(&config.load_balancing));
        let registry = ServiceRegistry::new(balancer.clone());
        registry.sync(config.services.clone())?;

        Ok(Self {
            identity: config.gateway.clone(),
            limiter: RateLimiter::new(config.rate_limit.clone()),
            cache: ResponseCache::new(
                config.cache.max_size_bytes,
                Duration::from_secs(config.cache.default_ttl_secs),
            ),
            cache_policy: CachePolicy::new(&config.cache),
            breaker: CircuitBreaker::new(&config.circuit_breaker, events.clone()),
            balancer,
            registry,
            forwarder: Forwarder::new(),
            header_policy: HeaderPolicy::new(&config.gateway, &config.security),
            timeouts: config.timeouts.clone(),
            retries: config.retries.clone(),
            health: config.load_balancing.health_check.clone(),
            max_body_size: config.security.max_body_size,
            fallback_enabled: config.circuit_breaker.fallback_enabled,
            rate_limit_sweep: Duration::from_secs(config.rate_limit.sweep_interval_secs.max(1)),
            cache_sweep: Duration::from_secs(config.cache.sweep_interval_secs.max(1)),
            events,
            started_at: Instant::now(),
        })
    }

    /// Re-register services from a reloaded configuration.
    pub fn apply_config(&self, config: &GatewayConfig) -> Result<(), RegistryError> {
        self.registry.sync(config.services.clone())?;
        tracing::info!(services = config.services.len(), "Service table reloaded");
        Ok(())
    }

    /// Run one request through the pipeline.
    pub async fn handle(&self, request: Request<Body>, client: Option<IpAddr>) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let mut ctx = RequestContext::default();

        let mut response = self
            .dispatch(request, client, &mut ctx)
            .await
            .unwrap_or_else(IntoResponse::into_response);

        if let Some(decision) = &ctx.rate_limit {
            apply_rate_limit_headers(response.headers_mut(), decision);
        }
        metrics::record_request(
            method.as_str(),
            response.status().as_u16(),
            ctx.service.as_deref().unwrap_or("none"),
            start,
        );
        response
    }

    async fn dispatch(
        &self,
        request: Request<Body>,
        client: Option<IpAddr>,
        ctx: &mut RequestContext,
    ) -> Result<Response, GatewayError> {
        let method = request.method().clone();
        let request_id = request.request_id().to_string();
        let route_path = self.strip_prefix(request.uri().path());
        let route = route_path
            .as_deref()
            .and_then(|path| self.registry.match_route(&method, path));

        tracing::debug!(
            request_id = %request_id,
            method = %method,
            path = %request.uri().path(),
            route = route.as_ref().map(|r| r.circuit_name.as_str()),
            "Dispatching request"
        );

        // Admission
        if self.limiter.is_enabled() {
            let base_key = self.limiter.key_for(request.headers(), client);
            let rule = route.as_ref().and_then(|r| r.definition.rate_limit.as_ref());
            let key = match (&route, rule) {
                (Some(r), Some(_)) => format!("{}|{}", r.circuit_name, base_key),
                _ => base_key,
            };

            let decision = self.limiter.check_limit(&key, rule);
            ctx.rate_limit = Some(decision);
            if !decision.allowed {
                tracing::warn!(request_id = %request_id, key = %key, "Rate limit exceeded");
                metrics::record_rate_limited(self.limiter.key_strategy().as_str());
                return Err(GatewayError::RateLimited {
                    retry_after_secs: decision.retry_after_secs(),
                });
            }
        }

        let protected = route.as_ref().is_some_and(|r| r.definition.protected);
        if protected && !has_credentials(request.headers()) {
            ctx.service = route.as_ref().map(|r| r.service.clone());
            return Err(GatewayError::Unauthorized);
        }

        // Cache lookup
        let cache_rule = route.as_ref().and_then(|r| r.definition.cache.clone());
        let cache_key = self
            .cache_policy
            .is_cacheable_request(&method, cache_rule.as_ref())
            .then(|| {
                self.cache_policy
                    .cache_key(&method, request.uri(), request.headers(), cache_rule.as_ref(), protected)
            });

        if let Some(key) = &cache_key {
            let hit = self.cache.get(key);
            metrics::record_cache_lookup(hit.is_some());
            if let Some(cached) = hit {
                tracing::debug!(request_id = %request_id, key = %key, "Cache hit");
                ctx.service = route.as_ref().map(|r| r.service.clone());
                let mut response = relay(cached.status, cached.headers, cached.body);
                mark_cache(&mut response, "HIT", key);
                return Ok(response);
            }
        }

        // Routing
        let (Some(route), Some(route_path)) = (route, route_path) else {
            tracing::debug!(request_id = %request_id, path = %request.uri().path(), "No route matched");
            return Err(GatewayError::RouteNotFound {
                method: method.to_string(),
                path: request.uri().path().to_string(),
            });
        };
        ctx.service = Some(route.service.clone());

        // Instance selection
        let Some(instance) = self.balancer.select(&route.service, client) else {
            tracing::warn!(request_id = %request_id, service = %route.service, "No healthy instance");
            if self.fallback_enabled {
                return Ok(self.fallback_response(&route.service));
            }
            return Err(GatewayError::NoHealthyInstance(route.service.clone()));
        };
        let instance = instance.acquire();

        // Forward
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|_| GatewayError::PayloadTooLarge)?;

        let outbound = OutboundRequest {
            method: method.clone(),
            uri: target_uri(&instance.base_url, &route.target_path(&route_path), parts.uri.query())?,
            headers: self.header_policy.outbound_headers(&parts.headers, client),
            body,
        };

        tracing::debug!(
            request_id = %request_id,
            instance = %instance.id(),
            target = %outbound.uri,
            "Forwarding request"
        );

        let result = self.forward(&route, &outbound).await;
        let upstream = match result {
            Ok(upstream) => upstream,
            Err(CircuitError::Failed(ForwardError::ServerError(upstream))) => {
                tracing::warn!(
                    request_id = %request_id,
                    circuit = %route.circuit_name,
                    status = %upstream.status,
                    "Upstream returned server error"
                );
                upstream
            }
            Err(e) => return self.degrade(&route, &request_id, e),
        };

        let headers = filter_response_headers(&upstream.headers);
        if let Some(key) = &cache_key {
            if self.cache_policy.is_cacheable_status(upstream.status)
                && self.cache_policy.is_storable_response(&headers)
            {
                let entry = CachedResponse {
                    status: upstream.status,
                    headers: headers.clone(),
                    body: upstream.body.clone(),
                };
                self.cache.set(key, entry, self.cache_policy.ttl(cache_rule.as_ref()));
                metrics::record_cache_size(self.cache.total_bytes());
            }
        }

        let mut response = relay(upstream.status, headers, upstream.body);
        if let Some(key) = &cache_key {
            mark_cache(&mut response, "MISS", key);
        }
        Ok(response)
    }

    /// All attempts of one request run inside a single breaker execution.
    async fn forward(
        &self,
        route: &RouteEntry,
        outbound: &OutboundRequest,
    ) -> Result<UpstreamResponse, CircuitError<ForwardError>> {
        let deadline = upstream_timeout(&route.definition, &self.timeouts);
        let policy = &RetryPolicy::for_route(&route.definition, &outbound.method, &self.retries);
        let forwarder = &self.forwarder;

        self.breaker
            .execute(&route.circuit_name, move || {
                policy.run(move |_| forwarder.send(outbound, deadline))
            })
            .await
    }

    /// Turn a failed forward into the degraded response, or the plain error
    /// when fallbacks are off.
    fn degrade(
        &self,
        route: &RouteEntry,
        request_id: &str,
        error: CircuitError<ForwardError>,
    ) -> Result<Response, GatewayError> {
        tracing::warn!(
            request_id = %request_id,
            circuit = %route.circuit_name,
            error = %error,
            "Upstream call failed"
        );

        if self.fallback_enabled {
            return Ok(self.fallback_response(&route.service));
        }
        Err(match error {
            CircuitError::Open(name) => GatewayError::CircuitOpen(name),
            CircuitError::Failed(ForwardError::Timeout(after)) => GatewayError::Timeout(after),
            CircuitError::Failed(e) => GatewayError::Upstream(e.to_string()),
        })
    }

    fn fallback_response(&self, service: &str) -> Response {
        let body = json!({
            "error": "service_unavailable",
            "message": format!("Service '{service}' is temporarily unavailable"),
            "fallback": true,
        });
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }

    /// Request path relative to the configured prefix, or `None` when the
    /// path lies outside it.
    fn strip_prefix(&self, path: &str) -> Option<String> {
        let prefix = self.identity.path_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return Some(path.to_string());
        }
        match path.strip_prefix(prefix) {
            Some("") => Some("/".to_string()),
            Some(rest) if rest.starts_with('/') => Some(rest.to_string()),
            _ => None,
        }
    }

    /// Sweep expired limiter windows and cache entries until shutdown.
    pub async fn run_maintenance(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut limiter_tick = tokio::time::interval(self.rate_limit_sweep);
        let mut cache_tick = tokio::time::interval(self.cache_sweep);

        loop {
            tokio::select! {
                _ = limiter_tick.tick() => {
                    self.limiter.sweep_expired();
                }
                _ = cache_tick.tick() => {
                    let purged = self.cache.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, "Purged expired cache entries");
                    }
                    metrics::record_cache_size(self.cache.total_bytes());
                }
                _ = shutdown.recv() => {
                    tracing::info!("Maintenance task received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Health monitor bound to this gateway's instance pools.
    pub fn health_monitor(&self) -> HealthMonitor {
        HealthMonitor::new(self.balancer.clone(), self.health.clone(), self.events.clone())
    }

    pub fn identity(&self) -> &IdentityConfig {
        &self.identity
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.balancer
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

fn has_credentials(headers: &HeaderMap) -> bool {
    [header::AUTHORIZATION.as_str(), "x-api-key"]
        .iter()
        .any(|name| headers.get(*name).is_some_and(|v| !v.is_empty()))
}

fn relay(status: StatusCode, headers: HeaderMap, body: bytes::Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn mark_cache(response: &mut Response, state: &'static str, key: &str) {
    let headers = response.headers_mut();
    headers.insert(X_CACHE, HeaderValue::from_static(state));
    if let Ok(value) = HeaderValue::from_str(key) {
        headers.insert(X_CACHE_KEY, value);
    }
}
