//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every registered instance
//! - Update instance health state based on results
//! - Publish healthy/unhealthy transitions

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::future::join_all;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::health::state::{HealthThresholds, HealthTransition};
use crate::load_balancer::{LoadBalancer, ServiceInstance};
use crate::observability::{metrics, EventBus, GatewayEvent};

/// Largest probe body inspected for a `healthy` flag.
const MAX_PROBE_BODY: usize = 64 * 1024;

pub struct HealthMonitor {
    balancer: Arc<LoadBalancer>,
    config: HealthCheckConfig,
    client: Client<HttpConnector, Body>,
    events: EventBus,
}

impl HealthMonitor {
    pub fn new(balancer: Arc<LoadBalancer>, config: HealthCheckConfig, events: EventBus) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self {
            balancer,
            config,
            client,
            events,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval_ms = self.config.interval_ms,
            endpoint = %self.config.endpoint,
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_millis(self.config.interval_ms));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every instance once, concurrently.
    pub async fn check_all(&self) {
        let instances = self.balancer.all_instances();
        let outcomes = join_all(instances.iter().map(|i| self.probe(i))).await;
        let thresholds = HealthThresholds::from(&self.config);

        for (instance, healthy) in instances.iter().zip(outcomes) {
            match instance.record_probe(healthy, thresholds) {
                Some(HealthTransition::BecameUnhealthy) => {
                    tracing::warn!(
                        service = %instance.service,
                        instance = %instance.id(),
                        "Instance marked unhealthy"
                    );
                    self.events.publish(GatewayEvent::InstanceUnhealthy {
                        service: instance.service.clone(),
                        instance: instance.id().to_string(),
                    });
                }
                Some(HealthTransition::BecameHealthy) => {
                    tracing::info!(
                        service = %instance.service,
                        instance = %instance.id(),
                        "Instance marked healthy"
                    );
                    self.events.publish(GatewayEvent::InstanceHealthy {
                        service: instance.service.clone(),
                        instance: instance.id().to_string(),
                    });
                }
                None => {}
            }

            metrics::record_instance_health(&instance.service, instance.id(), instance.is_healthy());
        }
    }

    async fn probe(&self, instance: &ServiceInstance) -> bool {
        let path = instance.health_path.as_deref().unwrap_or(&self.config.endpoint);
        let uri = format!("{}{}", instance.id(), path);

        let request = match Request::builder()
            .method("GET")
            .uri(&uri)
            .header("user-agent", "api-gateway-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(uri = %uri, error = %e, "Failed to build health check request");
                return false;
            }
        };

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let check = async {
            let response = self.client.request(request).await.map_err(|e| e.to_string())?;
            let status = response.status();
            let body = axum::body::to_bytes(Body::new(response.into_body()), MAX_PROBE_BODY)
                .await
                .unwrap_or_default();
            Ok::<_, String>((status, body))
        };

        match time::timeout(timeout, check).await {
            Ok(Ok((status, body))) => {
                let healthy = probe_passed(status, &body);
                if !healthy {
                    tracing::warn!(instance = %instance.id(), status = %status, "Health check failed");
                }
                healthy
            }
            Ok(Err(e)) => {
                tracing::warn!(instance = %instance.id(), error = %e, "Health check failed: connection error");
                false
            }
            Err(_) => {
                tracing::warn!(instance = %instance.id(), "Health check failed: timeout");
                false
            }
        }
    }
}

/// A probe passes on a success status, unless the body is JSON that says
/// `"healthy": false`.
fn probe_passed(status: StatusCode, body: &[u8]) -> bool {
    if !status.is_success() {
        return false;
    }
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => value.get("healthy").and_then(|h| h.as_bool()).unwrap_or(true),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoadBalancingConfig;
    use url::Url;

    #[test]
    fn test_probe_passed() {
        assert!(probe_passed(StatusCode::OK, b""));
        assert!(probe_passed(StatusCode::OK, b"plain text"));
        assert!(probe_passed(StatusCode::OK, br#"{"healthy": true}"#));
        assert!(probe_passed(StatusCode::NO_CONTENT, br#"{"status": "up"}"#));
        assert!(!probe_passed(StatusCode::OK, br#"{"healthy": false}"#));
        assert!(!probe_passed(StatusCode::SERVICE_UNAVAILABLE, b""));
    }

    #[tokio::test]
    async fn test_unreachable_instance_goes_unhealthy() {
        let balancer = Arc::new(LoadBalancer::new(&LoadBalancingConfig::default()));
        // Port 9 on loopback: nothing listens there, connection is refused.
        balancer.register(
            "svc",
            vec![(Url::parse("http://127.0.0.1:9").unwrap(), 1)],
            None,
        );

        let events = EventBus::new();
        let mut rx = events.subscribe();
        let config = HealthCheckConfig {
            unhealthy_threshold: 2,
            timeout_ms: 500,
            ..HealthCheckConfig::default()
        };
        let monitor = HealthMonitor::new(balancer.clone(), config, events);

        monitor.check_all().await;
        assert!(balancer.instances("svc")[0].is_healthy());
        monitor.check_all().await;
        assert!(!balancer.instances("svc")[0].is_healthy());

        assert_eq!(
            rx.recv().await.unwrap(),
            GatewayEvent::InstanceUnhealthy {
                service: "svc".into(),
                instance: "http://127.0.0.1:9".into(),
            }
        );
    }
}
