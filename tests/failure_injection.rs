//! Failure injection tests: retries, health eviction, circuit breaking.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use api_gateway::observability::GatewayEvent;
use api_gateway::registry::{RouteDefinition, ServiceRegistration};
use api_gateway::resilience::CircuitState;
use axum::http::{Method, StatusCode};

mod common;

use common::{base_config, client, start_gateway, start_mock_backend, start_programmable_backend};

/// An address nothing listens on.
const DEAD_BACKEND: &str = "http://127.0.0.1:9";

#[tokio::test]
async fn test_retry_on_failure() {
    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    let backend = start_programmable_backend(move |_| {
        let cc = cc.clone();
        async move {
            if cc.fetch_add(1, Ordering::SeqCst) < 2 {
                (503, "Service Unavailable".into())
            } else {
                (200, "Success".into())
            }
        }
    })
    .await;

    let mut config = base_config();
    config.cache.enabled = false;
    config.retries.base_delay_ms = 10;
    config.retries.max_delay_ms = 50;
    config.services.push(
        ServiceRegistration::new("flaky", format!("http://{backend}"))
            .with_route(RouteDefinition::new(Method::GET, "/flaky").with_retries(2)),
    );
    let gw = start_gateway(config).await;

    let res = client().get(gw.url("/flaky")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK, "Should eventually succeed after retries");
    assert_eq!(res.text().await.unwrap(), "Success");
    assert_eq!(call_count.load(Ordering::SeqCst), 3);

    // One breaker outcome for the whole request
    let breaker = gw.gateway.breaker();
    assert_eq!(breaker.state("flaky:GET:/flaky"), CircuitState::Closed);
    assert_eq!(breaker.failures("flaky:GET:/flaky"), 0);
}

#[tokio::test]
async fn test_post_is_not_retried() {
    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    let backend = start_programmable_backend(move |_| {
        let cc = cc.clone();
        async move {
            cc.fetch_add(1, Ordering::SeqCst);
            (503, "busy".into())
        }
    })
    .await;

    let mut config = base_config();
    config.retries.base_delay_ms = 10;
    config.services.push(
        ServiceRegistration::new("orders", format!("http://{backend}"))
            .with_route(RouteDefinition::any("/orders").with_retries(3)),
    );
    let gw = start_gateway(config).await;

    let res = client().post(gw.url("/orders")).body("x").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.text().await.unwrap(), "busy", "upstream 5xx is relayed verbatim");
    assert_eq!(call_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_health_check_eviction() {
    let b1 = start_mock_backend("b1").await;

    let b2_healthy = Arc::new(AtomicBool::new(true));
    let b2h = b2_healthy.clone();
    let b2 = start_programmable_backend(move |_| {
        let b2h = b2h.clone();
        async move {
            if b2h.load(Ordering::SeqCst) {
                (200, "b2".into())
            } else {
                (500, "dead".into())
            }
        }
    })
    .await;

    let mut config = base_config();
    config.cache.enabled = false;
    config.retries.enabled = false;
    config.load_balancing.health_check.enabled = true;
    config.load_balancing.health_check.interval_ms = 100;
    config.load_balancing.health_check.timeout_ms = 500;
    config.load_balancing.health_check.unhealthy_threshold = 2;
    config.load_balancing.health_check.healthy_threshold = 1;
    config.services.push(
        ServiceRegistration::new("web", format!("http://{b1}"))
            .with_instance(format!("http://{b2}"), 1)
            .with_route(RouteDefinition::any("/*")),
    );
    let gw = start_gateway(config).await;
    let mut events = gw.gateway.events().subscribe();
    let client = client();

    let mut b1_hits = 0;
    let mut b2_hits = 0;
    for _ in 0..10 {
        let body = client.get(gw.url("/")).send().await.unwrap().text().await.unwrap();
        if body == "b1" {
            b1_hits += 1;
        }
        if body == "b2" {
            b2_hits += 1;
        }
    }
    assert!(b1_hits > 0, "b1 should have hits (got {b1_hits})");
    assert!(b2_hits > 0, "b2 should have hits (got {b2_hits})");

    b2_healthy.store(false, Ordering::SeqCst);

    let event = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if let Ok(GatewayEvent::InstanceUnhealthy { instance, .. }) = events.recv().await {
                return instance;
            }
        }
    })
    .await
    .expect("b2 should be marked unhealthy");
    assert_eq!(event, format!("http://{b2}"));

    for _ in 0..10 {
        let body = client.get(gw.url("/")).send().await.unwrap().text().await.unwrap();
        assert_eq!(body, "b1", "Only b1 should be hit after b2 eviction");
    }

    // Recovery
    b2_healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(400)).await;
    let healthy = gw.gateway.balancer().instances("web").iter().filter(|i| i.is_healthy()).count();
    assert_eq!(healthy, 2);
}

#[tokio::test]
async fn test_sole_unhealthy_instance_returns_503() {
    let mut config = base_config();
    config.circuit_breaker.fallback_enabled = false;
    config.load_balancing.health_check.enabled = true;
    config.load_balancing.health_check.interval_ms = 50;
    config.load_balancing.health_check.unhealthy_threshold = 1;
    config.services.push(
        ServiceRegistration::new("ghost", DEAD_BACKEND).with_route(RouteDefinition::any("/ghost/*")),
    );
    let gw = start_gateway(config).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!gw.gateway.balancer().instances("ghost")[0].is_healthy());

    let res = client().get(gw.url("/ghost/1")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "service_unavailable");
    assert!(body.get("fallback").is_none());
}

#[tokio::test]
async fn test_circuit_opens_and_falls_back() {
    let mut config = base_config();
    config.cache.enabled = false;
    config.circuit_breaker.failure_threshold = 2;
    config.circuit_breaker.reset_timeout_ms = 60_000;
    config.services.push(
        ServiceRegistration::new("down", DEAD_BACKEND).with_route(RouteDefinition::any("/down")),
    );
    let gw = start_gateway(config).await;
    let mut events = gw.gateway.events().subscribe();
    let client = client();

    for _ in 0..3 {
        let res = client.get(gw.url("/down")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["fallback"], true);
    }

    assert_eq!(gw.gateway.breaker().state("down:ALL:/down"), CircuitState::Open);
    assert_eq!(
        events.recv().await.unwrap(),
        GatewayEvent::CircuitOpened { circuit: "down:ALL:/down".into(), failures: 2 }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        GatewayEvent::CircuitRejected { circuit: "down:ALL:/down".into() }
    );
}

#[tokio::test]
async fn test_timeout_without_fallback_is_504() {
    let backend = start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        (200, "slow".into())
    })
    .await;

    let mut config = base_config();
    config.cache.enabled = false;
    config.circuit_breaker.fallback_enabled = false;
    config.services.push(
        ServiceRegistration::new("slow", format!("http://{backend}"))
            .with_route(RouteDefinition::new(Method::GET, "/slow").with_timeout_ms(100)),
    );
    let gw = start_gateway(config).await;

    let res = client().get(gw.url("/slow")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(gw.gateway.breaker().failures("slow:GET:/slow"), 1);
}
