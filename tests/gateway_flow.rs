//! End-to-end request flow through the HTTP server.

use axum::http::{Method, StatusCode};
use api_gateway::registry::{CacheRule, RateLimitRule, RouteDefinition, ServiceRegistration};

mod common;

use common::{base_config, client, start_gateway, start_mock_backend, start_programmable_backend};

#[tokio::test]
async fn test_unregistered_path_returns_404() {
    let gw = start_gateway(base_config()).await;

    let res = client().get(gw.url("/nothing/here")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(res.headers().contains_key("x-ratelimit-limit"));
    assert!(res.headers().contains_key("x-ratelimit-reset"));
    assert!(res.headers().contains_key("x-request-id"));

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "route_not_found");
}

#[tokio::test]
async fn test_second_identical_request_hits_cache() {
    let counter = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
    let c = counter.clone();
    let backend = start_programmable_backend(move |_| {
        let c = c.clone();
        async move {
            let n = c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            (200, format!("response #{n}"))
        }
    })
    .await;

    let mut config = base_config();
    config.services.push(
        ServiceRegistration::new("catalog", format!("http://{backend}"))
            .with_route(RouteDefinition::new(Method::GET, "/products/*")),
    );
    let gw = start_gateway(config).await;
    let client = client();

    let first = client.get(gw.url("/products/1?lang=en")).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-cache"], "MISS");
    assert_eq!(first.headers()["x-cache-key"], "GET:/products/1?lang=en");
    let first_body = first.text().await.unwrap();

    let second = client.get(gw.url("/products/1?lang=en")).send().await.unwrap();
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(second.text().await.unwrap(), first_body);

    // A different query is a different entry
    let third = client.get(gw.url("/products/1?lang=fr")).send().await.unwrap();
    assert_eq!(third.headers()["x-cache"], "MISS");
    assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_non_cacheable_method_has_no_cache_headers() {
    let backend = start_mock_backend("created").await;
    let mut config = base_config();
    config.services.push(
        ServiceRegistration::new("orders", format!("http://{backend}"))
            .with_route(RouteDefinition::any("/orders/*")),
    );
    let gw = start_gateway(config).await;

    let res = client()
        .post(gw.url("/orders"))
        .body("{\"qty\":1}")
        .header("content-type", "application/json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(!res.headers().contains_key("x-cache"));
}

#[tokio::test]
async fn test_exact_route_beats_wildcard() {
    let exact = start_mock_backend("exact").await;
    let wildcard = start_mock_backend("wildcard").await;

    let mut config = base_config();
    config.cache.enabled = false;
    // Wildcard registered first; the exact route must still win
    config.services.push(
        ServiceRegistration::new("catch-all", format!("http://{wildcard}"))
            .with_route(RouteDefinition::any("/api/*")),
    );
    config.services.push(
        ServiceRegistration::new("foo", format!("http://{exact}"))
            .with_route(RouteDefinition::new(Method::GET, "/api/foo")),
    );
    let gw = start_gateway(config).await;
    let client = client();

    let res = client.get(gw.url("/api/foo")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "exact");

    let res = client.get(gw.url("/api/bar")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "wildcard");

    let res = client.delete(gw.url("/api/foo")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "wildcard");
}

#[tokio::test]
async fn test_outbound_headers_and_target_path() {
    let backend = start_programmable_backend(|seen| async move {
        let body = serde_json::json!({
            "path": seen.path(),
            "x-gateway": seen.header("x-gateway"),
            "x-gateway-version": seen.header("x-gateway-version"),
            "x-forwarded-for": seen.header("x-forwarded-for"),
            "authorization": seen.header("authorization"),
            "x-debug-token": seen.header("x-debug-token"),
            "x-request-id": seen.header("x-request-id"),
        });
        (200, body.to_string())
    })
    .await;

    let mut config = base_config();
    config.cache.enabled = false;
    config.gateway.name = "edge-gw".to_string();
    config.services.push(
        ServiceRegistration::new("users", format!("http://{backend}"))
            .with_route(RouteDefinition::any("/users/*").with_target("/internal/v2/users")),
    );
    let gw = start_gateway(config).await;

    let res = client()
        .get(gw.url("/users/42/profile?full=1"))
        .header("authorization", "Bearer abc")
        .header("x-debug-token", "leak")
        .header("x-request-id", "req-123")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-request-id"], "req-123");
    assert!(!res.headers().contains_key("x-backend-node"));

    let seen: serde_json::Value = res.json().await.unwrap();
    assert_eq!(seen["path"], "/internal/v2/users/42/profile?full=1");
    assert_eq!(seen["x-gateway"], "edge-gw");
    assert_eq!(seen["x-gateway-version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(seen["x-forwarded-for"], "127.0.0.1");
    assert_eq!(seen["authorization"], "Bearer abc");
    assert_eq!(seen["x-request-id"], "req-123");
    assert!(seen["x-debug-token"].is_null());
}

#[tokio::test]
async fn test_rate_limit_denies_with_retry_hint() {
    let backend = start_mock_backend("ok").await;
    let mut config = base_config();
    config.rate_limit.max_requests = 3;
    config.rate_limit.window_ms = 60_000;
    config.services.push(
        ServiceRegistration::new("svc", format!("http://{backend}"))
            .with_route(RouteDefinition::new(Method::GET, "/ping").with_cache(CacheRule::disabled())),
    );
    let gw = start_gateway(config).await;
    let client = client();

    for expected_remaining in ["2", "1", "0"] {
        let res = client.get(gw.url("/ping")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["x-ratelimit-limit"], "3");
        assert_eq!(res.headers()["x-ratelimit-remaining"], expected_remaining);
    }

    let res = client.get(gw.url("/ping")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(res.headers().contains_key("retry-after"));
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "rate_limited");
    assert!(body["retryAfter"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn test_route_rate_limit_is_scoped_to_route() {
    let backend = start_mock_backend("ok").await;
    let mut config = base_config();
    config.cache.enabled = false;
    config.services.push(
        ServiceRegistration::new("svc", format!("http://{backend}"))
            .with_route(
                RouteDefinition::new(Method::GET, "/login")
                    .with_rate_limit(RateLimitRule { window_ms: 60_000, max_requests: 1 }),
            )
            .with_route(RouteDefinition::new(Method::GET, "/home")),
    );
    let gw = start_gateway(config).await;
    let client = client();

    assert_eq!(client.get(gw.url("/login")).send().await.unwrap().status(), StatusCode::OK);
    assert_eq!(
        client.get(gw.url("/login")).send().await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(client.get(gw.url("/home")).send().await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn test_protected_route_needs_credentials() {
    let backend = start_mock_backend("secret").await;
    let mut config = base_config();
    config.services.push(
        ServiceRegistration::new("vault", format!("http://{backend}"))
            .with_route(RouteDefinition::new(Method::GET, "/vault").protected()),
    );
    let gw = start_gateway(config).await;
    let client = client();

    let res = client.get(gw.url("/vault")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(gw.url("/vault"))
        .header("x-api-key", "k1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_protected_cache_entry_is_not_shared() {
    let counter = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
    let c = counter.clone();
    let backend = start_programmable_backend(move |_| {
        let c = c.clone();
        async move {
            let n = c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            (200, format!("account #{n}"))
        }
    })
    .await;

    let mut config = base_config();
    config.services.push(
        ServiceRegistration::new("accounts", format!("http://{backend}"))
            .with_route(RouteDefinition::new(Method::GET, "/accounts/*").protected()),
    );
    let gw = start_gateway(config).await;
    let client = client();

    let authed = client
        .get(gw.url("/accounts/9"))
        .header("authorization", "Bearer alice")
        .send()
        .await
        .unwrap();
    assert_eq!(authed.status(), StatusCode::OK);
    assert_eq!(authed.headers()["x-cache"], "MISS");

    let again = client
        .get(gw.url("/accounts/9"))
        .header("authorization", "Bearer alice")
        .send()
        .await
        .unwrap();
    assert_eq!(again.headers()["x-cache"], "HIT");

    let anon = client.get(gw.url("/accounts/9")).send().await.unwrap();
    assert_eq!(anon.status(), StatusCode::UNAUTHORIZED);
    assert!(!anon.headers().contains_key("x-cache"));

    let other = client
        .get(gw.url("/accounts/9"))
        .header("authorization", "Bearer bob")
        .send()
        .await
        .unwrap();
    assert_eq!(other.headers()["x-cache"], "MISS");
    assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_admin_api() {
    let backend = start_mock_backend("ok").await;
    let mut config = base_config();
    config.admin.enabled = true;
    config.admin.api_key = "test-admin-key".to_string();
    config.admin.bind_address = "127.0.0.1:38471".to_string();
    config.services.push(
        ServiceRegistration::new("svc", format!("http://{backend}"))
            .with_route(RouteDefinition::new(Method::GET, "/ping")),
    );
    let gw = start_gateway(config).await;
    let client = client();
    let admin = "http://127.0.0.1:38471";

    client.get(gw.url("/ping")).send().await.unwrap();

    let res = client.get(format!("{admin}/admin/status")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let status: serde_json::Value = client
        .get(format!("{admin}/admin/status"))
        .bearer_auth("test-admin-key")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["services"], 1);
    assert_eq!(status["cache_entries"], 1);

    let services: serde_json::Value = client
        .get(format!("{admin}/admin/services"))
        .bearer_auth("test-admin-key")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(services[0]["name"], "svc");
    assert_eq!(services[0]["instances"][0]["healthy"], true);

    let circuits: serde_json::Value = client
        .get(format!("{admin}/admin/circuits"))
        .bearer_auth("test-admin-key")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(circuits[0]["name"], "svc:GET:/ping");
    assert_eq!(circuits[0]["state"], "closed");

    let cleared: serde_json::Value = client
        .delete(format!("{admin}/admin/cache"))
        .bearer_auth("test-admin-key")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cleared["cleared"], 1);
    assert_eq!(gw.gateway.cache().len(), 0);
}
