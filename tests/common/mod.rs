//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use api_gateway::config::GatewayConfig;
use api_gateway::{Gateway, HttpServer, Shutdown};
use axum::http::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// A request as seen by a mock backend.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    /// Request line and headers, lower-cased header names kept as sent.
    pub head: String,
}

impl SeenRequest {
    pub fn path(&self) -> &str {
        self.head
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .unwrap_or("/")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }
}

/// Start a mock backend that always answers 200 with `body`.
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    start_programmable_backend(move |_| async move { (200, body.to_string()) }).await
}

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(SeenRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        serve_connection(socket, f).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

async fn serve_connection<F, Fut>(mut socket: TcpStream, f: Arc<F>)
where
    F: Fn(SeenRequest) -> Fut,
    Fut: Future<Output = (u16, String)>,
{
    let Some(seen) = read_request(&mut socket).await else {
        return;
    };
    let (status, body) = f(seen).await;
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");

    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\nX-Backend-Node: mock\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Read the request head and drain any `Content-Length` body.
async fn read_request(socket: &mut TcpStream) -> Option<SeenRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let seen = SeenRequest { head };
    let body_len: usize = seen
        .header("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut remaining = body_len.saturating_sub(buf.len() - head_end - 4);
    while remaining > 0 {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        remaining = remaining.saturating_sub(n);
    }
    Some(seen)
}

/// A running gateway bound to an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub gateway: Arc<Gateway>,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start the full HTTP server with `config`.
pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(config).unwrap();
    let gateway = server.gateway().clone();
    let shutdown = Shutdown::new();
    let (_reload_tx, reloads) = mpsc::unbounded_channel();
    let sender = shutdown.sender();

    tokio::spawn(async move {
        let _ = server.run(listener, reloads, sender).await;
    });

    // Give the accept loop a moment
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestGateway {
        addr,
        gateway,
        shutdown,
    }
}

/// Client without connection pooling so every request is independent.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Defaults suited to tests: no active health checks, quiet maintenance.
pub fn base_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.load_balancing.health_check.enabled = false;
    config.observability.metrics_enabled = false;
    config
}
