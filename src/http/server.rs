//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all gateway handler
//! - Wire up middleware (request id, tracing, timeout, body limit)
//! - Bind the listener and serve until shutdown
//! - Spawn background tasks: health monitor, maintenance, admin API
//! - Apply reloaded service tables

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::config::GatewayConfig;
use crate::gateway::Gateway;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::registry::RegistryError;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

/// HTTP front end of the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    gateway: Arc<Gateway>,
}

impl HttpServer {
    /// Build the gateway and its router from `config`.
    pub fn new(config: GatewayConfig) -> Result<Self, RegistryError> {
        let gateway = Arc::new(Gateway::new(&config)?);
        let router = Self::build_router(
            &config,
            AppState {
                gateway: gateway.clone(),
            },
        );

        Ok(Self {
            router,
            config,
            gateway,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http())
                    .layer(propagate_request_id_layer())
                    .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    /// Serve on `listener` until `shutdown` fires.
    ///
    /// Reloaded configurations arriving on `reloads` replace the service table.
    pub async fn run(
        self,
        listener: TcpListener,
        mut reloads: mpsc::UnboundedReceiver<GatewayConfig>,
        shutdown: broadcast::Sender<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            name = %self.config.gateway.name,
            services = self.gateway.registry().list().len(),
            "HTTP server starting"
        );

        let monitor = self.gateway.health_monitor();
        let health_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            monitor.run(health_shutdown).await;
        });

        let gateway = self.gateway.clone();
        let maintenance_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            gateway.run_maintenance(maintenance_shutdown).await;
        });

        if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            let admin_router = admin::setup_admin_router(self.gateway.clone(), &self.config.admin);
            let mut admin_shutdown = shutdown.subscribe();
            tracing::info!(address = %self.config.admin.bind_address, "Admin API listening");
            tokio::spawn(async move {
                let served = axum::serve(admin_listener, admin_router)
                    .with_graceful_shutdown(async move {
                        let _ = admin_shutdown.recv().await;
                    })
                    .await;
                if let Err(e) = served {
                    tracing::error!(error = %e, "Admin API failed");
                }
            });
        }

        let gateway = self.gateway.clone();
        let mut reload_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(config) = reloads.recv() => {
                        if let Err(e) = gateway.apply_config(&config) {
                            tracing::error!(error = %e, "Rejected reloaded service table");
                        }
                    }
                    _ = reload_shutdown.recv() => break,
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut server_shutdown = shutdown.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }
}

/// Catch-all handler: every request goes through the gateway pipeline.
async fn gateway_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    state.gateway.handle(request, Some(addr.ip())).await
}
