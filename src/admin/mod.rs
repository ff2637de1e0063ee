//! Admin API.
//!
//! Served on its own listener so it is never reachable through the gateway
//! routes. Every endpoint requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use crate::config::AdminConfig;
use crate::gateway::Gateway;

use self::auth::admin_auth_middleware;
use self::handlers::*;

#[derive(Clone)]
pub struct AdminState {
    pub gateway: Arc<Gateway>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(gateway: Arc<Gateway>, config: &AdminConfig) -> Router {
    if config.api_key.is_empty() {
        tracing::warn!("admin.api_key is empty, every admin request will be rejected");
    }
    let state = AdminState {
        gateway,
        api_key: Arc::from(config.api_key.as_str()),
    };

    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/services", get(get_services))
        .route("/admin/circuits", get(get_circuits))
        .route("/admin/cache", get(get_cache).delete(clear_cache))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
