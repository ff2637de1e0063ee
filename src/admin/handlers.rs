use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::json;

use crate::admin::AdminState;
use crate::cache::{CacheStats, EntryInfo};
use crate::load_balancer::InstanceStatus;
use crate::resilience::CircuitSnapshot;

#[derive(Serialize)]
pub struct SystemStatus {
    pub name: String,
    pub version: String,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub services: usize,
    pub routes: usize,
    pub rate_limit_windows: usize,
    pub cache_entries: usize,
}

#[derive(Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub version: String,
    pub priority: u32,
    pub routes: Vec<String>,
    pub instances: Vec<InstanceStatus>,
}

#[derive(Serialize)]
pub struct CacheReport {
    pub stats: CacheStats,
    pub entries: Vec<EntryInfo>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let gateway = &state.gateway;
    Json(SystemStatus {
        name: gateway.identity().name.clone(),
        version: gateway.identity().version.clone(),
        status: "operational",
        uptime_secs: gateway.uptime().as_secs(),
        services: gateway.registry().list().len(),
        routes: gateway.registry().route_table().len(),
        rate_limit_windows: gateway.limiter().len(),
        cache_entries: gateway.cache().len(),
    })
}

pub async fn get_services(State(state): State<AdminState>) -> Json<Vec<ServiceStatus>> {
    let gateway = &state.gateway;
    let instances = gateway.balancer().status();

    let services = gateway
        .registry()
        .list()
        .into_iter()
        .map(|service| ServiceStatus {
            routes: service
                .routes
                .iter()
                .map(|r| format!("{} {}", r.method, r.path))
                .collect(),
            instances: instances
                .iter()
                .filter(|i| i.service == service.name)
                .cloned()
                .collect(),
            name: service.name,
            version: service.version,
            priority: service.priority,
        })
        .collect();

    Json(services)
}

pub async fn get_circuits(State(state): State<AdminState>) -> Json<Vec<CircuitSnapshot>> {
    Json(state.gateway.breaker().snapshot())
}

pub async fn get_cache(State(state): State<AdminState>) -> Json<CacheReport> {
    let cache = state.gateway.cache();
    Json(CacheReport {
        stats: cache.stats(),
        entries: cache.entries(),
    })
}

pub async fn clear_cache(State(state): State<AdminState>) -> Json<serde_json::Value> {
    let removed = state.gateway.cache().clear();
    tracing::info!(removed, "Cache cleared via admin API");
    Json(json!({ "cleared": removed }))
}
