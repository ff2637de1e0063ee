//! Service instance abstraction.
//!
//! # Responsibilities
//! - Represent one physical endpoint of a logical service
//! - Track active connections (for Least Connections LB)
//! - Own the instance's health state machine

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use url::Url;

use crate::health::state::{HealthThresholds, HealthTracker, HealthTransition};

/// One physical endpoint of a logical service.
#[derive(Debug)]
pub struct ServiceInstance {
    /// Name of the logical service this instance belongs to.
    pub service: String,
    /// Base address; forwarded paths are appended to it.
    pub base_url: Url,
    /// Relative weight for weighted selection.
    pub weight: u32,
    /// Probe path override for this instance's service.
    pub health_path: Option<String>,
    /// Number of in-flight forwarded calls.
    active_connections: AtomicUsize,
    health: Mutex<HealthTracker>,
}

impl ServiceInstance {
    pub fn new(service: impl Into<String>, base_url: Url, weight: u32) -> Self {
        Self {
            service: service.into(),
            base_url,
            weight,
            health_path: None,
            active_connections: AtomicUsize::new(0),
            health: Mutex::new(HealthTracker::new()),
        }
    }

    pub fn with_health_path(mut self, path: Option<String>) -> Self {
        self.health_path = path;
        self
    }

    /// Stable identifier used in logs, metrics and events.
    pub fn id(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Get the current number of active connections.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Count a forwarded call until the guard is dropped.
    pub fn acquire(self: &Arc<Self>) -> ConnectionGuard {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            instance: self.clone(),
        }
    }

    fn tracker(&self) -> MutexGuard<'_, HealthTracker> {
        self.health.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_healthy(&self) -> bool {
        self.tracker().is_healthy()
    }

    pub fn health(&self) -> HealthTracker {
        self.tracker().clone()
    }

    /// Feed one probe outcome into the health state machine.
    pub fn record_probe(
        &self,
        success: bool,
        thresholds: HealthThresholds,
    ) -> Option<HealthTransition> {
        self.tracker().record(success, thresholds)
    }
}

/// A RAII guard that manages the active connection count.
#[derive(Debug)]
pub struct ConnectionGuard {
    instance: Arc<ServiceInstance>,
}

impl ConnectionGuard {
    pub fn instance(&self) -> &Arc<ServiceInstance> {
        &self.instance
    }
}

impl Deref for ConnectionGuard {
    type Target = ServiceInstance;
    fn deref(&self) -> &Self::Target {
        &self.instance
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.instance.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}
