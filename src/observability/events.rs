//! State-transition notifications.
//!
//! Components that own a state machine (circuit breaker, health tracker)
//! publish a [`GatewayEvent`] whenever a transition happens. Delivery is a
//! `tokio::sync::broadcast` channel, so every subscriber sees events in the
//! order they were emitted and a slow subscriber only loses its own backlog.

use serde::Serialize;
use tokio::sync::broadcast;

/// Default capacity of the broadcast buffer.
const DEFAULT_CAPACITY: usize = 256;

/// A state transition observed somewhere in the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// A circuit tripped to `open`.
    CircuitOpened { circuit: String, failures: u32 },
    /// A circuit returned to `closed` after a successful probe.
    CircuitClosed { circuit: String },
    /// A circuit admitted a probe call.
    CircuitHalfOpen { circuit: String },
    /// A call was short-circuited by an open circuit.
    CircuitRejected { circuit: String },
    /// An instance passed enough consecutive probes to take traffic again.
    InstanceHealthy { service: String, instance: String },
    /// An instance failed enough consecutive probes to be excluded.
    InstanceUnhealthy { service: String, instance: String },
}

/// Cloneable handle used to publish and subscribe to gateway events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GatewayEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: GatewayEvent) {
        tracing::trace!(?event, "Publishing gateway event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
