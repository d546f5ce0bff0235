//! Server Application State
//!
//! Shared state handed to every handler. Built once at startup and passed
//! explicitly through the router.

use std::sync::Arc;

use serde_json::Value;

use twin_core::{EventBus, Registry};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Live twins
    registry: Arc<Registry>,

    /// Change notifications
    bus: Arc<EventBus>,
}

impl AppState {
    /// Create new application state
    pub fn new(registry: Arc<Registry>, bus: Arc<EventBus>) -> Self {
        Self {
            inner: Arc::new(AppStateInner { registry, bus }),
        }
    }

    /// Get the twin registry
    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    /// Get the event bus
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    /// Publish a change notification
    pub fn publish(&self, topic: &str, payload: Value) {
        let delivered = self.inner.bus.publish(topic, payload);
        tracing::trace!(topic = %topic, delivered, "Published change");
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Arc::new(Registry::new()), Arc::new(EventBus::new()))
    }
}
