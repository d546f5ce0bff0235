//! Event Logger
//!
//! Background tasks that write every change notification to the log. One task
//! per topic; each ends when the bus is closed.

use tokio::task::JoinHandle;
use tracing::{debug, info};

use twin_core::EventBus;

use crate::server::topics;

/// Subscribe to every change topic and log what arrives
pub fn spawn_event_logger(bus: &EventBus) -> Vec<JoinHandle<()>> {
    topics::ALL
        .iter()
        .map(|topic| {
            let mut sub = bus.subscribe(topic);
            tokio::spawn(async move {
                while let Some(msg) = sub.recv().await {
                    info!(topic = %msg.topic, payload = %msg.payload, "Event");
                }
                debug!(topic = %sub.topic(), "Event logger stopped");
            })
        })
        .collect()
}
