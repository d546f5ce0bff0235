//! Event Bus
//!
//! Best-effort, topic-keyed fan-out. Each subscription owns a bounded queue;
//! `publish` never blocks and a full queue simply misses the message.
//! Topics match by exact string comparison only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

pub use tokio::sync::mpsc::error::TryRecvError;

use crate::Value;

/// Queue capacity used by [`EventBus::new`]
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Message & Subscription
// ─────────────────────────────────────────────────────────────────────────────

/// A published event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    pub payload: Value,
}

/// Unique identifier of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub uuid::Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receiving end of a subscription
///
/// Yields `None` (or [`TryRecvError::Disconnected`]) once the subscription is
/// removed or the bus is closed and the queue has been drained.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    topic: String,
    rx: mpsc::Receiver<Message>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next message
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Take the next message if one is queued
    pub fn try_recv(&mut self) -> Result<Message, TryRecvError> {
        self.rx.try_recv()
    }

    /// Blocking receive for use outside an async runtime
    pub fn blocking_recv(&mut self) -> Option<Message> {
        self.rx.blocking_recv()
    }
}

struct Subscriber {
    id: SubscriptionId,
    tx: mpsc::Sender<Message>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Event Bus
// ─────────────────────────────────────────────────────────────────────────────

/// Counters for the bus, all monotonic except the gauges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BusStats {
    /// Calls to `publish`
    pub published: u64,
    /// Messages accepted by a subscriber queue
    pub delivered: u64,
    /// Messages lost to a full queue
    pub dropped: u64,
    /// Topics with at least one subscriber
    pub topics: usize,
    /// Live subscriptions across all topics
    pub subscribers: usize,
}

/// Topic-keyed fan-out over bounded queues
///
/// A topic entry exists only while it has at least one live subscriber;
/// messages for a topic nobody listens to are discarded. Delivery is
/// at-most-once per subscriber, with no history and no retry.
pub struct EventBus {
    /// Topic -> subscriber queues
    subscriptions: RwLock<HashMap<String, Vec<Subscriber>>>,
    capacity: usize,

    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl EventBus {
    /// Create a bus with [`DEFAULT_QUEUE_CAPACITY`]-slot queues
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a bus whose subscriber queues hold `capacity` messages (min 1)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Subscribe to a topic, getting a fresh bounded queue
    pub fn subscribe(&self, topic: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = SubscriptionId::new();

        self.subscriptions
            .write()
            .entry(topic.to_string())
            .or_default()
            .push(Subscriber { id, tx });

        debug!(topic = %topic, subscription = %id, "New subscription");

        Subscription {
            id,
            topic: topic.to_string(),
            rx,
        }
    }

    /// Remove one subscription from a topic
    ///
    /// Unknown topics and ids are ignored. Returns whether a queue was removed.
    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();

        let Some(subscribers) = subscriptions.get_mut(topic) else {
            return false;
        };

        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        let removed = subscribers.len() != before;

        if subscribers.is_empty() {
            subscriptions.remove(topic);
        }

        if removed {
            debug!(topic = %topic, subscription = %id, "Removed subscription");
        }
        removed
    }

    /// Publish a payload to every current subscriber of `topic`
    ///
    /// Never blocks and never fails. Returns how many queues accepted the
    /// message.
    pub fn publish(&self, topic: &str, payload: Value) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0;
        let mut stale = false;

        {
            let subscriptions = self.subscriptions.read();
            let Some(subscribers) = subscriptions.get(topic) else {
                trace!(topic = %topic, "No subscribers, message discarded");
                return 0;
            };

            let message = Message {
                topic: topic.to_string(),
                payload,
            };

            for subscriber in subscribers {
                match subscriber.tx.try_send(message.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        trace!(
                            topic = %topic,
                            subscription = %subscriber.id,
                            "Queue full, message dropped"
                        );
                    }
                    Err(TrySendError::Closed(_)) => stale = true,
                }
            }
        }

        self.delivered.fetch_add(delivered as u64, Ordering::Relaxed);

        if stale {
            self.prune(topic);
        }

        delivered
    }

    /// Drop queues whose receiving end is gone
    fn prune(&self, topic: &str) {
        let mut subscriptions = self.subscriptions.write();

        if let Some(subscribers) = subscriptions.get_mut(topic) {
            subscribers.retain(|s| !s.tx.is_closed());
            if subscribers.is_empty() {
                subscriptions.remove(topic);
            }
            debug!(topic = %topic, "Pruned dropped subscriptions");
        }
    }

    /// Close every queue and forget all subscriptions
    ///
    /// Consumers drain what is already queued, then see end-of-stream.
    pub fn close(&self) {
        let closed: usize = self
            .subscriptions
            .write()
            .drain()
            .map(|(_, subscribers)| subscribers.len())
            .sum();

        debug!(subscriptions = closed, "Event bus closed");
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscriptions
            .read()
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn has_subscribers(&self, topic: &str) -> bool {
        self.subscriptions.read().contains_key(topic)
    }

    /// Topics that currently have subscribers
    pub fn topics(&self) -> Vec<String> {
        self.subscriptions.read().keys().cloned().collect()
    }

    pub fn stats(&self) -> BusStats {
        let (topics, subscribers) = {
            let subscriptions = self.subscriptions.read();
            (
                subscriptions.len(),
                subscriptions.values().map(Vec::len).sum(),
            )
        };

        BusStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            topics,
            subscribers,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
