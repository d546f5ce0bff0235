//! Twin Core - In-memory digital twin state and event distribution
//!
//! This crate holds the concurrency-safe pieces of the twin server:
//!
//! - [`FeatureState`] - current/desired property bag of a single feature
//! - [`Twin`] - attributes plus a map of named features
//! - [`Registry`] - the authoritative index of live twins
//! - [`EventBus`] - best-effort topic fan-out over bounded queues
//!
//! ## Locking
//!
//! Every level owns exactly one lock. Locks are taken in the order
//! registry → twin → feature and never the other way round; read accessors
//! release each lock before returning.

mod bus;
mod error;
mod feature;
mod registry;
mod twin;

pub use bus::*;
pub use error::*;
pub use feature::*;
pub use registry::*;
pub use twin::*;

/// Free-form attribute and property value
pub type Value = serde_json::Value;

/// Attribute or property map
pub type PropertyMap = std::collections::HashMap<String, Value>;
