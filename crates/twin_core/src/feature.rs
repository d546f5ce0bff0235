//! Feature State
//!
//! A feature is a named sub-state of a twin: current properties, desired
//! (target) properties and a list of definition references.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{PropertyMap, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Point-in-time copy of a feature, detached from any lock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSnapshot {
    /// Current state
    pub properties: PropertyMap,
    /// Target state
    pub desired_properties: PropertyMap,
    /// Schema references, in order
    pub definition: Vec<String>,
    pub last_modified: DateTime<Utc>,
}

impl Default for FeatureSnapshot {
    fn default() -> Self {
        Self {
            properties: PropertyMap::new(),
            desired_properties: PropertyMap::new(),
            definition: Vec::new(),
            last_modified: Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Feature State
// ─────────────────────────────────────────────────────────────────────────────

/// Thread-safe property bag of a single feature
///
/// Every mutation goes through the feature's own lock and advances
/// `last_modified`. Accessors hand out copies, never the live maps.
/// Cloning produces an independent feature with its own lock.
#[derive(Debug)]
pub struct FeatureState {
    inner: RwLock<FeatureSnapshot>,
}

impl FeatureState {
    /// Create an empty feature
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(FeatureSnapshot::default()),
        }
    }

    /// Create a feature with initial current properties
    pub fn with_properties(properties: PropertyMap) -> Self {
        Self {
            inner: RwLock::new(FeatureSnapshot {
                properties,
                ..FeatureSnapshot::default()
            }),
        }
    }

    /// Get a current property
    pub fn property(&self, key: &str) -> Option<Value> {
        self.inner.read().properties.get(key).cloned()
    }

    /// Set a current property
    pub fn set_property(&self, key: impl Into<String>, value: Value) {
        let mut data = self.inner.write();
        data.properties.insert(key.into(), value);
        data.last_modified = Utc::now();
    }

    /// Remove a current property, returning its old value
    pub fn remove_property(&self, key: &str) -> Option<Value> {
        let mut data = self.inner.write();
        let removed = data.properties.remove(key);
        data.last_modified = Utc::now();
        removed
    }

    /// Set several current properties at once
    pub fn merge_properties(&self, properties: PropertyMap) {
        let mut data = self.inner.write();
        data.properties.extend(properties);
        data.last_modified = Utc::now();
    }

    /// Copy of all current properties
    pub fn properties(&self) -> PropertyMap {
        self.inner.read().properties.clone()
    }

    /// Get a desired property
    pub fn desired_property(&self, key: &str) -> Option<Value> {
        self.inner.read().desired_properties.get(key).cloned()
    }

    /// Set a desired property
    pub fn set_desired_property(&self, key: impl Into<String>, value: Value) {
        let mut data = self.inner.write();
        data.desired_properties.insert(key.into(), value);
        data.last_modified = Utc::now();
    }

    /// Remove a desired property, returning its old value
    pub fn remove_desired_property(&self, key: &str) -> Option<Value> {
        let mut data = self.inner.write();
        let removed = data.desired_properties.remove(key);
        data.last_modified = Utc::now();
        removed
    }

    /// Set several desired properties at once
    pub fn merge_desired_properties(&self, properties: PropertyMap) {
        let mut data = self.inner.write();
        data.desired_properties.extend(properties);
        data.last_modified = Utc::now();
    }

    /// Copy of all desired properties
    pub fn desired_properties(&self) -> PropertyMap {
        self.inner.read().desired_properties.clone()
    }

    /// Replace the definition references
    pub fn set_definition<I, S>(&self, definition: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let definition = definition.into_iter().map(Into::into).collect();
        let mut data = self.inner.write();
        data.definition = definition;
        data.last_modified = Utc::now();
    }

    /// Copy of the definition references
    pub fn definition(&self) -> Vec<String> {
        self.inner.read().definition.clone()
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.inner.read().last_modified
    }

    /// Copy the whole feature in one lock acquisition
    pub fn snapshot(&self) -> FeatureSnapshot {
        self.inner.read().clone()
    }
}

impl Default for FeatureState {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for FeatureState {
    fn clone(&self) -> Self {
        Self {
            inner: RwLock::new(self.snapshot()),
        }
    }
}

impl From<FeatureSnapshot> for FeatureState {
    fn from(snapshot: FeatureSnapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }
}

impl Serialize for FeatureState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
