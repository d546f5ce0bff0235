// Twin Registry - authoritative index of live twins
//
// One registry-wide read/write lock: create/update/delete take it exclusively,
// lookups and scans share it. Scans are linear; there is no secondary index.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{Result, Twin, TwinError, Value};

/// Concurrent map from twin id to twin
///
/// Entries are shared handles. `update` stores the handle it is given as-is,
/// so mutations made through that handle stay visible through the registry.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Registry::new();
/// let twin = registry.create(Twin::new("t1", "sensor"))?;
/// twin.set_attribute("location", json!("kitchen"));
/// registry.update(twin)?;
///
/// let found = registry.find_by_attribute("location", &json!("kitchen"));
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    twins: RwLock<HashMap<String, Arc<Twin>>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new twin
    ///
    /// Fails with `TwinAlreadyExists` if the id is taken; the existing entry
    /// is left untouched.
    pub fn create(&self, twin: Twin) -> Result<Arc<Twin>> {
        let mut twins = self.twins.write();

        if twins.contains_key(twin.id()) {
            return Err(TwinError::TwinAlreadyExists(twin.id().to_string()));
        }

        let twin = Arc::new(twin);
        twins.insert(twin.id().to_string(), twin.clone());
        tracing::debug!(twin_id = %twin.id(), "Registered twin");

        Ok(twin)
    }

    /// Get a twin by id
    pub fn get(&self, id: &str) -> Result<Arc<Twin>> {
        self.twins
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| TwinError::TwinNotFound(id.to_string()))
    }

    /// Replace the stored entry for `twin.id()`
    pub fn update(&self, twin: Arc<Twin>) -> Result<()> {
        let mut twins = self.twins.write();

        match twins.get_mut(twin.id()) {
            Some(slot) => {
                tracing::trace!(twin_id = %twin.id(), "Updated twin");
                *slot = twin;
                Ok(())
            }
            None => Err(TwinError::TwinNotFound(twin.id().to_string())),
        }
    }

    /// Remove a twin, returning the removed handle
    pub fn delete(&self, id: &str) -> Result<Arc<Twin>> {
        let removed = self.twins.write().remove(id);

        match removed {
            Some(twin) => {
                tracing::debug!(twin_id = %id, "Removed twin");
                Ok(twin)
            }
            None => Err(TwinError::TwinNotFound(id.to_string())),
        }
    }

    /// Snapshot of all registered twins, in no particular order
    pub fn list(&self) -> Vec<Arc<Twin>> {
        self.twins.read().values().cloned().collect()
    }

    /// Twins whose attribute `key` is present and equal to `value`
    pub fn find_by_attribute(&self, key: &str, value: &Value) -> Vec<Arc<Twin>> {
        self.twins
            .read()
            .values()
            .filter(|twin| twin.attribute_equals(key, value))
            .cloned()
            .collect()
    }

    /// Twins that currently hold a feature named `feature_id`
    pub fn find_by_feature(&self, feature_id: &str) -> Vec<Arc<Twin>> {
        self.twins
            .read()
            .values()
            .filter(|twin| twin.has_feature(feature_id))
            .cloned()
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.twins.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.twins.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.twins.read().is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
