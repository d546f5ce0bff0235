//! Digital Twin
//!
//! In-memory mirror of a physical device: free-form attributes plus a set of
//! named features.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{FeatureSnapshot, FeatureState, PropertyMap, Result, TwinError, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Point-in-time copy of a twin and all of its features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwinSnapshot {
    pub id: String,
    #[serde(rename = "type")]
    pub twin_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    pub attributes: PropertyMap,
    pub features: HashMap<String, FeatureSnapshot>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Twin
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct TwinData {
    twin_type: String,
    definition: Option<String>,
    attributes: PropertyMap,
    features: HashMap<String, Arc<FeatureState>>,
    modified_at: DateTime<Utc>,
}

/// A digital twin
///
/// The id is fixed at construction. Everything else sits behind the twin's
/// own lock, separate from the locks inside its features. `modified_at`
/// advances on every attribute, type, definition or feature-set mutation.
#[derive(Debug)]
pub struct Twin {
    id: String,
    created_at: DateTime<Utc>,
    inner: RwLock<TwinData>,
}

impl Twin {
    /// Create a twin with no attributes and no features
    pub fn new(id: impl Into<String>, twin_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            inner: RwLock::new(TwinData {
                twin_type: twin_type.into(),
                definition: None,
                attributes: PropertyMap::new(),
                features: HashMap::new(),
                modified_at: now,
            }),
        }
    }

    /// Set the definition before the twin is shared
    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.inner.get_mut().definition = Some(definition.into());
        self
    }

    /// Seed attributes before the twin is shared
    pub fn with_attributes(mut self, attributes: PropertyMap) -> Self {
        self.inner.get_mut().attributes.extend(attributes);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn twin_type(&self) -> String {
        self.inner.read().twin_type.clone()
    }

    pub fn set_type(&self, twin_type: impl Into<String>) {
        let mut data = self.inner.write();
        data.twin_type = twin_type.into();
        data.modified_at = Utc::now();
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        self.inner.read().modified_at
    }

    /// Optional schema reference
    pub fn definition(&self) -> Option<String> {
        self.inner.read().definition.clone()
    }

    pub fn set_definition(&self, definition: impl Into<String>) {
        let mut data = self.inner.write();
        data.definition = Some(definition.into());
        data.modified_at = Utc::now();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Attributes
    // ─────────────────────────────────────────────────────────────────────────

    pub fn attribute(&self, key: &str) -> Option<Value> {
        self.inner.read().attributes.get(key).cloned()
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: Value) {
        let mut data = self.inner.write();
        data.attributes.insert(key.into(), value);
        data.modified_at = Utc::now();
    }

    /// Remove an attribute, returning its old value
    pub fn remove_attribute(&self, key: &str) -> Option<Value> {
        let mut data = self.inner.write();
        let removed = data.attributes.remove(key);
        data.modified_at = Utc::now();
        removed
    }

    /// Copy of all attributes
    pub fn attributes(&self) -> PropertyMap {
        self.inner.read().attributes.clone()
    }

    /// Check an attribute against a value without copying it out
    pub fn attribute_equals(&self, key: &str, value: &Value) -> bool {
        self.inner.read().attributes.get(key) == Some(value)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Features
    // ─────────────────────────────────────────────────────────────────────────

    /// Copy of a stored feature
    ///
    /// Changes made to the copy are not seen by the twin; use
    /// [`Twin::modify_feature`] or [`Twin::update_feature`] to write back.
    pub fn feature(&self, id: &str) -> Option<FeatureState> {
        let handle = self.inner.read().features.get(id).cloned();
        handle.map(|feature| (*feature).clone())
    }

    pub fn has_feature(&self, id: &str) -> bool {
        self.inner.read().features.contains_key(id)
    }

    pub fn feature_ids(&self) -> Vec<String> {
        self.inner.read().features.keys().cloned().collect()
    }

    /// Add a new feature; fails if the id is taken
    pub fn add_feature(&self, id: impl Into<String>, feature: FeatureState) -> Result<()> {
        let id = id.into();
        let mut data = self.inner.write();

        if data.features.contains_key(&id) {
            return Err(TwinError::FeatureAlreadyExists(id));
        }

        data.features.insert(id, Arc::new(feature));
        data.modified_at = Utc::now();
        Ok(())
    }

    /// Replace an existing feature; fails if the id is absent
    pub fn update_feature(&self, id: &str, feature: FeatureState) -> Result<()> {
        let mut data = self.inner.write();

        match data.features.get_mut(id) {
            Some(slot) => *slot = Arc::new(feature),
            None => return Err(TwinError::FeatureNotFound(id.to_string())),
        }

        data.modified_at = Utc::now();
        Ok(())
    }

    /// Remove a feature; fails if the id is absent
    pub fn remove_feature(&self, id: &str) -> Result<()> {
        let mut data = self.inner.write();

        if data.features.remove(id).is_none() {
            return Err(TwinError::FeatureNotFound(id.to_string()));
        }

        data.modified_at = Utc::now();
        Ok(())
    }

    /// Copies of all features
    pub fn features(&self) -> HashMap<String, FeatureState> {
        let handles: Vec<(String, Arc<FeatureState>)> = self
            .inner
            .read()
            .features
            .iter()
            .map(|(id, feature)| (id.clone(), feature.clone()))
            .collect();

        handles
            .into_iter()
            .map(|(id, feature)| (id, (*feature).clone()))
            .collect()
    }

    /// Read-modify-write a stored feature atomically
    ///
    /// `f` runs while the twin's exclusive lock is held, so no other twin
    /// operation interleaves with it. `modified_at` advances only when `f`
    /// returns `Ok`.
    pub fn modify_feature<R>(
        &self,
        id: &str,
        f: impl FnOnce(&FeatureState) -> Result<R>,
    ) -> Result<R> {
        let mut data = self.inner.write();

        let feature = data
            .features
            .get(id)
            .cloned()
            .ok_or_else(|| TwinError::FeatureNotFound(id.to_string()))?;

        let output = f(&feature)?;
        data.modified_at = Utc::now();
        Ok(output)
    }

    /// Like [`Twin::modify_feature`], inserting an empty feature first when
    /// `id` is absent. Returns `f`'s output and whether the feature was created.
    pub fn upsert_feature<R>(&self, id: &str, f: impl FnOnce(&FeatureState) -> R) -> (R, bool) {
        let mut data = self.inner.write();

        let mut created = false;
        let feature = data
            .features
            .entry(id.to_string())
            .or_insert_with(|| {
                created = true;
                Arc::new(FeatureState::new())
            })
            .clone();

        let output = f(&feature);
        data.modified_at = Utc::now();
        (output, created)
    }

    /// Copy the whole twin, features included
    pub fn snapshot(&self) -> TwinSnapshot {
        let (twin_type, definition, attributes, handles, modified_at) = {
            let data = self.inner.read();
            (
                data.twin_type.clone(),
                data.definition.clone(),
                data.attributes.clone(),
                data.features
                    .iter()
                    .map(|(id, feature)| (id.clone(), feature.clone()))
                    .collect::<Vec<_>>(),
                data.modified_at,
            )
        };

        TwinSnapshot {
            id: self.id.clone(),
            twin_type,
            definition,
            attributes,
            features: handles
                .into_iter()
                .map(|(id, feature)| (id, feature.snapshot()))
                .collect(),
            created_at: self.created_at,
            modified_at,
        }
    }
}

impl Serialize for Twin {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
