//! HTTP Request Handlers
//!
//! Each mutation resolves the twin through the registry, changes it in place,
//! re-commits it with `Registry::update` and then publishes a change event.
//! Reads never touch the bus.

use std::collections::HashMap;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use twin_core::{FeatureSnapshot, PropertyMap, Twin, TwinError, TwinSnapshot, Value};

use super::protocol::{
    parse_query_value, topics, ApiError, CreateTwinRequest, ErrorCode, FeatureRequest,
    ListQuery, MessageResponse, UpdateTwinRequest,
};
use super::state::AppState;

/// Result type for handlers
pub type ApiResult<T> = Result<T, ApiError>;

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    twins: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        twins: state.registry().len(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Twins
// ─────────────────────────────────────────────────────────────────────────────

/// POST /twins
pub async fn create_twin(
    State(state): State<AppState>,
    payload: Result<Json<CreateTwinRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TwinSnapshot>)> {
    let Json(req) = payload?;

    if req.id.is_empty() || req.twin_type.is_empty() {
        return Err(ApiError::bad_request("ID and Type are required"));
    }

    let mut twin = Twin::new(req.id, req.twin_type).with_attributes(req.attributes);
    if let Some(definition) = req.definition.filter(|d| !d.is_empty()) {
        twin = twin.with_definition(definition);
    }

    let twin = state.registry().create(twin)?;
    info!(twin_id = %twin.id(), "Created twin");

    state.publish(topics::TWIN_CREATED, json!({ "twinId": twin.id() }));

    Ok((StatusCode::CREATED, Json(twin.snapshot())))
}

/// GET /twins
///
/// Optional filters: `?feature=F`, `?attribute=K&value=V`, or both.
pub async fn list_twins(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<TwinSnapshot>>> {
    let Query(query) = query?;
    let registry = state.registry();

    let attribute = match (query.attribute, query.value) {
        (Some(key), Some(value)) => Some((key, parse_query_value(&value))),
        (None, None) => None,
        _ => {
            return Err(ApiError::bad_request(
                "`attribute` and `value` must be given together",
            ));
        }
    };

    let twins = match (&query.feature, &attribute) {
        (None, None) => registry.list(),
        (Some(feature), None) => registry.find_by_feature(feature),
        (None, Some((key, value))) => registry.find_by_attribute(key, value),
        (Some(feature), Some((key, value))) => registry
            .find_by_feature(feature)
            .into_iter()
            .filter(|twin| twin.attribute_equals(key, value))
            .collect(),
    };

    let mut snapshots: Vec<TwinSnapshot> = twins.iter().map(|twin| twin.snapshot()).collect();
    snapshots.sort_by(|a, b| a.id.cmp(&b.id));

    Ok(Json(snapshots))
}

/// GET /twins/{twin_id}
pub async fn get_twin(
    State(state): State<AppState>,
    Path(twin_id): Path<String>,
) -> ApiResult<Json<TwinSnapshot>> {
    let twin = state.registry().get(&twin_id)?;
    Ok(Json(twin.snapshot()))
}

/// PUT /twins/{twin_id}
pub async fn update_twin(
    State(state): State<AppState>,
    Path(twin_id): Path<String>,
    payload: Result<Json<UpdateTwinRequest>, JsonRejection>,
) -> ApiResult<Json<TwinSnapshot>> {
    let twin = state.registry().get(&twin_id)?;
    let Json(req) = payload?;

    if let Some(twin_type) = req.twin_type.filter(|t| !t.is_empty()) {
        twin.set_type(twin_type);
    }
    if let Some(definition) = req.definition.filter(|d| !d.is_empty()) {
        twin.set_definition(definition);
    }
    for (key, value) in req.attributes.unwrap_or_default() {
        twin.set_attribute(key, value);
    }

    state.registry().update(twin.clone())?;
    debug!(twin_id = %twin_id, "Updated twin");

    state.publish(topics::TWIN_UPDATED, json!({ "twinId": twin_id }));

    Ok(Json(twin.snapshot()))
}

/// DELETE /twins/{twin_id}
pub async fn delete_twin(
    State(state): State<AppState>,
    Path(twin_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    state.registry().delete(&twin_id)?;
    info!(twin_id = %twin_id, "Deleted twin");

    state.publish(topics::TWIN_DELETED, json!({ "twinId": twin_id }));

    Ok(Json(MessageResponse::new("Digital twin deleted")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Attributes
// ─────────────────────────────────────────────────────────────────────────────

/// GET /twins/{twin_id}/attributes
pub async fn get_attributes(
    State(state): State<AppState>,
    Path(twin_id): Path<String>,
) -> ApiResult<Json<PropertyMap>> {
    let twin = state.registry().get(&twin_id)?;
    Ok(Json(twin.attributes()))
}

/// GET /twins/{twin_id}/attributes/{key}
pub async fn get_attribute(
    State(state): State<AppState>,
    Path((twin_id, key)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let twin = state.registry().get(&twin_id)?;
    twin.attribute(&key)
        .map(Json)
        .ok_or_else(|| attribute_not_found(&key))
}

/// PUT /twins/{twin_id}/attributes/{key}
pub async fn put_attribute(
    State(state): State<AppState>,
    Path((twin_id, key)): Path<(String, String)>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let twin = state.registry().get(&twin_id)?;
    let Json(value) = payload?;

    twin.set_attribute(key.clone(), value.clone());
    state.registry().update(twin)?;

    state.publish(
        topics::TWIN_UPDATED,
        json!({ "twinId": twin_id, "attribute": key, "value": value }),
    );

    Ok(Json(value))
}

/// DELETE /twins/{twin_id}/attributes/{key}
pub async fn delete_attribute(
    State(state): State<AppState>,
    Path((twin_id, key)): Path<(String, String)>,
) -> ApiResult<Json<MessageResponse>> {
    let twin = state.registry().get(&twin_id)?;

    if twin.remove_attribute(&key).is_none() {
        return Err(attribute_not_found(&key));
    }
    state.registry().update(twin)?;

    state.publish(
        topics::TWIN_UPDATED,
        json!({ "twinId": twin_id, "attribute": key }),
    );

    Ok(Json(MessageResponse::new("Attribute deleted")))
}

fn attribute_not_found(key: &str) -> ApiError {
    ApiError::new(ErrorCode::NotFound, format!("Attribute not found: {}", key))
}

// ─────────────────────────────────────────────────────────────────────────────
// Features
// ─────────────────────────────────────────────────────────────────────────────

/// GET /twins/{twin_id}/features
pub async fn get_features(
    State(state): State<AppState>,
    Path(twin_id): Path<String>,
) -> ApiResult<Json<HashMap<String, FeatureSnapshot>>> {
    let twin = state.registry().get(&twin_id)?;
    Ok(Json(twin.snapshot().features))
}

/// GET /twins/{twin_id}/features/{feature_id}
pub async fn get_feature(
    State(state): State<AppState>,
    Path((twin_id, feature_id)): Path<(String, String)>,
) -> ApiResult<Json<FeatureSnapshot>> {
    let twin = state.registry().get(&twin_id)?;
    let feature = twin
        .feature(&feature_id)
        .ok_or(TwinError::FeatureNotFound(feature_id))?;

    Ok(Json(feature.snapshot()))
}

/// PUT /twins/{twin_id}/features/{feature_id}
///
/// Creates the feature when it does not exist yet.
pub async fn put_feature(
    State(state): State<AppState>,
    Path((twin_id, feature_id)): Path<(String, String)>,
    payload: Result<Json<FeatureRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<FeatureSnapshot>)> {
    let twin = state.registry().get(&twin_id)?;
    let Json(req) = payload?;

    let (snapshot, created) = twin.upsert_feature(&feature_id, |feature| {
        if let Some(properties) = req.properties {
            feature.merge_properties(properties);
        }
        if let Some(desired) = req.desired_properties {
            feature.merge_desired_properties(desired);
        }
        if let Some(definition) = req.definition {
            feature.set_definition(definition);
        }
        feature.snapshot()
    });
    state.registry().update(twin)?;
    debug!(twin_id = %twin_id, feature_id = %feature_id, created, "Stored feature");

    state.publish(
        topics::FEATURE_UPDATED,
        json!({ "twinId": twin_id, "featureId": feature_id }),
    );

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(snapshot)))
}

/// DELETE /twins/{twin_id}/features/{feature_id}
pub async fn delete_feature(
    State(state): State<AppState>,
    Path((twin_id, feature_id)): Path<(String, String)>,
) -> ApiResult<Json<MessageResponse>> {
    let twin = state.registry().get(&twin_id)?;

    twin.remove_feature(&feature_id)?;
    state.registry().update(twin)?;

    state.publish(
        topics::FEATURE_DELETED,
        json!({ "twinId": twin_id, "featureId": feature_id }),
    );

    Ok(Json(MessageResponse::new("Feature deleted")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Properties
// ─────────────────────────────────────────────────────────────────────────────

/// GET /twins/{twin_id}/features/{feature_id}/properties
pub async fn get_properties(
    State(state): State<AppState>,
    Path((twin_id, feature_id)): Path<(String, String)>,
) -> ApiResult<Json<PropertyMap>> {
    let twin = state.registry().get(&twin_id)?;
    let feature = twin
        .feature(&feature_id)
        .ok_or(TwinError::FeatureNotFound(feature_id))?;

    Ok(Json(feature.properties()))
}

/// PUT /twins/{twin_id}/features/{feature_id}/properties
///
/// Merges the body into the current properties.
pub async fn put_properties(
    State(state): State<AppState>,
    Path((twin_id, feature_id)): Path<(String, String)>,
    payload: Result<Json<PropertyMap>, JsonRejection>,
) -> ApiResult<Json<PropertyMap>> {
    let twin = state.registry().get(&twin_id)?;
    let Json(properties) = payload?;

    let merged = twin.modify_feature(&feature_id, |feature| {
        feature.merge_properties(properties);
        Ok(feature.properties())
    })?;
    state.registry().update(twin)?;

    state.publish(
        topics::PROPERTIES_UPDATED,
        json!({ "twinId": twin_id, "featureId": feature_id }),
    );

    Ok(Json(merged))
}

/// GET /twins/{twin_id}/features/{feature_id}/desiredProperties
pub async fn get_desired_properties(
    State(state): State<AppState>,
    Path((twin_id, feature_id)): Path<(String, String)>,
) -> ApiResult<Json<PropertyMap>> {
    let twin = state.registry().get(&twin_id)?;
    let feature = twin
        .feature(&feature_id)
        .ok_or(TwinError::FeatureNotFound(feature_id))?;

    Ok(Json(feature.desired_properties()))
}

/// PUT /twins/{twin_id}/features/{feature_id}/desiredProperties
pub async fn put_desired_properties(
    State(state): State<AppState>,
    Path((twin_id, feature_id)): Path<(String, String)>,
    payload: Result<Json<PropertyMap>, JsonRejection>,
) -> ApiResult<Json<PropertyMap>> {
    let twin = state.registry().get(&twin_id)?;
    let Json(desired) = payload?;

    let merged = twin.modify_feature(&feature_id, |feature| {
        feature.merge_desired_properties(desired);
        Ok(feature.desired_properties())
    })?;
    state.registry().update(twin)?;

    state.publish(
        topics::FEATURE_UPDATED,
        json!({ "twinId": twin_id, "featureId": feature_id }),
    );

    Ok(Json(merged))
}

/// GET /twins/{twin_id}/features/{feature_id}/properties/{key}
pub async fn get_property(
    State(state): State<AppState>,
    Path((twin_id, feature_id, key)): Path<(String, String, String)>,
) -> ApiResult<Json<Value>> {
    let twin = state.registry().get(&twin_id)?;
    let feature = twin
        .feature(&feature_id)
        .ok_or(TwinError::FeatureNotFound(feature_id))?;

    let value = feature
        .property(&key)
        .ok_or(TwinError::PropertyNotFound(key))?;

    Ok(Json(value))
}

/// PUT /twins/{twin_id}/features/{feature_id}/properties/{key}
pub async fn put_property(
    State(state): State<AppState>,
    Path((twin_id, feature_id, key)): Path<(String, String, String)>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let twin = state.registry().get(&twin_id)?;
    let Json(value) = payload?;

    twin.modify_feature(&feature_id, |feature| {
        feature.set_property(key.clone(), value.clone());
        Ok(())
    })?;
    state.registry().update(twin)?;

    state.publish(
        topics::PROPERTY_UPDATED,
        json!({
            "twinId": twin_id,
            "featureId": feature_id,
            "propertyKey": key,
            "value": value,
        }),
    );

    Ok(Json(value))
}

/// DELETE /twins/{twin_id}/features/{feature_id}/properties/{key}
pub async fn delete_property(
    State(state): State<AppState>,
    Path((twin_id, feature_id, key)): Path<(String, String, String)>,
) -> ApiResult<Json<MessageResponse>> {
    let twin = state.registry().get(&twin_id)?;

    twin.modify_feature(&feature_id, |feature| {
        feature
            .remove_property(&key)
            .map(|_| ())
            .ok_or_else(|| TwinError::PropertyNotFound(key.clone()))
    })?;
    state.registry().update(twin)?;

    state.publish(
        topics::PROPERTY_DELETED,
        json!({ "twinId": twin_id, "featureId": feature_id, "propertyKey": key }),
    );

    Ok(Json(MessageResponse::new("Property deleted")))
}
