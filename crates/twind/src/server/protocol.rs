//! HTTP Protocol Types
//!
//! Request bodies, event topics and the error envelope returned to clients.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use twin_core::{PropertyMap, TwinError, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Event Topics
// ─────────────────────────────────────────────────────────────────────────────

/// Topics published after successful mutations
pub mod topics {
    pub const TWIN_CREATED: &str = "twin.created";
    pub const TWIN_UPDATED: &str = "twin.updated";
    pub const TWIN_DELETED: &str = "twin.deleted";
    pub const FEATURE_UPDATED: &str = "feature.updated";
    pub const FEATURE_DELETED: &str = "feature.deleted";
    pub const PROPERTIES_UPDATED: &str = "properties.updated";
    pub const PROPERTY_UPDATED: &str = "property.updated";
    pub const PROPERTY_DELETED: &str = "property.deleted";

    pub const ALL: [&str; 8] = [
        TWIN_CREATED,
        TWIN_UPDATED,
        TWIN_DELETED,
        FEATURE_UPDATED,
        FEATURE_DELETED,
        PROPERTIES_UPDATED,
        PROPERTY_UPDATED,
        PROPERTY_DELETED,
    ];
}

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// POST /twins
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTwinRequest {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub twin_type: String,
    #[serde(default)]
    pub definition: Option<String>,
    #[serde(default)]
    pub attributes: PropertyMap,
}

/// PUT /twins/{id}; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTwinRequest {
    #[serde(rename = "type", default)]
    pub twin_type: Option<String>,
    #[serde(default)]
    pub definition: Option<String>,
    #[serde(default)]
    pub attributes: Option<PropertyMap>,
}

/// PUT /twins/{id}/features/{fid}; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRequest {
    #[serde(default)]
    pub properties: Option<PropertyMap>,
    #[serde(default)]
    pub desired_properties: Option<PropertyMap>,
    #[serde(default)]
    pub definition: Option<Vec<String>>,
}

/// GET /twins query filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    /// Only twins holding this feature
    pub feature: Option<String>,
    /// Attribute key to match, paired with `value`
    pub attribute: Option<String>,
    pub value: Option<String>,
}

/// Interpret a query-string value as JSON when it parses, else as a string
pub fn parse_query_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

/// Plain acknowledgement body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    NotFound,
    AlreadyExists,
    InternalError,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::AlreadyExists => StatusCode::CONFLICT,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub code: ErrorCode,
}

impl ApiError {
    pub fn new(code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, error)
    }

    pub fn internal(error: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

impl From<TwinError> for ApiError {
    fn from(err: TwinError) -> Self {
        let code = match &err {
            e if e.is_not_found() => ErrorCode::NotFound,
            e if e.is_conflict() => ErrorCode::AlreadyExists,
            TwinError::InvalidValue(_) => ErrorCode::InvalidRequest,
            _ => ErrorCode::InternalError,
        };
        Self::new(code, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(format!("Invalid query: {}", rejection.body_text()))
    }
}
