//! HTTP Router
//!
//! Resource hierarchy: twins → attributes / features → properties.

use std::time::Duration;

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handler::*;
use super::state::AppState;

/// Create the application router
pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/twins", get(list_twins).post(create_twin))
        .route(
            "/twins/:twin_id",
            get(get_twin).put(update_twin).delete(delete_twin),
        )
        .route("/twins/:twin_id/attributes", get(get_attributes))
        .route(
            "/twins/:twin_id/attributes/:key",
            get(get_attribute).put(put_attribute).delete(delete_attribute),
        )
        .route("/twins/:twin_id/features", get(get_features))
        .route(
            "/twins/:twin_id/features/:feature_id",
            get(get_feature).put(put_feature).delete(delete_feature),
        )
        .route(
            "/twins/:twin_id/features/:feature_id/properties",
            get(get_properties).put(put_properties),
        )
        .route(
            "/twins/:twin_id/features/:feature_id/desiredProperties",
            get(get_desired_properties).put(put_desired_properties),
        )
        .route(
            "/twins/:twin_id/features/:feature_id/properties/:key",
            get(get_property).put(put_property).delete(delete_property),
        )
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use twin_core::TryRecvError;

    use crate::server::protocol::topics;

    fn app(state: &AppState) -> Router {
        create_router(state.clone(), Duration::from_secs(30))
    }

    async fn send(
        state: &AppState,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        (status, value)
    }

    async fn create_sensor(state: &AppState, id: &str) {
        let (status, _) = send(
            state,
            "POST",
            "/twins",
            Some(json!({ "id": id, "type": "sensor" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_health() {
        let state = AppState::default();
        create_sensor(&state, "t1").await;

        let (status, body) = send(&state, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("ok"));
        assert_eq!(body["twins"], json!(1));
    }

    #[tokio::test]
    async fn test_create_twin() {
        let state = AppState::default();
        let mut events = state.bus().subscribe(topics::TWIN_CREATED);

        let (status, body) = send(
            &state,
            "POST",
            "/twins",
            Some(json!({
                "id": "test-twin-1",
                "type": "sensor",
                "definition": "org.example:sensor:1.0.0",
                "attributes": { "location": "living-room", "model": "X-1000" }
            })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], json!("test-twin-1"));
        assert_eq!(body["type"], json!("sensor"));
        assert_eq!(body["definition"], json!("org.example:sensor:1.0.0"));
        assert_eq!(body["attributes"]["model"], json!("X-1000"));

        let event = events.try_recv().unwrap();
        assert_eq!(event.payload["twinId"], json!("test-twin-1"));
    }

    #[tokio::test]
    async fn test_create_twin_validation() {
        let state = AppState::default();

        let (status, body) = send(
            &state,
            "POST",
            "/twins",
            Some(json!({ "attributes": { "location": "bedroom" } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], json!("INVALID_REQUEST"));

        let request = Request::builder()
            .method("POST")
            .uri("/twins")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app(&state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert!(state.registry().is_empty());
    }

    #[tokio::test]
    async fn test_create_duplicate_conflicts() {
        let state = AppState::default();
        create_sensor(&state, "t1").await;

        let (status, body) = send(
            &state,
            "POST",
            "/twins",
            Some(json!({ "id": "t1", "type": "actuator" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], json!("ALREADY_EXISTS"));
        assert_eq!(state.registry().get("t1").unwrap().twin_type(), "sensor");
    }

    #[tokio::test]
    async fn test_get_update_delete_twin() {
        let state = AppState::default();
        create_sensor(&state, "t1").await;
        let mut updated = state.bus().subscribe(topics::TWIN_UPDATED);
        let mut deleted = state.bus().subscribe(topics::TWIN_DELETED);

        let (status, body) = send(&state, "GET", "/twins/t1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], json!("t1"));

        let (status, body) = send(
            &state,
            "PUT",
            "/twins/t1",
            Some(json!({ "type": "thermostat", "attributes": { "floor": 2 } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], json!("thermostat"));
        assert_eq!(body["attributes"]["floor"], json!(2));
        assert_eq!(updated.try_recv().unwrap().payload["twinId"], json!("t1"));

        let (status, _) = send(&state, "DELETE", "/twins/t1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted.try_recv().unwrap().payload["twinId"], json!("t1"));

        let (status, body) = send(&state, "GET", "/twins/t1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], json!("NOT_FOUND"));

        let (status, _) = send(&state, "DELETE", "/twins/t1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&state, "PUT", "/twins/t1", Some(json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_and_filters() {
        let state = AppState::default();
        for id in ["t1", "t2", "t3"] {
            create_sensor(&state, id).await;
        }
        send(&state, "PUT", "/twins/t1/attributes/location", Some(json!("kitchen"))).await;
        send(&state, "PUT", "/twins/t2/attributes/location", Some(json!("hall"))).await;
        send(&state, "PUT", "/twins/t2/attributes/floor", Some(json!(2))).await;
        send(&state, "PUT", "/twins/t3/features/temp", Some(json!({}))).await;

        let (status, body) = send(&state, "GET", "/twins", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 3);

        let (_, body) = send(&state, "GET", "/twins?attribute=location&value=kitchen", None).await;
        let ids: Vec<_> = body.as_array().unwrap().iter().map(|t| t["id"].clone()).collect();
        assert_eq!(ids, vec![json!("t1")]);

        let (_, body) = send(&state, "GET", "/twins?attribute=floor&value=2", None).await;
        assert_eq!(body[0]["id"], json!("t2"));

        let (_, body) = send(&state, "GET", "/twins?feature=temp", None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["id"], json!("t3"));

        let (status, _) = send(&state, "GET", "/twins?attribute=location", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_attributes() {
        let state = AppState::default();
        create_sensor(&state, "t1").await;

        let (status, body) =
            send(&state, "PUT", "/twins/t1/attributes/location", Some(json!("kitchen"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("kitchen"));

        let (_, body) = send(&state, "GET", "/twins/t1/attributes", None).await;
        assert_eq!(body, json!({ "location": "kitchen" }));

        let (_, body) = send(&state, "GET", "/twins/t1/attributes/location", None).await;
        assert_eq!(body, json!("kitchen"));

        let (status, _) = send(&state, "DELETE", "/twins/t1/attributes/location", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&state, "GET", "/twins/t1/attributes/location", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&state, "DELETE", "/twins/t1/attributes/location", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_feature_management() {
        let state = AppState::default();
        create_sensor(&state, "t1").await;
        let mut updated = state.bus().subscribe(topics::FEATURE_UPDATED);
        let mut deleted = state.bus().subscribe(topics::FEATURE_DELETED);

        let (status, body) = send(
            &state,
            "PUT",
            "/twins/t1/features/temp",
            Some(json!({
                "properties": { "value": 22.5, "unit": "C" },
                "desiredProperties": { "value": 21.0 },
                "definition": ["org.example:temp:1.0.0"]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["properties"]["value"], json!(22.5));
        assert_eq!(body["desiredProperties"]["value"], json!(21.0));

        let event = updated.try_recv().unwrap();
        assert_eq!(event.payload["twinId"], json!("t1"));
        assert_eq!(event.payload["featureId"], json!("temp"));

        // Second PUT merges into the existing feature
        let (status, body) = send(
            &state,
            "PUT",
            "/twins/t1/features/temp",
            Some(json!({ "properties": { "value": 23.0 } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["properties"]["value"], json!(23.0));
        assert_eq!(body["properties"]["unit"], json!("C"));

        let (_, body) = send(&state, "GET", "/twins/t1/features", None).await;
        assert!(body["temp"].is_object());

        let (status, body) = send(&state, "GET", "/twins/t1/features/temp", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["definition"], json!(["org.example:temp:1.0.0"]));

        let (status, _) = send(&state, "DELETE", "/twins/t1/features/temp", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted.try_recv().unwrap().payload["featureId"], json!("temp"));

        let (status, _) = send(&state, "GET", "/twins/t1/features/temp", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&state, "DELETE", "/twins/t1/features/temp", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&state, "PUT", "/twins/nope/features/temp", Some(json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_property_management() {
        let state = AppState::default();
        create_sensor(&state, "t1").await;
        send(&state, "PUT", "/twins/t1/features/temp", Some(json!({}))).await;
        let mut properties_updated = state.bus().subscribe(topics::PROPERTIES_UPDATED);
        let mut property_updated = state.bus().subscribe(topics::PROPERTY_UPDATED);
        let mut property_deleted = state.bus().subscribe(topics::PROPERTY_DELETED);

        let (status, body) = send(
            &state,
            "PUT",
            "/twins/t1/features/temp/properties",
            Some(json!({ "value": 20.0, "unit": "C" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "value": 20.0, "unit": "C" }));
        assert!(properties_updated.try_recv().is_ok());

        let (status, body) = send(
            &state,
            "PUT",
            "/twins/t1/features/temp/properties/value",
            Some(json!(22.5)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(22.5));

        let event = property_updated.try_recv().unwrap();
        assert_eq!(event.payload["propertyKey"], json!("value"));
        assert_eq!(event.payload["value"], json!(22.5));

        let (_, body) = send(&state, "GET", "/twins/t1/features/temp/properties/value", None).await;
        assert_eq!(body, json!(22.5));

        let (_, body) = send(&state, "GET", "/twins/t1/features/temp/properties", None).await;
        assert_eq!(body["unit"], json!("C"));

        let (status, _) =
            send(&state, "DELETE", "/twins/t1/features/temp/properties/unit", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            property_deleted.try_recv().unwrap().payload["propertyKey"],
            json!("unit")
        );

        let (status, body) =
            send(&state, "GET", "/twins/t1/features/temp/properties/unit", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], json!("Property not found: unit"));

        let (status, _) =
            send(&state, "DELETE", "/twins/t1/features/temp/properties/unit", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(matches!(property_deleted.try_recv(), Err(TryRecvError::Empty)));

        let (status, _) = send(
            &state,
            "PUT",
            "/twins/t1/features/missing/properties/value",
            Some(json!(1)),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_desired_properties() {
        let state = AppState::default();
        create_sensor(&state, "t1").await;
        send(&state, "PUT", "/twins/t1/features/hvac", Some(json!({}))).await;

        let (status, body) = send(
            &state,
            "PUT",
            "/twins/t1/features/hvac/desiredProperties",
            Some(json!({ "setpoint": 21 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "setpoint": 21 }));

        let (_, body) = send(&state, "GET", "/twins/t1/features/hvac/desiredProperties", None).await;
        assert_eq!(body["setpoint"], json!(21));

        let (_, body) = send(&state, "GET", "/twins/t1/features/hvac/properties", None).await;
        assert_eq!(body, json!({}));
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let state = AppState::default();
        create_sensor(&state, "t1").await;
        send(&state, "PUT", "/twins/t1/attributes/location", Some(json!("kitchen"))).await;
        send(
            &state,
            "PUT",
            "/twins/t1/features/temp",
            Some(json!({ "properties": { "value": 22.5 } })),
        )
        .await;

        let (_, body) = send(&state, "GET", "/twins/t1/features/temp", None).await;
        assert_eq!(body["properties"]["value"], json!(22.5));

        let (_, body) = send(&state, "GET", "/twins?attribute=location&value=kitchen", None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["id"], json!("t1"));
    }
}
