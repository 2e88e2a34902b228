//! Power endpoints

use crate::engine::{EngineError, PowerEngine, PowerStatus};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

type ApiResult<T> = Result<T, EngineError>;

/// Body of `GET /power`
#[derive(Debug, Serialize)]
struct StatusBody {
    #[serde(flatten)]
    status: PowerStatus,
    code: u16,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match self {
            EngineError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Conflict { .. } => StatusCode::CONFLICT,
        };
        debug!("Request refused ({}): {}", status, self);

        let body = json!({
            "message": self.to_string(),
            "code": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}

pub fn power_routes() -> Router<Arc<PowerEngine>> {
    Router::new()
        .route("/", get(index))
        .route("/power", get(power_status))
        .route("/power/on", get(power_on))
        .route("/power/off", get(power_off))
}

async fn index() -> Json<Value> {
    Json(json!({
        "message": "ILO Rest API up and running!",
        "code": 200,
    }))
}

async fn power_status(State(engine): State<Arc<PowerEngine>>) -> ApiResult<Json<StatusBody>> {
    let status = engine.query_state().await?;
    Ok(Json(StatusBody { status, code: 200 }))
}

async fn power_on(State(engine): State<Arc<PowerEngine>>) -> ApiResult<(StatusCode, Json<Value>)> {
    let status = engine.request_power_on().await?;
    info!("Starting server...");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Starting server...",
            "power_state": status.power_state,
            "code": 202,
        })),
    ))
}

async fn power_off(State(engine): State<Arc<PowerEngine>>) -> ApiResult<(StatusCode, Json<Value>)> {
    let status = engine.request_power_off().await?;
    info!("Stopping server...");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Stopping server...",
            "power_state": status.power_state,
            "code": 202,
        })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::create_app;
    use crate::config::{RateLimitConfig, TimingConfig};
    use crate::transport::fake::{FakeConnector, FakeDevice};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn app_for(engine: Arc<PowerEngine>) -> Router {
        let rate_limit = RateLimitConfig {
            max_requests: 100,
            ..Default::default()
        };
        create_app(engine, rate_limit)
    }

    /// Engine with a started session that has seen one status poll
    async fn polled_engine(device: &FakeDevice) -> Arc<PowerEngine> {
        let engine = Arc::new(PowerEngine::new(
            Arc::new(FakeConnector::new(device.clone())),
            TimingConfig::default(),
        ));
        let _handle = engine.start().await.unwrap();
        // Ready at 500ms, first poll lands on the scheduler's first tick
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        engine
    }

    #[tokio::test]
    async fn test_index() {
        let device = FakeDevice::new(false);
        let engine = Arc::new(PowerEngine::new(
            Arc::new(FakeConnector::new(device)),
            TimingConfig::default(),
        ));
        let app = app_for(engine);

        let (status, body) = get_json(&app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "ILO Rest API up and running!");
        assert_eq!(body["code"], 200);
    }

    #[tokio::test]
    async fn test_unavailable_before_connect() {
        let device = FakeDevice::new(false);
        let engine = Arc::new(PowerEngine::new(
            Arc::new(FakeConnector::new(device)),
            TimingConfig::default(),
        ));
        let app = app_for(engine);

        for uri in ["/power", "/power/on", "/power/off"] {
            let (status, body) = get_json(&app, uri).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{}", uri);
            assert_eq!(body["message"], "SSH not connected");
            assert_eq!(body["code"], 503);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_power_status() {
        let device = FakeDevice::new(true);
        let app = app_for(polled_engine(&device).await);

        let (status, body) = get_json(&app, "/power").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["powered_on"], true);
        assert_eq!(body["power_state"], "started");
        assert_eq!(body["requested_state"], "unknown");
        assert_eq!(body["connected"], true);
        assert_eq!(body["scheduler_running"], true);
        assert_eq!(body["unrecognized_responses"], 0);
        assert_eq!(body["code"], 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_power_on_accepted_then_conflict() {
        let device = FakeDevice::new(false);
        let app = app_for(polled_engine(&device).await);

        let (status, body) = get_json(&app, "/power/on").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["message"], "Starting server...");
        assert_eq!(body["power_state"], "stopped");

        // Let the scheduler power on and confirm it
        tokio::time::sleep(std::time::Duration::from_secs(12)).await;
        assert!(device.powered_on());

        let (status, body) = get_json(&app, "/power/on").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "Already on");
        assert_eq!(body["code"], 409);
    }

    #[tokio::test(start_paused = true)]
    async fn test_power_off_conflict_when_stopped() {
        let device = FakeDevice::new(false);
        let app = app_for(polled_engine(&device).await);

        let (status, body) = get_json(&app, "/power/off").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "Already off");
    }

    #[tokio::test(start_paused = true)]
    async fn test_power_off_accepted_when_started() {
        let device = FakeDevice::new(true);
        let app = app_for(polled_engine(&device).await);

        let (status, body) = get_json(&app, "/power/off").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["message"], "Stopping server...");
        assert_eq!(body["power_state"], "started");

        let (_, body) = get_json(&app, "/power").await;
        assert_eq!(body["requested_state"], "off");
    }
}
