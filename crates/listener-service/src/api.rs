use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse, Json, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use application::DeviceView;
use chrono::Utc;
use domain::command::CommandError;
use domain::device::DeviceId;
use domain::reading::Reading;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use crate::state::AppState;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/devices", get(get_devices))
        .route("/api/devices/{id}", get(get_device))
        .route("/api/devices/{id}/history", get(get_device_history))
        .route("/api/devices/{id}/command", post(send_command))
        .route("/api/commands/pending", get(get_pending_commands))
        .route("/api/metrics", get(get_metrics))
        .route("/api/billing", get(get_billing))
        .route("/api/billing/{tenant}/history", get(get_billing_history))
        .route("/api/racks", get(get_racks))
        .route("/api/events", get(sse_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct DeviceEntry {
    #[serde(flatten)]
    view: DeviceView,
    latest: Option<Reading>,
    fresh: bool,
}

#[derive(Debug, Deserialize)]
pub struct CommandBody {
    pub command: String,
    #[serde(default = "empty_params")]
    pub params: Value,
    pub timeout_ms: Option<u64>,
}

fn empty_params() -> Value {
    json!({})
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn parse_device_id(raw: String) -> Result<DeviceId, Response> {
    DeviceId::new(raw).map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))
}

fn command_status(err: &CommandError) -> StatusCode {
    match err {
        CommandError::UnknownDevice(_) => StatusCode::NOT_FOUND,
        CommandError::DeviceDisabled(_) => StatusCode::CONFLICT,
        CommandError::Busy { .. } => StatusCode::SERVICE_UNAVAILABLE,
        CommandError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        CommandError::Rejected(_) => StatusCode::BAD_GATEWAY,
        CommandError::Publish(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn device_entry(state: &AppState, view: DeviceView) -> DeviceEntry {
    let latest = state.cache.latest(&view.id);
    let fresh = latest
        .as_ref()
        .map(|r| state.cache.is_fresh(r, Utc::now()))
        .unwrap_or(false);
    DeviceEntry {
        view,
        latest,
        fresh,
    }
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "listener_id": state.listener_id,
        "status": "ok",
        "mqtt_connected": state.mqtt.is_connected(),
        "uptime_secs": state.uptime_secs(),
        "devices_online": state.registry.online_count(),
        "cached_devices": state.cache.len(),
        "pending_commands": state.broker.pending_count(),
    }))
}

async fn get_devices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let list: Vec<DeviceEntry> = state
        .registry
        .list()
        .into_iter()
        .map(|view| device_entry(&state, view))
        .collect();
    Json(list)
}

async fn get_device(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let device_id = match parse_device_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.registry.get(&device_id) {
        Some(view) => Json(device_entry(&state, view)).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("Device {} not found", device_id),
        ),
    }
}

async fn get_device_history(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let device_id = match parse_device_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let history = state.cache.history(&device_id);
    if history.is_empty() && state.registry.get(&device_id).is_none() {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("Device {} not found", device_id),
        );
    }
    Json(history).into_response()
}

async fn send_command(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CommandBody>,
) -> Response {
    let device_id = match parse_device_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if body.command.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Command must not be empty");
    }

    let timeout = body.timeout_ms.map(Duration::from_millis);
    match state
        .broker
        .dispatch(&device_id, &body.command, body.params, timeout)
        .await
    {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => {
            warn!(device_id = %device_id, command = %body.command, "Command failed: {}", e);
            error_response(command_status(&e), e.to_string())
        }
    }
}

async fn get_pending_commands(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.broker.pending())
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.latest())
}

async fn get_billing(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.billing_statements())
}

async fn get_billing_history(
    Path(tenant): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(store) = &state.store else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Billing history unavailable");
    };

    match store.billing_history(&tenant).await {
        Ok(statements) => Json(statements).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn get_racks(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.racks.capacity())
}

async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let rx = state.tx.subscribe();

    let stream = BroadcastStream::new(rx).map(|msg| match msg {
        Ok(event) => Event::default()
            .event(event.event_type())
            .json_data(event)
            .map_err(|_| axum::Error::new("Serialization error")),
        // Lagged subscriber: skip ahead
        Err(_) => Ok(Event::default().comment("keep-alive")),
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
