// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Portal HTTP API.
//!
//! Endpoints:
//!   GET  /api/status                       → composed snapshot for initial render
//!   GET  /api/health                       → raw agent health snapshot
//!   GET  /api/logs?lines=N                 → last N lines of the service log
//!   GET  /api/log_level                    → current log level
//!   POST /api/log_level                    → change level
//!   GET  /api/events                       → tiered SSE stream
//!   GET  /api/images/<cam>/latest          → most recent JPEG for a camera
//!   POST /api/cameras/<cam>/capture        → force an immediate capture
//!   POST /api/cameras/<cam>/restart        → restart one camera worker
//!   POST /api/cameras/<cam>/position       → update position label
//!   POST /api/wifi_ap/enable|disable       → toggle access-point network
//!   GET  /api/update/status                → read update state file
//!   POST /api/update/check                 → force a version check (no apply)
//!   /api/fleet/*                           → bearer-guarded remote control

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, warn};

use crate::control::{client as control_client, ControlReply, ControlRequest};
use crate::portal::health_client;
use crate::portal::log_tail;
use crate::portal::sse::event_stream;
use crate::portal::state::AppState;
use crate::update::UpdateState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let fleet = Router::new()
        .route("/status", get(handle_status))
        .route("/config", post(handle_fleet_config))
        .layer(middleware::from_fn_with_state(state.clone(), fleet_auth));

    Router::new()
        .route("/api/status", get(handle_status))
        .route("/api/health", get(handle_health))
        .route("/api/logs", get(handle_logs))
        .route("/api/log_level", get(handle_get_log_level).post(handle_set_log_level))
        .route("/api/events", get(event_stream))
        .route("/api/images/{camera_id}/latest", get(handle_latest_image))
        .route("/api/cameras/{camera_id}/capture", post(handle_capture))
        .route("/api/cameras/{camera_id}/restart", post(handle_restart))
        .route("/api/cameras/{camera_id}/position", post(handle_set_position))
        .route("/api/wifi_ap/enable", post(handle_wifi_ap_enable))
        .route("/api/wifi_ap/disable", post(handle_wifi_ap_disable))
        .route("/api/update/status", get(handle_update_status))
        .route("/api/update/check", post(handle_update_check))
        .nest("/api/fleet", fleet)
        .fallback_service(ServeDir::new("portal-ui"))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(state: Arc<AppState>, bind_address: &str, port: u16) {
    let app = build_router(state);
    let addr = format!("{bind_address}:{port}");
    tracing::info!(%addr, "portal HTTP listening");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, "failed to bind portal HTTP server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "portal HTTP server error");
    }
}

// ──────────────── status / health ──────────────────────────────────────

#[derive(Serialize)]
struct NodeInfo {
    id: String,
    location: String,
    version: &'static str,
}

#[derive(Serialize)]
struct Features {
    cameras: usize,
    wifi_ap: bool,
    storage: bool,
}

async fn compose_status(state: &AppState) -> Response {
    let snapshot = match health_client::full(&state.health_socket).await {
        Ok(s) => Some(s),
        Err(e) => {
            warn!(error = %e, "health socket unreachable while composing status");
            None
        }
    };

    let agent_status = control_client::send(&state.control_socket, ControlRequest::Status).await.ok();
    let wifi_ap_enabled = matches!(
        &agent_status,
        Some(ControlReply::Status(view)) if view.wifi_ap_enabled
    );

    let update_state = UpdateState::load_or_init(
        &state.update_state_path,
        env!("CARGO_PKG_VERSION"),
        state.config.read().updates.channel,
    )
    .ok();

    let (device_id, location, network) = {
        let cfg = state.config.read();
        (cfg.device.id.clone(), cfg.device.location.clone(), cfg.network.clone())
    };

    let node = NodeInfo {
        id: device_id,
        location,
        version: state.version,
    };
    let camera_count = state.config.read().cameras.len();
    let features = Features {
        cameras: camera_count,
        wifi_ap: !state.config.read().wifi_ap.ssid_template.is_empty(),
        storage: true,
    };

    Json(json!({
        "node": node,
        "data": {
            "system": snapshot.as_ref().map(|s| &s.system),
            "cameras": snapshot.as_ref().map(|s| &s.cameras),
            "storage": snapshot.as_ref().map(|s| s.storage_total_bytes),
            "network": network,
            "wifi_ap": { "enabled": wifi_ap_enabled },
            "update": update_state,
        },
        "features": features,
    }))
    .into_response()
}

async fn handle_status(State(state): State<Arc<AppState>>) -> Response {
    compose_status(&state).await
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    match health_client::full(&state.health_socket).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": format!("agent health socket unreachable: {e}") })),
        )
            .into_response(),
    }
}

// ──────────────── logs / log level ─────────────────────────────────────

#[derive(Deserialize)]
struct LogsParams {
    #[serde(default = "default_log_lines")]
    lines: usize,
}

fn default_log_lines() -> usize {
    200
}

async fn handle_logs(State(state): State<Arc<AppState>>, Query(params): Query<LogsParams>) -> Response {
    let path = state.log_path.clone();
    match tokio::task::spawn_blocking(move || log_tail::tail_lines(&path, params.lines)).await {
        Ok(Ok(lines)) => Json(json!({ "lines": lines })).into_response(),
        Ok(Err(e)) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

async fn handle_get_log_level(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({ "level": state.config.read().logging.level })).into_response()
}

#[derive(Deserialize)]
struct SetLogLevel {
    level: String,
}

async fn handle_set_log_level(State(state): State<Arc<AppState>>, Json(body): Json<SetLogLevel>) -> Response {
    let level = body.level.to_uppercase();
    if !["WARNING", "INFO", "DEBUG"].contains(&level.as_str()) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "level must be one of WARNING, INFO, DEBUG" })),
        )
            .into_response();
    }

    {
        let mut cfg = state.config.write();
        cfg.logging.level = level.clone();
        if let Err(e) = cfg.save_to_file(&state.config_path) {
            error!(error = %e, "failed to persist log level change");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response();
        }
    }

    crate::portal::reload::signal_agent_reload();
    Json(json!({ "level": level })).into_response()
}

// ──────────────── images ────────────────────────────────────────────────

async fn handle_latest_image(State(state): State<Arc<AppState>>, Path(camera_id): Path<String>) -> Response {
    let root = state.storage_root.clone();
    let camera_id2 = camera_id.clone();
    let found = tokio::task::spawn_blocking(move || latest_image_path(&root, &camera_id2)).await;

    match found {
        Ok(Some(path)) => match std::fs::read(&path) {
            Ok(bytes) => (StatusCode::OK, [("content-type", "image/jpeg")], bytes).into_response(),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response(),
        },
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no captured image found for camera '{camera_id}'") })),
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

fn latest_image_path(storage_root: &std::path::Path, camera_id: &str) -> Option<std::path::PathBuf> {
    let mut best: Option<std::path::PathBuf> = None;
    for subtree in ["uploaded", "pending"] {
        let dir = storage_root.join(subtree).join(camera_id);
        if !dir.exists() {
            continue;
        }
        for entry in walkdir(&dir) {
            if entry.extension().and_then(|e| e.to_str()) != Some("jpg") {
                continue;
            }
            if best.as_ref().map(|b| entry.file_name() > b.file_name()).unwrap_or(true) {
                best = Some(entry);
            }
        }
    }
    best
}

fn walkdir(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(d) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&d) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out
}

// ──────────────── camera control ────────────────────────────────────────

async fn relay(state: &AppState, request: ControlRequest) -> Response {
    match control_client::send(&state.control_socket, request).await {
        Ok(ControlReply::Ok) => Json(json!({ "status": "ok" })).into_response(),
        Ok(ControlReply::Status(view)) => Json(view).into_response(),
        Ok(ControlReply::Error { message }) => (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response(),
        Err(e) => (StatusCode::BAD_GATEWAY, Json(json!({ "error": format!("control socket unreachable: {e}") }))).into_response(),
    }
}

async fn handle_capture(State(state): State<Arc<AppState>>, Path(camera_id): Path<String>) -> Response {
    relay(&state, ControlRequest::Capture { camera: camera_id }).await
}

async fn handle_restart(State(state): State<Arc<AppState>>, Path(camera_id): Path<String>) -> Response {
    relay(&state, ControlRequest::Restart { camera: camera_id }).await
}

#[derive(Deserialize)]
struct PositionBody {
    position: String,
}

async fn handle_set_position(
    State(state): State<Arc<AppState>>,
    Path(camera_id): Path<String>,
    Json(body): Json<PositionBody>,
) -> Response {
    relay(
        &state,
        ControlRequest::SetPosition { camera: camera_id, position: body.position },
    )
    .await
}

async fn handle_wifi_ap_enable(State(state): State<Arc<AppState>>) -> Response {
    relay(&state, ControlRequest::WifiApEnable).await
}

async fn handle_wifi_ap_disable(State(state): State<Arc<AppState>>) -> Response {
    relay(&state, ControlRequest::WifiApDisable).await
}

// ──────────────── update ────────────────────────────────────────────────

async fn handle_update_status(State(state): State<Arc<AppState>>) -> Response {
    match UpdateState::load_or_init(&state.update_state_path, state.version, state.config.read().updates.channel) {
        Ok(s) => Json(s).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

async fn handle_update_check(State(_state): State<Arc<AppState>>) -> Response {
    match tokio::process::Command::new("sai-cam-updater").arg("check").spawn() {
        Ok(_) => (StatusCode::ACCEPTED, Json(json!({ "status": "check started" }))).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

// ──────────────── fleet (bearer-guarded) ────────────────────────────────

async fn fleet_auth(State(state): State<Arc<AppState>>, headers: HeaderMap, req: axum::extract::Request, next: Next) -> Response {
    let token = state.config.read().fleet.token.clone();
    if token.is_empty() {
        return (StatusCode::FORBIDDEN, Json(json!({ "error": "fleet control disabled: no token configured" }))).into_response();
    }

    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(p) if p == token => next.run(req).await,
        _ => (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid or missing bearer token" }))).into_response(),
    }
}

#[derive(Deserialize)]
struct FleetConfigUpdate {
    #[serde(flatten)]
    values: std::collections::HashMap<String, serde_json::Value>,
}

async fn handle_fleet_config(State(state): State<Arc<AppState>>, Json(body): Json<FleetConfigUpdate>) -> Response {
    let allowed: Vec<String> = state.config.read().fleet.allowed_config_keys.clone();
    let mut rejected = Vec::new();
    let mut applied = Vec::new();

    {
        let mut cfg = state.config.write();
        for (key, value) in body.values {
            if !allowed.contains(&key) {
                rejected.push(key);
                continue;
            }
            match key.as_str() {
                "logging.level" => {
                    if let Some(s) = value.as_str() {
                        cfg.logging.level = s.to_string();
                        applied.push(key);
                    }
                }
                "server.url" => {
                    if let Some(s) = value.as_str() {
                        cfg.server.url = s.to_string();
                        applied.push(key);
                    }
                }
                "monitoring.health_check_interval_secs" => {
                    if let Some(n) = value.as_u64() {
                        cfg.monitoring.health_check_interval_secs = n;
                        applied.push(key);
                    }
                }
                _ => rejected.push(key),
            }
        }
        if let Err(e) = cfg.save_to_file(&state.config_path) {
            error!(error = %e, "failed to persist fleet config update");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response();
        }
    }

    crate::portal::reload::signal_agent_reload();
    Json(json!({ "applied": applied, "rejected": rejected })).into_response()
}
