//! Health and service-info routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use repobox_core::ContainerService;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Response for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub total_containers: usize,
    pub active_containers: usize,
    pub runtime_available: bool,
}

pub async fn health(State(svc): State<Arc<ContainerService>>) -> Json<HealthResponse> {
    let stats = svc.stats().await;
    Json(HealthResponse {
        status: if stats.runtime_available {
            "healthy"
        } else {
            "degraded"
        },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: stats.uptime_secs,
        total_containers: stats.total_containers,
        active_containers: stats.active_containers,
        runtime_available: stats.runtime_available,
    })
}

/// Readiness gate: 503 until the container engine answers a ping.
pub async fn ready(State(svc): State<Arc<ContainerService>>) -> (StatusCode, Json<Value>) {
    if svc.runtime_available().await {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "reason": "container engine unreachable" })),
        )
    }
}

pub async fn live() -> Json<Value> {
    Json(json!({ "status": "alive" }))
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "service": "repobox",
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/info",
    }))
}

/// Static description of the API surface.
pub async fn info(State(svc): State<Arc<ContainerService>>) -> Json<Value> {
    let settings = svc.settings();
    Json(json!({
        "service": "repobox",
        "version": env!("CARGO_PKG_VERSION"),
        "base_image": settings.base_image,
        "workspace_dir": settings.workspace_dir,
        "default_exec_timeout_secs": settings.default_exec_timeout_secs,
        "max_exec_timeout_secs": settings.max_exec_timeout_secs,
        "max_file_bytes": settings.max_file_bytes,
        "endpoints": {
            "create": "POST /containers",
            "list": "GET /containers",
            "get": "GET /containers/{id}",
            "delete": "DELETE /containers/{id}",
            "execute": "POST /containers/{id}/execute",
            "browse": "GET /containers/{id}/browse?path=",
            "read_file": "GET /containers/{id}/files?file_path=",
            "health": "GET /health",
        },
    }))
}
