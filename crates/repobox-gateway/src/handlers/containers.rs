//! Container lifecycle, execution, and filesystem routes.

use crate::error::ApiError;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use repobox_core::{
    CommandOutcome, ContainerService, ContainerView, CreateRequest, DirEntry,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Body for `POST /containers`. Mirrors [`CreateRequest`] field for field.
pub type CreateContainerRequest = CreateRequest;

/// Body for `POST /containers/{id}/execute`.
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    /// Shell command to run inside the sandbox.
    pub command: String,

    /// Directory to run in; defaults to the sandbox workspace.
    pub working_directory: Option<String>,

    /// Deadline in seconds; clamped to the configured maximum.
    pub timeout_secs: Option<u64>,
}

/// Response for `GET /containers`.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub containers: Vec<ContainerView>,
    pub total_count: usize,
    pub active_count: usize,
}

/// Query for `GET /containers/{id}/browse`.
#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    /// Workspace-relative (or absolute in-workspace) directory path.
    #[serde(default)]
    pub path: String,
}

/// Response for `GET /containers/{id}/browse`.
#[derive(Debug, Serialize)]
pub struct BrowseResponse {
    pub path: String,
    pub items: Vec<DirEntry>,
    pub total_items: usize,
}

/// Query for `GET /containers/{id}/files`.
#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub file_path: String,
}

/// Response for `GET /containers/{id}/files`.
#[derive(Debug, Serialize)]
pub struct FileContentResponse {
    pub path: String,

    /// File content decoded as UTF-8, lossily for binary files.
    pub content: String,

    pub size: u64,

    /// Whether the raw bytes were not valid UTF-8.
    pub is_binary: bool,
}

pub async fn create(
    State(svc): State<Arc<ContainerService>>,
    Json(req): Json<CreateContainerRequest>,
) -> Result<(StatusCode, Json<ContainerView>), ApiError> {
    info!("Create request for {}", req.repo_url);
    let record = svc.create(req).await?;
    Ok((StatusCode::CREATED, Json(ContainerView::from(&record))))
}

pub async fn list(
    State(svc): State<Arc<ContainerService>>,
) -> Json<ListResponse> {
    let records = svc.list();
    let active_count = records
        .iter()
        .filter(|r| r.status == repobox_core::ContainerStatus::Running)
        .count();
    let containers: Vec<ContainerView> = records.iter().map(ContainerView::from).collect();
    Json(ListResponse {
        total_count: containers.len(),
        active_count,
        containers,
    })
}

pub async fn get(
    State(svc): State<Arc<ContainerService>>,
    Path(id): Path<String>,
) -> Result<Json<ContainerView>, ApiError> {
    let record = svc.get(&id).await?;
    Ok(Json(ContainerView::from(&record)))
}

pub async fn delete(
    State(svc): State<Arc<ContainerService>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    svc.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn execute(
    State(svc): State<Arc<ContainerService>>,
    Path(id): Path<String>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<CommandOutcome>, ApiError> {
    let outcome = svc
        .execute(&id, &req.command, req.working_directory, req.timeout_secs)
        .await?;
    Ok(Json(outcome))
}

pub async fn browse(
    State(svc): State<Arc<ContainerService>>,
    Path(id): Path<String>,
    Query(query): Query<BrowseQuery>,
) -> Result<Json<BrowseResponse>, ApiError> {
    let (path, items) = svc.browse(&id, &query.path).await?;
    Ok(Json(BrowseResponse {
        path,
        total_items: items.len(),
        items,
    }))
}

pub async fn read_file(
    State(svc): State<Arc<ContainerService>>,
    Path(id): Path<String>,
    Query(query): Query<FileQuery>,
) -> Result<Json<FileContentResponse>, ApiError> {
    let file = svc.read_file(&id, &query.file_path).await?;
    let is_binary = std::str::from_utf8(&file.bytes).is_err();
    Ok(Json(FileContentResponse {
        path: file.path,
        content: String::from_utf8_lossy(&file.bytes).into_owned(),
        size: file.size,
        is_binary,
    }))
}
