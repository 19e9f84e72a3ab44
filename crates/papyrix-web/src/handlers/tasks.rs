//! Task submission and polling.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use papyrix_acquisition::{AcquisitionJob, Task, YearRange};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::SharedState;

// ── Request / response bodies ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchTaskRequest {
    pub topic: String,
    /// Defaults to `[search] default_cycles`.
    pub cycles: Option<usize>,
    pub target: usize,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct DoiTaskRequest {
    pub dois: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreated {
    pub task_id: Uuid,
}

// ── Handlers ──────────────────────────────────────────────────────────────────

pub async fn create_search_task(
    State(state): State<SharedState>,
    Json(req): Json<SearchTaskRequest>,
) -> Result<(StatusCode, Json<TaskCreated>), ApiError> {
    let range = YearRange::new(req.year_from, req.year_to);
    let job = AcquisitionJob::Topic {
        topic: req.topic.trim().to_string(),
        cycles: req.cycles.unwrap_or(state.pipeline.settings().default_cycles),
        target: req.target,
        year_range: (!range.is_open()).then_some(range),
    };
    let task_id = state.pipeline.submit(job)?;
    info!(%task_id, topic = %req.topic, target = req.target, "Search task accepted");
    Ok((StatusCode::ACCEPTED, Json(TaskCreated { task_id })))
}

pub async fn create_doi_task(
    State(state): State<SharedState>,
    Json(req): Json<DoiTaskRequest>,
) -> Result<(StatusCode, Json<TaskCreated>), ApiError> {
    let count = req.dois.len();
    let task_id = state.pipeline.submit(AcquisitionJob::DoiList { dois: req.dois })?;
    info!(%task_id, dois = count, "DOI task accepted");
    Ok((StatusCode::ACCEPTED, Json(TaskCreated { task_id })))
}

pub async fn get_task(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, ApiError> {
    state
        .store
        .get(id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Task {id} not found")))
}
