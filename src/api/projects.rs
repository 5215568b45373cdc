use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{require_auth, AppState};
use crate::error::Error;
use crate::models::*;
use crate::query::Filter;
use crate::workflow;

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Project>>, Error> {
    Ok(Json(state.db.list_projects()?))
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateProjectInput>,
) -> Result<Json<Project>, Error> {
    require_auth(&headers, &state)?;
    if input.name.trim().is_empty() {
        return Err(Error::InvalidArgument("name must not be empty".into()));
    }
    state
        .db
        .create_project(input)?
        .map(Json)
        .ok_or_else(|| Error::Conflict("project name already exists".into()))
}

pub async fn detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ProjectWithChecklist>, Error> {
    let project = state
        .db
        .get_project(id)?
        .ok_or_else(|| Error::NotFound(format!("project {id}")))?;
    let checklist = state.db.checklist_for_project(id)?;
    Ok(Json(ProjectWithChecklist { project, checklist }))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(input): Json<UpdateProjectInput>,
) -> Result<Json<Project>, Error> {
    require_auth(&headers, &state)?;
    let empty = input.name.is_none()
        && input.status.is_none()
        && input.repo_url.is_none()
        && input.deploy_url.is_none()
        && input.test_count.is_none()
        && input.build_status.is_none();
    if empty {
        return Err(Error::InvalidArgument("no fields to update".into()));
    }
    if !state.db.update_project(id, input)? {
        return Err(Error::NotFound(format!("project {id}")));
    }
    let project = state
        .db
        .get_project(id)?
        .ok_or_else(|| Error::NotFound(format!("project {id}")))?;
    Ok(Json(project))
}

#[derive(Debug, Deserialize)]
pub struct PhaseBody {
    pub project_id: Option<i64>,
    pub phase: Option<String>,
}

pub async fn change_phase(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PhaseBody>,
) -> Result<Json<Value>, Error> {
    require_auth(&headers, &state)?;
    let project_id = body
        .project_id
        .ok_or_else(|| Error::InvalidArgument("project_id is required".into()))?;
    let raw_phase = body
        .phase
        .ok_or_else(|| Error::InvalidArgument("phase is required".into()))?;
    let phase = Phase::from_str(&raw_phase)
        .ok_or_else(|| Error::InvalidArgument(format!("invalid phase: {raw_phase:?}")))?;

    let result = workflow::transition_phase(&state.db, project_id, phase)?;
    let mut payload = json!({
        "ok": true,
        "project": result.project,
        "checklist_items_created": result.checklist_items_created,
    });
    if !result.checklist_errors.is_empty() {
        payload["checklist_errors"] = json!(result.checklist_errors);
    }
    Ok(Json(payload))
}

pub async fn update_checklist(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(input): Json<UpdateChecklistInput>,
) -> Result<Json<ChecklistEntry>, Error> {
    require_auth(&headers, &state)?;
    if input.completed.is_none() && input.notes.is_none() {
        return Err(Error::InvalidArgument("no fields to update".into()));
    }
    state
        .db
        .update_checklist_progress(id, input, Utc::now())?
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("checklist entry {id}")))
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub project_id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

pub async fn activity(
    State(state): State<AppState>,
    Query(params): Query<ActivityQuery>,
) -> Result<Json<Vec<Activity>>, Error> {
    let mut filter = Filter::new();
    if let Some(project_id) = params.project_id {
        filter = filter.eq("project_id", project_id);
    }
    if let Some(kind) = params.kind {
        filter = filter.eq("type", kind);
    }
    if let Some(since) = params.since {
        filter = filter.since("created_at", since);
    }
    if let Some(until) = params.until {
        filter = filter.until("created_at", until);
    }
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    Ok(Json(state.db.list_activity(&filter, limit)?))
}
