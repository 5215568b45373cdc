use std::time::{Duration, Instant};

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{require_auth, AppState};
use crate::error::Error;
use crate::models::HealthCheck;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn liveness() -> Json<Value> {
    Json(json!({ "ok": true, "version": env!("CARGO_PKG_VERSION") }))
}

/// Probes every project's deploy URL and records one health_checks row per
/// project. Probe failures become a status-0 row, never an error response.
pub async fn run_checks(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, Error> {
    require_auth(&headers, &state)?;
    let projects = state.db.projects_with_deploy_url()?;
    let mut checks: Vec<HealthCheck> = Vec::with_capacity(projects.len());
    for project in projects {
        let Some(url) = project.deploy_url.as_deref() else {
            continue;
        };
        let started = Instant::now();
        let status_code = match state
            .http
            .get(url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().as_u16() as i64,
            Err(e) => {
                tracing::warn!(project = %project.name, "health probe failed: {}", e);
                0
            }
        };
        let latency_ms = started.elapsed().as_millis() as i64;
        let check = state.db.record_health_check(
            project.id,
            status_code,
            Some(latency_ms),
            Utc::now(),
        )?;
        checks.push(check);
    }
    Ok(Json(json!({ "ok": true, "checks": checks })))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

pub async fn project_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<HealthCheck>>, Error> {
    if state.db.get_project(id)?.is_none() {
        return Err(Error::NotFound(format!("project {id}")));
    }
    let limit = params.limit.unwrap_or(20).clamp(1, 200);
    Ok(Json(state.db.list_health_checks(id, limit)?))
}
