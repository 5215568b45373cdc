use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use super::AppState;
use crate::db::SearchResults;
use crate::error::Error;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResults>, Error> {
    let needle = params.q.unwrap_or_default();
    let needle = needle.trim();
    if needle.is_empty() {
        return Err(Error::InvalidArgument("q is required".into()));
    }
    Ok(Json(state.db.search(needle)?))
}
