use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use super::{require_auth, AppState};
use crate::error::Error;
use crate::models::*;

pub async fn list_themes(
    State(state): State<AppState>,
) -> Result<Json<Vec<ThemeWithStocks>>, Error> {
    Ok(Json(state.db.list_themes()?))
}

pub async fn create_theme(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateThemeInput>,
) -> Result<Json<ThemeWithStocks>, Error> {
    require_auth(&headers, &state)?;
    if input.name.trim().is_empty() {
        return Err(Error::InvalidArgument("name must not be empty".into()));
    }
    state
        .db
        .create_theme(input)?
        .map(Json)
        .ok_or_else(|| Error::Conflict("theme name already exists".into()))
}

pub async fn list_analysts(
    State(state): State<AppState>,
) -> Result<Json<Vec<AnalystWithCalls>>, Error> {
    Ok(Json(state.db.list_analysts()?))
}

pub async fn create_analyst(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateAnalystInput>,
) -> Result<Json<Analyst>, Error> {
    require_auth(&headers, &state)?;
    state
        .db
        .create_analyst(input)?
        .map(Json)
        .ok_or_else(|| Error::Conflict("analyst already exists".into()))
}

#[derive(Debug, Deserialize)]
pub struct CallBody {
    pub ticker: String,
    pub rating: Option<String>,
    pub price_target: Option<f64>,
    pub note: Option<String>,
}

pub async fn create_call(
    State(state): State<AppState>,
    Path(analyst_id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<CallBody>,
) -> Result<Json<AnalystCall>, Error> {
    require_auth(&headers, &state)?;
    let input = CreateCallInput {
        analyst_id,
        ticker: crate::workflow::research::normalize_ticker(&body.ticker)?,
        rating: body.rating,
        price_target: body.price_target,
        note: body.note,
    };
    state
        .db
        .create_call(input)?
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("analyst {analyst_id}")))
}

#[derive(Debug, Deserialize)]
pub struct MacroQuery {
    pub category: Option<String>,
}

pub async fn list_macro(
    State(state): State<AppState>,
    Query(params): Query<MacroQuery>,
) -> Result<Json<Vec<MacroInsight>>, Error> {
    Ok(Json(state.db.list_macro_insights(params.category.as_deref())?))
}

pub async fn create_macro(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateMacroInsightInput>,
) -> Result<Json<MacroInsight>, Error> {
    require_auth(&headers, &state)?;
    Ok(Json(state.db.create_macro_insight(input)?))
}

#[derive(Debug, Deserialize)]
pub struct CommentQuery {
    pub entity_type: String,
    pub entity_id: String,
}

pub async fn list_comments(
    State(state): State<AppState>,
    Query(params): Query<CommentQuery>,
) -> Result<Json<Vec<Comment>>, Error> {
    Ok(Json(state.db.list_comments(&params.entity_type, &params.entity_id)?))
}

pub async fn create_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateCommentInput>,
) -> Result<Json<Comment>, Error> {
    require_auth(&headers, &state)?;
    if input.body.trim().is_empty() {
        return Err(Error::InvalidArgument("comment body must not be empty".into()));
    }
    Ok(Json(state.db.create_comment(input)?))
}
