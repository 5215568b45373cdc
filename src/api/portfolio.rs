use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use super::{require_auth, AppState};
use crate::error::Error;
use crate::models::*;
use crate::workflow::research::normalize_ticker;

pub async fn list_holdings(
    State(state): State<AppState>,
) -> Result<Json<Vec<PortfolioHolding>>, Error> {
    Ok(Json(state.db.list_holdings()?))
}

pub async fn create_holding(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut input): Json<CreateHoldingInput>,
) -> Result<Json<PortfolioHolding>, Error> {
    require_auth(&headers, &state)?;
    input.ticker = normalize_ticker(&input.ticker)?;
    if input.shares <= 0.0 {
        return Err(Error::InvalidArgument("shares must be positive".into()));
    }
    Ok(Json(state.db.create_holding(input)?))
}

pub async fn update_holding(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(input): Json<UpdateHoldingInput>,
) -> Result<Json<Value>, Error> {
    require_auth(&headers, &state)?;
    if input.shares.is_none() && input.cost_basis.is_none() && input.account.is_none() {
        return Err(Error::InvalidArgument("no fields to update".into()));
    }
    if matches!(input.shares, Some(s) if s <= 0.0) {
        return Err(Error::InvalidArgument("shares must be positive".into()));
    }
    if !state.db.update_holding(id, input)? {
        return Err(Error::NotFound(format!("holding {id}")));
    }
    Ok(Json(json!({ "ok": true })))
}

pub async fn delete_holding(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Value>, Error> {
    require_auth(&headers, &state)?;
    if !state.db.delete_holding(id)? {
        return Err(Error::NotFound(format!("holding {id}")));
    }
    Ok(Json(json!({ "ok": true })))
}

pub async fn list_reports(
    State(state): State<AppState>,
) -> Result<Json<Vec<PortfolioReport>>, Error> {
    Ok(Json(state.db.list_portfolio_reports()?))
}

pub async fn create_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreatePortfolioReportInput>,
) -> Result<Json<PortfolioReport>, Error> {
    require_auth(&headers, &state)?;
    Ok(Json(state.db.create_portfolio_report(input)?))
}
