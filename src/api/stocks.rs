use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{require_api_key, require_auth, AppState};
use crate::cache::Quote;
use crate::error::Error;
use crate::models::*;
use crate::workflow;
use crate::workflow::research::normalize_ticker;

// ── Research jobs ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ResearchBody {
    pub ticker: Option<String>,
}

pub async fn request_research(
    State(state): State<AppState>,
    Json(body): Json<ResearchBody>,
) -> Result<Json<Value>, Error> {
    let ticker = body
        .ticker
        .ok_or_else(|| Error::InvalidArgument("ticker is required".into()))?;
    let job = workflow::create_job(&state.db, &ticker)?;
    Ok(Json(json!({
        "jobId": job.id,
        "ticker": job.ticker,
        "status": "queued",
        "message": format!("Research for {} queued", job.ticker),
    })))
}

pub async fn list_active_jobs(
    State(state): State<AppState>,
) -> Result<Json<Value>, Error> {
    let jobs = workflow::list_active_jobs(&state.db)?;
    Ok(Json(json!({ "jobs": jobs })))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, Error> {
    let job = workflow::get_job(&state.db, &job_id)?;
    Ok(Json(json!({ "job": job })))
}

#[derive(Debug, Deserialize)]
pub struct JobPatchBody {
    pub status: Option<String>,
    pub progress: Option<i64>,
    pub error_message: Option<String>,
    pub report_id: Option<Uuid>,
}

pub async fn patch_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<JobPatchBody>,
) -> Result<Json<Value>, Error> {
    require_api_key(&headers, &state)?;
    let status = body
        .status
        .map(|raw| {
            JobStatus::from_str(&raw)
                .ok_or_else(|| Error::InvalidArgument(format!("invalid status: {raw:?}")))
        })
        .transpose()?;
    let patch = UpdateJobInput {
        status,
        progress: body.progress,
        error_message: body.error_message,
        report_id: body.report_id,
    };
    let job = workflow::update_job(&state.db, state.listing_cache.as_ref(), &job_id, patch)?;
    Ok(Json(json!({ "job": job })))
}

// ── Reports & scans ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub ticker: Option<String>,
}

pub async fn list_reports(
    State(state): State<AppState>,
    Query(params): Query<ReportQuery>,
) -> Result<Json<Vec<StockReport>>, Error> {
    Ok(Json(state.db.list_reports(params.ticker.as_deref())?))
}

pub async fn create_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut input): Json<CreateReportInput>,
) -> Result<Json<StockReport>, Error> {
    require_auth(&headers, &state)?;
    input.ticker = normalize_ticker(&input.ticker)?;
    Ok(Json(state.db.create_report(input)?))
}

pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StockReport>, Error> {
    state
        .db
        .get_report(id)?
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("report {id}")))
}

pub async fn list_scans(State(state): State<AppState>) -> Result<Json<Vec<StockScan>>, Error> {
    Ok(Json(state.db.list_scans()?))
}

pub async fn create_scan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateScanInput>,
) -> Result<Json<StockScan>, Error> {
    require_auth(&headers, &state)?;
    Ok(Json(state.db.create_scan(input)?))
}

// ── Watchlist ─────────────────────────────────────────────────────────

pub async fn list_watchlist(
    State(state): State<AppState>,
) -> Result<Json<Vec<WatchlistItem>>, Error> {
    Ok(Json(state.db.list_watchlist()?))
}

pub async fn add_watchlist(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut input): Json<AddWatchlistInput>,
) -> Result<Json<WatchlistItem>, Error> {
    require_auth(&headers, &state)?;
    input.ticker = normalize_ticker(&input.ticker)?;
    state
        .db
        .add_watchlist(input)?
        .map(Json)
        .ok_or_else(|| Error::Conflict("ticker already on watchlist".into()))
}

pub async fn remove_watchlist(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, Error> {
    require_auth(&headers, &state)?;
    let ticker = normalize_ticker(&ticker)?;
    if !state.db.remove_watchlist(&ticker)? {
        return Err(Error::NotFound(format!("watchlist ticker {ticker}")));
    }
    Ok(Json(json!({ "ok": true })))
}

// ── Prices ────────────────────────────────────────────────────────────

pub async fn price(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Quote>, Error> {
    let ticker = normalize_ticker(&ticker)?;
    let now = Utc::now();
    if let Some(quote) = state.prices.get(&ticker, now) {
        return Ok(Json(quote));
    }
    let quote = fetch_quote(&state.http, &ticker).await?;
    state.prices.set(quote.clone(), now);
    Ok(Json(quote))
}

async fn fetch_quote(http: &reqwest::Client, ticker: &str) -> Result<Quote, Error> {
    let url = format!("https://query1.finance.yahoo.com/v8/finance/chart/{ticker}");
    let body: Value = http
        .get(&url)
        .timeout(std::time::Duration::from_secs(10))
        .send()
        .await
        .context("quote fetch failed")?
        .error_for_status()
        .context("quote vendor returned an error")?
        .json()
        .await
        .context("quote response was not JSON")?;

    let meta = &body["chart"]["result"][0]["meta"];
    let price = meta["regularMarketPrice"]
        .as_f64()
        .with_context(|| format!("no price in quote response for {ticker}"))?;
    Ok(Quote {
        ticker: ticker.to_string(),
        price,
        currency: meta["currency"].as_str().map(String::from),
        as_of: Utc::now(),
    })
}
