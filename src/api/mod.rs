mod health;
mod intel;
mod portfolio;
mod projects;
mod search;
mod stocks;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::cache::PriceCache;
use crate::config::Config;
use crate::db::Database;
use crate::error::Error;
use crate::workflow::{ListingCache, LogInvalidator};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub prices: Arc<PriceCache>,
    pub listing_cache: Arc<dyn ListingCache>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        Self {
            db,
            config: Arc::new(config),
            prices: Arc::new(PriceCache::with_default_ttl()),
            listing_cache: Arc::new(LogInvalidator),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_listing_cache(mut self, cache: Arc<dyn ListingCache>) -> Self {
        self.listing_cache = cache;
        self
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::liveness))
        .route("/api/health-check", post(health::run_checks))
        .route("/api/auth/login", post(login))
        .route("/api/phase", post(projects::change_phase))
        .route("/api/projects", get(projects::list).post(projects::create))
        .route("/api/projects/{id}", get(projects::detail).patch(projects::update))
        .route("/api/projects/{id}/health", get(health::project_history))
        .route("/api/checklist/{id}", patch(projects::update_checklist))
        .route("/api/activity", get(projects::activity))
        .route(
            "/api/stocks/research",
            get(stocks::list_active_jobs).post(stocks::request_research),
        )
        .route(
            "/api/stocks/research/{job_id}",
            get(stocks::get_job).patch(stocks::patch_job),
        )
        .route("/api/stocks/reports", get(stocks::list_reports).post(stocks::create_report))
        .route("/api/stocks/reports/{id}", get(stocks::get_report))
        .route("/api/stocks/scans", get(stocks::list_scans).post(stocks::create_scan))
        .route("/api/stocks/price/{ticker}", get(stocks::price))
        .route("/api/watchlist", get(stocks::list_watchlist).post(stocks::add_watchlist))
        .route("/api/watchlist/{ticker}", delete(stocks::remove_watchlist))
        .route(
            "/api/portfolio/holdings",
            get(portfolio::list_holdings).post(portfolio::create_holding),
        )
        .route(
            "/api/portfolio/holdings/{id}",
            patch(portfolio::update_holding).delete(portfolio::delete_holding),
        )
        .route(
            "/api/portfolio/reports",
            get(portfolio::list_reports).post(portfolio::create_report),
        )
        .route("/api/themes", get(intel::list_themes).post(intel::create_theme))
        .route("/api/analysts", get(intel::list_analysts).post(intel::create_analyst))
        .route("/api/analysts/{id}/calls", post(intel::create_call))
        .route("/api/macro", get(intel::list_macro).post(intel::create_macro))
        .route("/api/comments", get(intel::list_comments).post(intel::create_comment))
        .route("/api/search", get(search::search))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> Result<Response, Error> {
    let Some(expected) = state.config.password.as_deref() else {
        return Err(Error::Unauthorized);
    };
    if body.password != expected {
        return Err(Error::Unauthorized);
    }
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        auth::SESSION_COOKIE,
        auth::sign_session(&state.config.session_secret)
    );
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "ok": true })),
    )
        .into_response())
}

fn require_auth(headers: &HeaderMap, state: &AppState) -> Result<(), Error> {
    auth::require_auth(headers, &state.config)
}

fn require_api_key(headers: &HeaderMap, state: &AppState) -> Result<(), Error> {
    auth::require_api_key(headers, &state.config)
}
