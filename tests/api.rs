use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::header::{HeaderName, HeaderValue, COOKIE, SET_COOKIE};
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};

use mission_control::api::{create_router, AppState};
use mission_control::models::Phase;
use mission_control::workflow::ListingCache;
use mission_control::{Config, Database};

const API_KEY: &str = "test-agent-key";

#[derive(Default)]
struct CountingCache(AtomicUsize);

impl ListingCache for CountingCache {
    fn invalidate(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn test_config() -> Config {
    Config {
        api_key: Some(API_KEY.into()),
        session_secret: "test-secret".into(),
        password: Some("hunter2".into()),
        db_path: None,
    }
}

fn server_with_db() -> (TestServer, Database) {
    let db = Database::open_in_memory().unwrap();
    db.migrate().unwrap();
    let state = AppState::new(db.clone(), test_config());
    (TestServer::new(create_router(state)).unwrap(), db)
}

fn api_key_header() -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-api-key"),
        HeaderValue::from_static(API_KEY),
    )
}

async fn create_project(server: &TestServer, name: &str) -> i64 {
    let (header, value) = api_key_header();
    let res = server
        .post("/api/projects")
        .add_header(header, value)
        .json(&json!({ "name": name }))
        .await;
    res.assert_status_ok();
    res.json::<Value>()["id"].as_i64().unwrap()
}

#[tokio::test]
async fn phase_transition_end_to_end() {
    let (server, db) = server_with_db();
    let project_id = create_project(&server, "atlas").await;
    db.create_checklist_item(Phase::Live, "set up monitoring").unwrap();
    db.create_checklist_item(Phase::Live, "announce launch").unwrap();

    let (header, value) = api_key_header();
    let res = server
        .post("/api/phase")
        .add_header(header, value)
        .json(&json!({ "project_id": project_id, "phase": "live" }))
        .await;
    res.assert_status_ok();
    let body: Value = res.json();
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["checklist_items_created"], json!(2));
    assert_eq!(body["project"]["phase"], json!("live"));

    let detail: Value = server
        .get(&format!("/api/projects/{project_id}"))
        .await
        .json();
    assert_eq!(detail["phase"], json!("live"));
    assert_eq!(detail["checklist"].as_array().unwrap().len(), 2);

    let activity: Value = server
        .get(&format!("/api/activity?project_id={project_id}&type=phase_change"))
        .await
        .json();
    assert_eq!(activity.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn phase_endpoint_error_mapping() {
    let (server, _db) = server_with_db();
    let project_id = create_project(&server, "atlas").await;

    // no credentials
    server
        .post("/api/phase")
        .json(&json!({ "project_id": project_id, "phase": "live" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    // invalid phase value
    let (header, value) = api_key_header();
    let res = server
        .post("/api/phase")
        .add_header(header, value)
        .json(&json!({ "project_id": project_id, "phase": "launch" }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert!(res.json::<Value>()["error"].as_str().unwrap().contains("phase"));

    // missing fields
    let (header, value) = api_key_header();
    server
        .post("/api/phase")
        .add_header(header, value)
        .json(&json!({ "phase": "live" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    // unknown project
    let (header, value) = api_key_header();
    server
        .post("/api/phase")
        .add_header(header, value)
        .json(&json!({ "project_id": 999, "phase": "live" }))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn research_job_lifecycle_over_http() {
    let db = Database::open_in_memory().unwrap();
    db.migrate().unwrap();
    let cache = Arc::new(CountingCache::default());
    let state = AppState::new(db, test_config()).with_listing_cache(cache.clone());
    let server = TestServer::new(create_router(state)).unwrap();

    let res = server
        .post("/api/stocks/research")
        .json(&json!({ "ticker": "aapl" }))
        .await;
    res.assert_status_ok();
    let body: Value = res.json();
    assert_eq!(body["ticker"], json!("AAPL"));
    assert_eq!(body["status"], json!("queued"));
    let job_id = body["jobId"].as_str().unwrap().to_string();
    assert!(job_id.starts_with("research-AAPL-"));

    // unauthenticated progress report
    server
        .patch(&format!("/api/stocks/research/{job_id}"))
        .json(&json!({ "status": "processing" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    // empty patch
    let (header, value) = api_key_header();
    server
        .patch(&format!("/api/stocks/research/{job_id}"))
        .add_header(header, value)
        .json(&json!({}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    // legal transition
    let (header, value) = api_key_header();
    let res = server
        .patch(&format!("/api/stocks/research/{job_id}"))
        .add_header(header, value)
        .json(&json!({ "status": "processing", "progress": 25 }))
        .await;
    res.assert_status_ok();
    assert_eq!(res.json::<Value>()["job"]["status"], json!("processing"));
    assert_eq!(cache.0.load(Ordering::SeqCst), 1);

    // active listing shows the job
    let listing: Value = server.get("/api/stocks/research").await.json();
    assert_eq!(listing["jobs"].as_array().unwrap().len(), 1);

    // illegal backwards transition
    let (header, value) = api_key_header();
    server
        .patch(&format!("/api/stocks/research/{job_id}"))
        .add_header(header, value)
        .json(&json!({ "status": "pending" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    // report_id must reference a stored report
    let (header, value) = api_key_header();
    server
        .patch(&format!("/api/stocks/research/{job_id}"))
        .add_header(header, value)
        .json(&json!({ "report_id": "00000000-0000-0000-0000-000000000000" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let job: Value = server
        .get(&format!("/api/stocks/research/{job_id}"))
        .await
        .json();
    assert_eq!(job["job"]["status"], json!("processing"));
    assert_eq!(job["job"]["progress"], json!(25));
}

#[tokio::test]
async fn research_edge_cases() {
    let (server, _db) = server_with_db();

    let res = server
        .post("/api/stocks/research")
        .json(&json!({ "ticker": "bad ticker!" }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);

    server
        .get("/api/stocks/research/research-ZZZ-0")
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let listing: Value = server.get("/api/stocks/research").await.json();
    assert!(listing["jobs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn watchlist_conflict_maps_to_409() {
    let (server, _db) = server_with_db();

    let (header, value) = api_key_header();
    server
        .post("/api/watchlist")
        .add_header(header, value)
        .json(&json!({ "ticker": "nvda" }))
        .await
        .assert_status_ok();

    let (header, value) = api_key_header();
    let res = server
        .post("/api/watchlist")
        .add_header(header, value)
        .json(&json!({ "ticker": "NVDA" }))
        .await;
    res.assert_status(StatusCode::CONFLICT);

    let items: Value = server.get("/api/watchlist").await.json();
    assert_eq!(items.as_array().unwrap().len(), 1);
    assert_eq!(items[0]["ticker"], json!("NVDA"));
}

#[tokio::test]
async fn session_cookie_grants_mutation_access() {
    let (server, _db) = server_with_db();

    server
        .post("/api/auth/login")
        .json(&json!({ "password": "wrong" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let res = server
        .post("/api/auth/login")
        .json(&json!({ "password": "hunter2" }))
        .await;
    res.assert_status_ok();
    let set_cookie = res
        .headers()
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    let cookie = set_cookie.split(';').next().unwrap().to_string();

    let res = server
        .post("/api/watchlist")
        .add_header(COOKIE, HeaderValue::from_str(&cookie).unwrap())
        .json(&json!({ "ticker": "MSFT" }))
        .await;
    res.assert_status_ok();

    // but the agent-only research patch gate rejects sessions
    let create: Value = server
        .post("/api/stocks/research")
        .json(&json!({ "ticker": "MSFT" }))
        .await
        .json();
    let job_id = create["jobId"].as_str().unwrap();
    server
        .patch(&format!("/api/stocks/research/{job_id}"))
        .add_header(COOKIE, HeaderValue::from_str(&cookie).unwrap())
        .json(&json!({ "status": "processing" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn aggregate_search_caps_categories() {
    let (server, db) = server_with_db();
    for i in 0..7 {
        create_project(&server, &format!("gateway-{i}")).await;
    }
    db.add_watchlist(mission_control::models::AddWatchlistInput {
        ticker: "GTWY".into(),
        notes: Some("gateway play".into()),
    })
    .unwrap();

    server.get("/api/search").await.assert_status(StatusCode::BAD_REQUEST);

    let results: Value = server.get("/api/search?q=gateway").await.json();
    assert_eq!(results["projects"].as_array().unwrap().len(), 5);
    assert_eq!(results["watchlist"].as_array().unwrap().len(), 1);
    assert!(results["reports"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn health_liveness() {
    let (server, _db) = server_with_db();
    let res = server.get("/api/health").await;
    res.assert_status_ok();
    assert_eq!(res.json::<Value>()["ok"], json!(true));
}

#[tokio::test]
async fn project_crud_and_checklist_toggle() {
    let (server, db) = server_with_db();
    let project_id = create_project(&server, "atlas").await;

    // duplicate name
    let (header, value) = api_key_header();
    server
        .post("/api/projects")
        .add_header(header, value)
        .json(&json!({ "name": "atlas" }))
        .await
        .assert_status(StatusCode::CONFLICT);

    let (header, value) = api_key_header();
    let res = server
        .patch(&format!("/api/projects/{project_id}"))
        .add_header(header, value)
        .json(&json!({ "status": "in_progress", "test_count": 42 }))
        .await;
    res.assert_status_ok();
    let body: Value = res.json();
    assert_eq!(body["status"], json!("in_progress"));
    assert_eq!(body["test_count"], json!(42));

    // instantiate a checklist row, then toggle it complete
    db.create_checklist_item(Phase::Live, "set up monitoring").unwrap();
    let (header, value) = api_key_header();
    server
        .post("/api/phase")
        .add_header(header, value)
        .json(&json!({ "project_id": project_id, "phase": "live" }))
        .await
        .assert_status_ok();

    let detail: Value = server
        .get(&format!("/api/projects/{project_id}"))
        .await
        .json();
    let entry_id = detail["checklist"][0]["id"].as_i64().unwrap();

    let (header, value) = api_key_header();
    let res = server
        .patch(&format!("/api/checklist/{entry_id}"))
        .add_header(header, value)
        .json(&json!({ "completed": true, "notes": "grafana dashboard up" }))
        .await;
    res.assert_status_ok();
    let entry: Value = res.json();
    assert_eq!(entry["completed"], json!(true));
    assert!(entry["completed_at"].is_string());
}
