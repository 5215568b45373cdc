//! Mission control dashboard server.
//!
//! Projects move through a build/live phase workflow that fans out checklist
//! templates; stock research runs as tracked jobs external agents report
//! progress against. Everything persists to SQLite and is exposed as JSON
//! endpoints under `/api`.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod query;
pub mod workflow;

pub use config::Config;
pub use db::Database;
pub use error::Error;
