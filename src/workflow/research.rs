//! Research job lifecycle.
//!
//! A job tracks one ticker → report request through
//! `pending → processing → complete | failed`. External agents patch
//! progress through the API; the lifecycle edges are enforced here, a job in
//! a terminal state accepts no further writes, and any status change
//! notifies the listing-cache hook so stale page renders get dropped.

use anyhow::Context;
use chrono::Utc;

use crate::db::Database;
use crate::error::Error;
use crate::models::{JobStatus, ResearchJob, UpdateJobInput};

const TICKER_MAX_LEN: usize = 10;

/// Invalidation hook for externally cached renderings of the research
/// listing. The production impl just logs; tests count invocations.
pub trait ListingCache: Send + Sync {
    fn invalidate(&self);
}

pub struct LogInvalidator;

impl ListingCache for LogInvalidator {
    fn invalidate(&self) {
        tracing::debug!("research listing cache invalidated");
    }
}

/// Uppercases and validates a ticker: 1–10 chars from [A-Z0-9.].
pub fn normalize_ticker(raw: &str) -> Result<String, Error> {
    let ticker = raw.trim().to_uppercase();
    let valid = !ticker.is_empty()
        && ticker.len() <= TICKER_MAX_LEN
        && ticker.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.');
    if valid {
        Ok(ticker)
    } else {
        Err(Error::InvalidArgument(format!("invalid ticker: {raw:?}")))
    }
}

pub fn create_job(db: &Database, raw_ticker: &str) -> Result<ResearchJob, Error> {
    let ticker = normalize_ticker(raw_ticker)?;
    let now = Utc::now();
    let job = ResearchJob {
        id: format!("research-{}-{}", ticker, now.timestamp_millis()),
        ticker,
        status: JobStatus::Pending,
        progress: 0,
        error_message: None,
        report_id: None,
        created_at: now,
        updated_at: now,
    };
    db.insert_job(&job)?;
    tracing::info!(job_id = %job.id, "research job created");
    Ok(job)
}

pub fn get_job(db: &Database, job_id: &str) -> Result<ResearchJob, Error> {
    db.get_job(job_id)?
        .ok_or_else(|| Error::NotFound(format!("job {job_id}")))
}

pub fn list_active_jobs(db: &Database) -> Result<Vec<ResearchJob>, Error> {
    Ok(db.list_active_jobs()?)
}

pub fn update_job(
    db: &Database,
    listing_cache: &dyn ListingCache,
    job_id: &str,
    patch: UpdateJobInput,
) -> Result<ResearchJob, Error> {
    if patch.is_empty() {
        return Err(Error::InvalidArgument("no fields to update".into()));
    }
    if let Some(progress) = patch.progress {
        if !(0..=100).contains(&progress) {
            return Err(Error::InvalidArgument(format!(
                "progress must be within 0-100, got {progress}"
            )));
        }
    }

    let job = get_job(db, job_id)?;
    if job.status.is_terminal() {
        return Err(Error::InvalidArgument(format!(
            "job is {} and can no longer be updated",
            job.status.as_str()
        )));
    }
    if let Some(next) = patch.status {
        if next != job.status && !job.status.can_transition_to(next) {
            return Err(Error::InvalidArgument(format!(
                "illegal status transition: {} -> {}",
                job.status.as_str(),
                next.as_str()
            )));
        }
    }
    if let Some(report_id) = patch.report_id {
        if db.get_report(report_id)?.is_none() {
            return Err(Error::InvalidArgument(format!(
                "unknown report id: {report_id}"
            )));
        }
    }

    db.update_job_fields(job_id, &patch, Utc::now())?;

    if matches!(patch.status, Some(next) if next != job.status) {
        listing_cache.invalidate();
    }

    let updated = db
        .get_job(job_id)?
        .context("job disappeared mid-update")?;
    Ok(updated)
}
