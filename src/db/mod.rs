mod schema;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde::Serialize;
use uuid::Uuid;

use crate::models::*;
use crate::query::Filter;

/// Handle to the mission-control database. Cheap to clone; all access goes
/// through a single connection behind a mutex.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("com", "rocket-tycoon", "mission-control")
            .context("could not determine data directory")?;
        std::fs::create_dir_all(dirs.data_dir())
            .with_context(|| format!("failed to create {}", dirs.data_dir().display()))?;
        Self::open(&dirs.data_dir().join("mission.db"))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("database lock poisoned: {}", e))
    }

    /// Creates all tables and normalizes legacy project phase values.
    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("failed to enable foreign keys")?;
        conn.execute_batch(schema::SCHEMA)
            .context("failed to create tables")?;
        conn.execute_batch(schema::PHASE_MIGRATION)
            .context("failed to normalize legacy phases")?;
        Ok(())
    }

    /// Escape hatch for tests that need to shape the store directly
    /// (legacy schemas, fault-injection triggers).
    #[cfg(test)]
    pub fn execute_batch_for_tests(&self, sql: &str) {
        self.lock().unwrap().execute_batch(sql).unwrap();
    }

    // ── Projects ──────────────────────────────────────────────────────

    /// Returns `None` when a project with the same name already exists.
    pub fn create_project(&self, input: CreateProjectInput) -> Result<Option<Project>> {
        let conn = self.lock()?;
        let now = Utc::now();
        match conn.execute(
            "INSERT INTO projects (name, status, phase, repo_url, deploy_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                input.name,
                input.status.unwrap_or(ProjectStatus::Backlog).as_str(),
                input.phase.unwrap_or(Phase::Build).as_str(),
                input.repo_url,
                input.deploy_url,
                ts(now),
                ts(now),
            ],
        ) {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Ok(None);
            }
            Err(e) => return Err(e).context("failed to insert project"),
        }
        let id = conn.last_insert_rowid();
        get_project_inner(&conn, id)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLS} FROM projects ORDER BY updated_at DESC"
        ))?;
        let rows = stmt.query_map([], project_from_row)?;
        collect(rows)
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let conn = self.lock()?;
        get_project_inner(&conn, id)
    }

    pub fn update_project(&self, id: i64, input: UpdateProjectInput) -> Result<bool> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(name) = input.name {
            sets.push("name = ?");
            values.push(Box::new(name));
        }
        if let Some(status) = input.status {
            sets.push("status = ?");
            values.push(Box::new(status.as_str()));
        }
        if let Some(repo_url) = input.repo_url {
            sets.push("repo_url = ?");
            values.push(Box::new(repo_url));
        }
        if let Some(deploy_url) = input.deploy_url {
            sets.push("deploy_url = ?");
            values.push(Box::new(deploy_url));
        }
        if let Some(test_count) = input.test_count {
            sets.push("test_count = ?");
            values.push(Box::new(test_count));
        }
        if let Some(build_status) = input.build_status {
            sets.push("build_status = ?");
            values.push(Box::new(build_status.as_str()));
        }
        if sets.is_empty() {
            return Ok(false);
        }
        sets.push("updated_at = ?");
        values.push(Box::new(ts(Utc::now())));
        values.push(Box::new(id));

        let sql = format!("UPDATE projects SET {} WHERE id = ?", sets.join(", "));
        let conn = self.lock()?;
        let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let changed = conn
            .execute(&sql, refs.as_slice())
            .context("failed to update project")?;
        Ok(changed > 0)
    }

    /// Returns the number of rows touched; zero means the project id does
    /// not exist and the caller should report not-found.
    pub fn set_project_phase(&self, id: i64, phase: Phase, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE projects SET phase = ?1, updated_at = ?2 WHERE id = ?3",
            params![phase.as_str(), ts(now), id],
        )
        .context("failed to update project phase")
    }

    pub fn projects_with_deploy_url(&self) -> Result<Vec<Project>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLS} FROM projects WHERE deploy_url IS NOT NULL ORDER BY id"
        ))?;
        let rows = stmt.query_map([], project_from_row)?;
        collect(rows)
    }

    // ── Checklist ─────────────────────────────────────────────────────

    pub fn create_checklist_item(&self, phase: Phase, title: &str) -> Result<ChecklistItem> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO checklist_items (phase, title, is_template) VALUES (?1, ?2, 1)",
            params![phase.as_str(), title],
        )
        .context("failed to insert checklist item")?;
        Ok(ChecklistItem {
            id: conn.last_insert_rowid(),
            phase,
            title: title.to_string(),
            is_template: true,
        })
    }

    pub fn templates_for_phase(&self, phase: Phase) -> Result<Vec<ChecklistItem>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, phase, title, is_template FROM checklist_items
             WHERE phase = ?1 AND is_template = 1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![phase.as_str()], checklist_item_from_row)?;
        collect(rows)
    }

    /// INSERT OR IGNORE keyed by (project_id, checklist_item_id). Returns
    /// whether a new row was actually created.
    pub fn insert_progress_if_absent(&self, project_id: i64, item_id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO checklist_progress (project_id, checklist_item_id, completed)
                 VALUES (?1, ?2, 0)",
                params![project_id, item_id],
            )
            .context("failed to insert checklist progress")?;
        Ok(inserted > 0)
    }

    pub fn checklist_for_project(&self, project_id: i64) -> Result<Vec<ChecklistEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT p.id, p.project_id, p.checklist_item_id, p.completed, p.completed_at, p.notes,
                    i.title, i.phase
             FROM checklist_progress p
             JOIN checklist_items i ON i.id = p.checklist_item_id
             WHERE p.project_id = ?1 ORDER BY p.id",
        )?;
        let rows = stmt.query_map(params![project_id], checklist_entry_from_row)?;
        collect(rows)
    }

    pub fn update_checklist_progress(
        &self,
        id: i64,
        input: UpdateChecklistInput,
        now: DateTime<Utc>,
    ) -> Result<Option<ChecklistEntry>> {
        {
            let conn = self.lock()?;
            if let Some(completed) = input.completed {
                let completed_at = if completed { Some(now) } else { None };
                conn.execute(
                    "UPDATE checklist_progress SET completed = ?1, completed_at = ?2 WHERE id = ?3",
                    params![completed, completed_at.map(ts), id],
                )
                .context("failed to update checklist progress")?;
            }
            if let Some(notes) = input.notes {
                conn.execute(
                    "UPDATE checklist_progress SET notes = ?1 WHERE id = ?2",
                    params![notes, id],
                )
                .context("failed to update checklist notes")?;
            }
        }
        self.get_checklist_entry(id)
    }

    pub fn get_checklist_entry(&self, id: i64) -> Result<Option<ChecklistEntry>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT p.id, p.project_id, p.checklist_item_id, p.completed, p.completed_at, p.notes,
                    i.title, i.phase
             FROM checklist_progress p
             JOIN checklist_items i ON i.id = p.checklist_item_id
             WHERE p.id = ?1",
            params![id],
            checklist_entry_from_row,
        )
        .optional()
        .context("failed to read checklist entry")
    }

    // ── Activity ──────────────────────────────────────────────────────

    pub fn log_activity(&self, input: CreateActivityInput) -> Result<Activity> {
        let conn = self.lock()?;
        let now = Utc::now();
        let metadata = input
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("failed to serialize activity metadata")?;
        conn.execute(
            "INSERT INTO activity (project_id, type, title, description, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![input.project_id, input.kind, input.title, input.description, metadata, ts(now)],
        )
        .context("failed to insert activity")?;
        Ok(Activity {
            id: conn.last_insert_rowid(),
            project_id: input.project_id,
            kind: input.kind,
            title: input.title,
            description: input.description,
            metadata: input.metadata,
            created_at: now,
        })
    }

    pub fn list_activity(&self, filter: &Filter, limit: i64) -> Result<Vec<Activity>> {
        let (where_sql, values) = filter.to_sql();
        let sql = format!(
            "SELECT id, project_id, type, title, description, metadata, created_at
             FROM activity{where_sql} ORDER BY created_at DESC, id DESC LIMIT {limit}"
        );
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values), activity_from_row)?;
        collect(rows)
    }

    // ── Research jobs ─────────────────────────────────────────────────

    pub fn insert_job(&self, job: &ResearchJob) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO research_jobs (id, ticker, status, progress, error_message, report_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                job.id,
                job.ticker,
                job.status.as_str(),
                job.progress,
                job.error_message,
                job.report_id.map(|u| u.to_string()),
                ts(job.created_at),
                ts(job.updated_at),
            ],
        )
        .context("failed to insert research job")?;
        Ok(())
    }

    pub fn get_job(&self, id: &str) -> Result<Option<ResearchJob>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {JOB_COLS} FROM research_jobs WHERE id = ?1"),
            params![id],
            job_from_row,
        )
        .optional()
        .context("failed to read research job")
    }

    pub fn update_job_fields(
        &self,
        id: &str,
        patch: &UpdateJobInput,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(status) = patch.status {
            sets.push("status = ?");
            values.push(Box::new(status.as_str()));
        }
        if let Some(progress) = patch.progress {
            sets.push("progress = ?");
            values.push(Box::new(progress));
        }
        if let Some(ref error_message) = patch.error_message {
            sets.push("error_message = ?");
            values.push(Box::new(error_message.clone()));
        }
        if let Some(report_id) = patch.report_id {
            sets.push("report_id = ?");
            values.push(Box::new(report_id.to_string()));
        }
        sets.push("updated_at = ?");
        values.push(Box::new(ts(now)));
        values.push(Box::new(id.to_string()));

        let sql = format!("UPDATE research_jobs SET {} WHERE id = ?", sets.join(", "));
        let conn = self.lock()?;
        let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        conn.execute(&sql, refs.as_slice())
            .context("failed to update research job")
    }

    pub fn list_active_jobs(&self) -> Result<Vec<ResearchJob>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLS} FROM research_jobs
             WHERE status IN ('pending', 'processing')
             ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map([], job_from_row)?;
        collect(rows)
    }

    // ── Stock reports & scans ─────────────────────────────────────────

    pub fn create_report(&self, input: CreateReportInput) -> Result<StockReport> {
        let conn = self.lock()?;
        let report = StockReport {
            id: Uuid::new_v4(),
            ticker: input.ticker,
            title: input.title,
            content: input.content,
            report_type: input.report_type,
            created_at: Utc::now(),
        };
        conn.execute(
            "INSERT INTO stock_reports (id, ticker, title, content, report_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                report.id.to_string(),
                report.ticker,
                report.title,
                report.content,
                report.report_type,
                ts(report.created_at),
            ],
        )
        .context("failed to insert stock report")?;
        Ok(report)
    }

    pub fn get_report(&self, id: Uuid) -> Result<Option<StockReport>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, ticker, title, content, report_type, created_at
             FROM stock_reports WHERE id = ?1",
            params![id.to_string()],
            report_from_row,
        )
        .optional()
        .context("failed to read stock report")
    }

    pub fn list_reports(&self, ticker: Option<&str>) -> Result<Vec<StockReport>> {
        let conn = self.lock()?;
        let sql = "SELECT id, ticker, title, content, report_type, created_at FROM stock_reports";
        match ticker {
            Some(t) => {
                let mut stmt =
                    conn.prepare(&format!("{sql} WHERE ticker = ?1 ORDER BY created_at DESC"))?;
                let rows = stmt.query_map(params![t], report_from_row)?;
                collect(rows)
            }
            None => {
                let mut stmt = conn.prepare(&format!("{sql} ORDER BY created_at DESC"))?;
                let rows = stmt.query_map([], report_from_row)?;
                collect(rows)
            }
        }
    }

    pub fn create_scan(&self, input: CreateScanInput) -> Result<StockScan> {
        let conn = self.lock()?;
        let scan = StockScan {
            id: Uuid::new_v4(),
            scan_type: input.scan_type,
            content: input.content,
            created_at: Utc::now(),
        };
        conn.execute(
            "INSERT INTO stock_scans (id, scan_type, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![scan.id.to_string(), scan.scan_type, scan.content, ts(scan.created_at)],
        )
        .context("failed to insert stock scan")?;
        Ok(scan)
    }

    pub fn list_scans(&self) -> Result<Vec<StockScan>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, scan_type, content, created_at FROM stock_scans ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], scan_from_row)?;
        collect(rows)
    }

    // ── Watchlist ─────────────────────────────────────────────────────

    pub fn list_watchlist(&self) -> Result<Vec<WatchlistItem>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, ticker, notes, added_at FROM watchlist ORDER BY ticker")?;
        let rows = stmt.query_map([], watchlist_from_row)?;
        collect(rows)
    }

    /// Returns `None` when the ticker is already on the watchlist.
    pub fn add_watchlist(&self, input: AddWatchlistInput) -> Result<Option<WatchlistItem>> {
        let conn = self.lock()?;
        let now = Utc::now();
        match conn.execute(
            "INSERT INTO watchlist (ticker, notes, added_at) VALUES (?1, ?2, ?3)",
            params![input.ticker, input.notes, ts(now)],
        ) {
            Ok(_) => Ok(Some(WatchlistItem {
                id: conn.last_insert_rowid(),
                ticker: input.ticker,
                notes: input.notes,
                added_at: now,
            })),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(None)
            }
            Err(e) => Err(e).context("failed to insert watchlist item"),
        }
    }

    pub fn remove_watchlist(&self, ticker: &str) -> Result<bool> {
        let conn = self.lock()?;
        let removed = conn
            .execute("DELETE FROM watchlist WHERE ticker = ?1", params![ticker])
            .context("failed to delete watchlist item")?;
        Ok(removed > 0)
    }

    // ── Portfolio ─────────────────────────────────────────────────────

    pub fn list_holdings(&self) -> Result<Vec<PortfolioHolding>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, ticker, shares, cost_basis, account, created_at, updated_at
             FROM portfolio_holdings ORDER BY ticker",
        )?;
        let rows = stmt.query_map([], holding_from_row)?;
        collect(rows)
    }

    pub fn create_holding(&self, input: CreateHoldingInput) -> Result<PortfolioHolding> {
        let conn = self.lock()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO portfolio_holdings (ticker, shares, cost_basis, account, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![input.ticker, input.shares, input.cost_basis, input.account, ts(now), ts(now)],
        )
        .context("failed to insert holding")?;
        Ok(PortfolioHolding {
            id: conn.last_insert_rowid(),
            ticker: input.ticker,
            shares: input.shares,
            cost_basis: input.cost_basis,
            account: input.account,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_holding(&self, id: i64, input: UpdateHoldingInput) -> Result<bool> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(shares) = input.shares {
            sets.push("shares = ?");
            values.push(Box::new(shares));
        }
        if let Some(cost_basis) = input.cost_basis {
            sets.push("cost_basis = ?");
            values.push(Box::new(cost_basis));
        }
        if let Some(account) = input.account {
            sets.push("account = ?");
            values.push(Box::new(account));
        }
        if sets.is_empty() {
            return Ok(false);
        }
        sets.push("updated_at = ?");
        values.push(Box::new(ts(Utc::now())));
        values.push(Box::new(id));

        let sql = format!("UPDATE portfolio_holdings SET {} WHERE id = ?", sets.join(", "));
        let conn = self.lock()?;
        let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let changed = conn
            .execute(&sql, refs.as_slice())
            .context("failed to update holding")?;
        Ok(changed > 0)
    }

    pub fn delete_holding(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let removed = conn
            .execute("DELETE FROM portfolio_holdings WHERE id = ?1", params![id])
            .context("failed to delete holding")?;
        Ok(removed > 0)
    }

    pub fn create_portfolio_report(
        &self,
        input: CreatePortfolioReportInput,
    ) -> Result<PortfolioReport> {
        let conn = self.lock()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO portfolio_reports (title, content, created_at) VALUES (?1, ?2, ?3)",
            params![input.title, input.content, ts(now)],
        )
        .context("failed to insert portfolio report")?;
        Ok(PortfolioReport {
            id: conn.last_insert_rowid(),
            title: input.title,
            content: input.content,
            created_at: now,
        })
    }

    pub fn list_portfolio_reports(&self) -> Result<Vec<PortfolioReport>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, content, created_at FROM portfolio_reports ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PortfolioReport {
                id: row.get(0)?,
                title: row.get(1)?,
                content: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        collect(rows)
    }

    // ── Themes ────────────────────────────────────────────────────────

    pub fn create_theme(&self, input: CreateThemeInput) -> Result<Option<ThemeWithStocks>> {
        let conn = self.lock()?;
        let status = input.status.unwrap_or(ThemeStatus::Active);
        match conn.execute(
            "INSERT INTO themes (name, thesis, status) VALUES (?1, ?2, ?3)",
            params![input.name, input.thesis, status.as_str()],
        ) {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Ok(None);
            }
            Err(e) => return Err(e).context("failed to insert theme"),
        }
        let id = conn.last_insert_rowid();
        let mut stocks = Vec::new();
        for ticker in input.stocks {
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO theme_stocks (theme_id, ticker) VALUES (?1, ?2)",
                    params![id, ticker],
                )
                .context("failed to insert theme stock")?;
            if inserted > 0 {
                stocks.push(ticker);
            }
        }
        Ok(Some(ThemeWithStocks {
            theme: Theme {
                id,
                name: input.name,
                thesis: input.thesis,
                status,
            },
            stocks,
        }))
    }

    pub fn list_themes(&self) -> Result<Vec<ThemeWithStocks>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, name, thesis, status FROM themes ORDER BY name")?;
        let themes = stmt.query_map([], theme_from_row)?;
        let themes: Vec<Theme> = collect(themes)?;

        let mut out = Vec::with_capacity(themes.len());
        let mut stock_stmt = conn
            .prepare("SELECT ticker FROM theme_stocks WHERE theme_id = ?1 ORDER BY ticker")?;
        for theme in themes {
            let rows = stock_stmt.query_map(params![theme.id], |row| row.get::<_, String>(0))?;
            let stocks = collect(rows)?;
            out.push(ThemeWithStocks { theme, stocks });
        }
        Ok(out)
    }

    // ── Analysts ──────────────────────────────────────────────────────

    pub fn create_analyst(&self, input: CreateAnalystInput) -> Result<Option<Analyst>> {
        let conn = self.lock()?;
        match conn.execute(
            "INSERT INTO analysts (name, firm) VALUES (?1, ?2)",
            params![input.name, input.firm],
        ) {
            Ok(_) => Ok(Some(Analyst {
                id: conn.last_insert_rowid(),
                name: input.name,
                firm: input.firm,
            })),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(None)
            }
            Err(e) => Err(e).context("failed to insert analyst"),
        }
    }

    /// Returns `None` when the referenced analyst does not exist.
    pub fn create_call(&self, input: CreateCallInput) -> Result<Option<AnalystCall>> {
        let conn = self.lock()?;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM analysts WHERE id = ?1",
                params![input.analyst_id],
                |row| row.get(0),
            )
            .optional()
            .context("failed to look up analyst")?;
        if exists.is_none() {
            return Ok(None);
        }
        let now = Utc::now();
        conn.execute(
            "INSERT INTO analyst_calls (analyst_id, ticker, rating, price_target, note, called_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![input.analyst_id, input.ticker, input.rating, input.price_target, input.note, ts(now)],
        )
        .context("failed to insert analyst call")?;
        Ok(Some(AnalystCall {
            id: conn.last_insert_rowid(),
            analyst_id: input.analyst_id,
            ticker: input.ticker,
            rating: input.rating,
            price_target: input.price_target,
            note: input.note,
            called_at: now,
        }))
    }

    pub fn list_analysts(&self) -> Result<Vec<AnalystWithCalls>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, name, firm FROM analysts ORDER BY name")?;
        let analysts = stmt.query_map([], |row| {
            Ok(Analyst {
                id: row.get(0)?,
                name: row.get(1)?,
                firm: row.get(2)?,
            })
        })?;
        let analysts: Vec<Analyst> = collect(analysts)?;

        let mut out = Vec::with_capacity(analysts.len());
        let mut call_stmt = conn.prepare(
            "SELECT id, analyst_id, ticker, rating, price_target, note, called_at
             FROM analyst_calls WHERE analyst_id = ?1 ORDER BY called_at DESC",
        )?;
        for analyst in analysts {
            let rows = call_stmt.query_map(params![analyst.id], call_from_row)?;
            let calls = collect(rows)?;
            out.push(AnalystWithCalls { analyst, calls });
        }
        Ok(out)
    }

    // ── Comments ──────────────────────────────────────────────────────

    pub fn create_comment(&self, input: CreateCommentInput) -> Result<Comment> {
        let conn = self.lock()?;
        let comment = Comment {
            id: Uuid::new_v4(),
            entity_type: input.entity_type,
            entity_id: input.entity_id,
            author: input.author,
            body: input.body,
            created_at: Utc::now(),
        };
        conn.execute(
            "INSERT INTO comments (id, entity_type, entity_id, author, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                comment.id.to_string(),
                comment.entity_type,
                comment.entity_id,
                comment.author,
                comment.body,
                ts(comment.created_at),
            ],
        )
        .context("failed to insert comment")?;
        Ok(comment)
    }

    pub fn list_comments(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Comment>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, entity_type, entity_id, author, body, created_at FROM comments
             WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![entity_type, entity_id], comment_from_row)?;
        collect(rows)
    }

    // ── Macro insights ────────────────────────────────────────────────

    pub fn create_macro_insight(&self, input: CreateMacroInsightInput) -> Result<MacroInsight> {
        let conn = self.lock()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO macro_insights (title, content, category, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![input.title, input.content, input.category, ts(now)],
        )
        .context("failed to insert macro insight")?;
        Ok(MacroInsight {
            id: conn.last_insert_rowid(),
            title: input.title,
            content: input.content,
            category: input.category,
            created_at: now,
        })
    }

    pub fn list_macro_insights(&self, category: Option<&str>) -> Result<Vec<MacroInsight>> {
        let conn = self.lock()?;
        let sql = "SELECT id, title, content, category, created_at FROM macro_insights";
        match category {
            Some(c) => {
                let mut stmt =
                    conn.prepare(&format!("{sql} WHERE category = ?1 ORDER BY created_at DESC"))?;
                let rows = stmt.query_map(params![c], macro_from_row)?;
                collect(rows)
            }
            None => {
                let mut stmt = conn.prepare(&format!("{sql} ORDER BY created_at DESC"))?;
                let rows = stmt.query_map([], macro_from_row)?;
                collect(rows)
            }
        }
    }

    // ── Health checks ─────────────────────────────────────────────────

    pub fn record_health_check(
        &self,
        project_id: i64,
        status_code: i64,
        latency_ms: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<HealthCheck> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO health_checks (project_id, status_code, latency_ms, checked_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![project_id, status_code, latency_ms, ts(now)],
        )
        .context("failed to insert health check")?;
        Ok(HealthCheck {
            id: conn.last_insert_rowid(),
            project_id,
            status_code,
            latency_ms,
            checked_at: now,
        })
    }

    pub fn list_health_checks(&self, project_id: i64, limit: i64) -> Result<Vec<HealthCheck>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, project_id, status_code, latency_ms, checked_at FROM health_checks
             WHERE project_id = ?1 ORDER BY checked_at DESC LIMIT {limit}"
        ))?;
        let rows = stmt.query_map(params![project_id], |row| {
            Ok(HealthCheck {
                id: row.get(0)?,
                project_id: row.get(1)?,
                status_code: row.get(2)?,
                latency_ms: row.get(3)?,
                checked_at: row.get(4)?,
            })
        })?;
        collect(rows)
    }

    // ── Aggregate search ──────────────────────────────────────────────

    pub fn search(&self, needle: &str) -> Result<SearchResults> {
        let projects = {
            let filter = Filter::new().like(&["name", "repo_url"], needle);
            let (where_sql, values) = filter.to_sql();
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROJECT_COLS} FROM projects{where_sql} ORDER BY updated_at DESC LIMIT {SEARCH_CAP}"
            ))?;
            let rows = stmt.query_map(rusqlite::params_from_iter(values), project_from_row)?;
            collect(rows)?
        };
        let reports = {
            let filter = Filter::new().like(&["ticker", "title", "content"], needle);
            let (where_sql, values) = filter.to_sql();
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT id, ticker, title, content, report_type, created_at
                 FROM stock_reports{where_sql} ORDER BY created_at DESC LIMIT {SEARCH_CAP}"
            ))?;
            let rows = stmt.query_map(rusqlite::params_from_iter(values), report_from_row)?;
            collect(rows)?
        };
        let watchlist = {
            let filter = Filter::new().like(&["ticker", "notes"], needle);
            let (where_sql, values) = filter.to_sql();
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT id, ticker, notes, added_at FROM watchlist{where_sql}
                 ORDER BY ticker LIMIT {SEARCH_CAP}"
            ))?;
            let rows = stmt.query_map(rusqlite::params_from_iter(values), watchlist_from_row)?;
            collect(rows)?
        };
        let themes = {
            let filter = Filter::new().like(&["name", "thesis"], needle);
            let (where_sql, values) = filter.to_sql();
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT id, name, thesis, status FROM themes{where_sql} ORDER BY name LIMIT {SEARCH_CAP}"
            ))?;
            let rows = stmt.query_map(rusqlite::params_from_iter(values), theme_from_row)?;
            collect(rows)?
        };
        let activity = {
            let filter = Filter::new().like(&["title", "description"], needle);
            let (where_sql, values) = filter.to_sql();
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT id, project_id, type, title, description, metadata, created_at
                 FROM activity{where_sql} ORDER BY created_at DESC LIMIT {SEARCH_CAP}"
            ))?;
            let rows = stmt.query_map(rusqlite::params_from_iter(values), activity_from_row)?;
            collect(rows)?
        };
        Ok(SearchResults {
            projects,
            reports,
            watchlist,
            themes,
            activity,
        })
    }
}

pub const SEARCH_CAP: i64 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub projects: Vec<Project>,
    pub reports: Vec<StockReport>,
    pub watchlist: Vec<WatchlistItem>,
    pub themes: Vec<Theme>,
    pub activity: Vec<Activity>,
}

/// Timestamps are stored as RFC3339 text so lexicographic ordering and the
/// filter builder's range predicates line up with chronological order.
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

const PROJECT_COLS: &str =
    "id, name, status, phase, repo_url, deploy_url, test_count, build_status, created_at, updated_at";
const JOB_COLS: &str =
    "id, ticker, status, progress, error_message, report_id, created_at, updated_at";

fn get_project_inner(conn: &Connection, id: i64) -> Result<Option<Project>> {
    conn.query_row(
        &format!("SELECT {PROJECT_COLS} FROM projects WHERE id = ?1"),
        params![id],
        project_from_row,
    )
    .optional()
    .context("failed to read project")
}

fn collect<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("failed to read row")?);
    }
    Ok(out)
}

fn bad_enum(idx: usize, value: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("unknown enum value: {value}").into(),
    )
}

fn project_from_row(row: &Row) -> rusqlite::Result<Project> {
    let status: String = row.get(2)?;
    let phase: String = row.get(3)?;
    let build_status: String = row.get(7)?;
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        status: ProjectStatus::from_str(&status).ok_or_else(|| bad_enum(2, status))?,
        phase: Phase::from_str(&phase).ok_or_else(|| bad_enum(3, phase))?,
        repo_url: row.get(4)?,
        deploy_url: row.get(5)?,
        test_count: row.get(6)?,
        build_status: BuildStatus::from_str(&build_status)
            .ok_or_else(|| bad_enum(7, build_status))?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn checklist_item_from_row(row: &Row) -> rusqlite::Result<ChecklistItem> {
    let phase: String = row.get(1)?;
    Ok(ChecklistItem {
        id: row.get(0)?,
        phase: Phase::from_str(&phase).ok_or_else(|| bad_enum(1, phase))?,
        title: row.get(2)?,
        is_template: row.get(3)?,
    })
}

fn checklist_entry_from_row(row: &Row) -> rusqlite::Result<ChecklistEntry> {
    let phase: String = row.get(7)?;
    Ok(ChecklistEntry {
        progress: ChecklistProgress {
            id: row.get(0)?,
            project_id: row.get(1)?,
            checklist_item_id: row.get(2)?,
            completed: row.get(3)?,
            completed_at: row.get(4)?,
            notes: row.get(5)?,
        },
        title: row.get(6)?,
        phase: Phase::from_str(&phase).ok_or_else(|| bad_enum(7, phase))?,
    })
}

fn activity_from_row(row: &Row) -> rusqlite::Result<Activity> {
    let metadata: Option<String> = row.get(5)?;
    let metadata = match metadata {
        Some(raw) => Some(
            serde_json::from_str(&raw)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
        ),
        None => None,
    };
    Ok(Activity {
        id: row.get(0)?,
        project_id: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        metadata,
        created_at: row.get(6)?,
    })
}

fn job_from_row(row: &Row) -> rusqlite::Result<ResearchJob> {
    let status: String = row.get(2)?;
    let report_id: Option<String> = row.get(5)?;
    let report_id = match report_id {
        Some(raw) => Some(
            raw.parse::<Uuid>()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
        ),
        None => None,
    };
    Ok(ResearchJob {
        id: row.get(0)?,
        ticker: row.get(1)?,
        status: JobStatus::from_str(&status).ok_or_else(|| bad_enum(2, status))?,
        progress: row.get(3)?,
        error_message: row.get(4)?,
        report_id,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn report_from_row(row: &Row) -> rusqlite::Result<StockReport> {
    let id: String = row.get(0)?;
    Ok(StockReport {
        id: id
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?,
        ticker: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        report_type: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn scan_from_row(row: &Row) -> rusqlite::Result<StockScan> {
    let id: String = row.get(0)?;
    Ok(StockScan {
        id: id
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?,
        scan_type: row.get(1)?,
        content: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn watchlist_from_row(row: &Row) -> rusqlite::Result<WatchlistItem> {
    Ok(WatchlistItem {
        id: row.get(0)?,
        ticker: row.get(1)?,
        notes: row.get(2)?,
        added_at: row.get(3)?,
    })
}

fn holding_from_row(row: &Row) -> rusqlite::Result<PortfolioHolding> {
    Ok(PortfolioHolding {
        id: row.get(0)?,
        ticker: row.get(1)?,
        shares: row.get(2)?,
        cost_basis: row.get(3)?,
        account: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn theme_from_row(row: &Row) -> rusqlite::Result<Theme> {
    let status: String = row.get(3)?;
    Ok(Theme {
        id: row.get(0)?,
        name: row.get(1)?,
        thesis: row.get(2)?,
        status: ThemeStatus::from_str(&status).ok_or_else(|| bad_enum(3, status))?,
    })
}

fn call_from_row(row: &Row) -> rusqlite::Result<AnalystCall> {
    Ok(AnalystCall {
        id: row.get(0)?,
        analyst_id: row.get(1)?,
        ticker: row.get(2)?,
        rating: row.get(3)?,
        price_target: row.get(4)?,
        note: row.get(5)?,
        called_at: row.get(6)?,
    })
}

fn comment_from_row(row: &Row) -> rusqlite::Result<Comment> {
    let id: String = row.get(0)?;
    Ok(Comment {
        id: id
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?,
        entity_type: row.get(1)?,
        entity_id: row.get(2)?,
        author: row.get(3)?,
        body: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn macro_from_row(row: &Row) -> rusqlite::Result<MacroInsight> {
    Ok(MacroInsight {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        category: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn sample_project(db: &Database, name: &str) -> Project {
        db.create_project(CreateProjectInput {
            name: name.to_string(),
            status: None,
            phase: None,
            repo_url: None,
            deploy_url: None,
        })
        .unwrap()
        .unwrap()
    }

    #[test]
    fn project_defaults() {
        let db = db();
        let project = sample_project(&db, "atlas");
        assert_eq!(project.status, ProjectStatus::Backlog);
        assert_eq!(project.phase, Phase::Build);
        assert_eq!(project.build_status, BuildStatus::Unknown);
        assert_eq!(project.test_count, 0);
    }

    #[test]
    fn legacy_phases_normalized_on_migrate() {
        let db = Database::open_in_memory().unwrap();
        {
            let conn = db.lock().unwrap();
            conn.execute_batch(
                "CREATE TABLE projects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    status TEXT NOT NULL DEFAULT 'backlog',
                    phase TEXT NOT NULL,
                    repo_url TEXT,
                    deploy_url TEXT,
                    test_count INTEGER NOT NULL DEFAULT 0,
                    build_status TEXT NOT NULL DEFAULT 'unknown',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                INSERT INTO projects (name, phase, created_at, updated_at) VALUES
                    ('a', 'launch', '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00'),
                    ('b', 'grow', '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00'),
                    ('c', 'idea', '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00'),
                    ('d', 'build', '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00');",
            )
            .unwrap();
        }
        db.migrate().unwrap();
        let by_name: std::collections::HashMap<String, Phase> = db
            .list_projects()
            .unwrap()
            .into_iter()
            .map(|p| (p.name, p.phase))
            .collect();
        assert_eq!(by_name["a"], Phase::Live);
        assert_eq!(by_name["b"], Phase::Live);
        assert_eq!(by_name["c"], Phase::Build);
        assert_eq!(by_name["d"], Phase::Build);
    }

    #[test]
    fn checklist_insert_is_idempotent() {
        let db = db();
        let project = sample_project(&db, "atlas");
        let item = db.create_checklist_item(Phase::Live, "set up monitoring").unwrap();
        assert!(db.insert_progress_if_absent(project.id, item.id).unwrap());
        assert!(!db.insert_progress_if_absent(project.id, item.id).unwrap());
        assert_eq!(db.checklist_for_project(project.id).unwrap().len(), 1);
    }

    #[test]
    fn watchlist_duplicate_rejected() {
        let db = db();
        let first = db
            .add_watchlist(AddWatchlistInput {
                ticker: "AAPL".into(),
                notes: Some("earnings 5/2".into()),
            })
            .unwrap();
        assert!(first.is_some());
        let dup = db
            .add_watchlist(AddWatchlistInput {
                ticker: "AAPL".into(),
                notes: None,
            })
            .unwrap();
        assert!(dup.is_none());
        let items = db.list_watchlist().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].notes.as_deref(), Some("earnings 5/2"));
    }

    #[test]
    fn activity_filters() {
        let db = db();
        let project = sample_project(&db, "atlas");
        for kind in ["phase_change", "deploy", "phase_change"] {
            db.log_activity(CreateActivityInput {
                project_id: Some(project.id),
                kind: kind.into(),
                title: format!("{kind} event"),
                description: None,
                metadata: None,
            })
            .unwrap();
        }
        db.log_activity(CreateActivityInput {
            project_id: None,
            kind: "note".into(),
            title: "global note".into(),
            description: None,
            metadata: None,
        })
        .unwrap();

        let all = db.list_activity(&Filter::new(), 50).unwrap();
        assert_eq!(all.len(), 4);

        let filter = Filter::new().eq("type", "phase_change");
        let phase_changes = db.list_activity(&filter, 50).unwrap();
        assert_eq!(phase_changes.len(), 2);

        let filter = Filter::new().eq("project_id", project.id);
        assert_eq!(db.list_activity(&filter, 50).unwrap().len(), 3);
    }

    #[test]
    fn search_caps_per_category() {
        let db = db();
        for i in 0..8 {
            sample_project(&db, &format!("gateway-{i}"));
        }
        let results = db.search("gateway").unwrap();
        assert_eq!(results.projects.len(), SEARCH_CAP as usize);
        assert!(results.reports.is_empty());
    }

    #[test]
    fn theme_with_stocks_round_trip() {
        let db = db();
        let theme = db
            .create_theme(CreateThemeInput {
                name: "AI infrastructure".into(),
                thesis: Some("compute demand outpaces supply".into()),
                status: None,
                stocks: vec!["NVDA".into(), "AVGO".into(), "NVDA".into()],
            })
            .unwrap()
            .unwrap();
        assert_eq!(theme.theme.status, ThemeStatus::Active);

        let listed = db.list_themes().unwrap();
        assert_eq!(listed.len(), 1);
        // duplicate NVDA collapsed by the unique pair
        assert_eq!(listed[0].stocks, vec!["AVGO".to_string(), "NVDA".to_string()]);

        let dup = db
            .create_theme(CreateThemeInput {
                name: "AI infrastructure".into(),
                thesis: None,
                status: None,
                stocks: vec![],
            })
            .unwrap();
        assert!(dup.is_none());
    }
}
