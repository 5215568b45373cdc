pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'backlog' CHECK (status IN ('backlog', 'in_progress', 'blocked', 'done')),
    phase TEXT NOT NULL DEFAULT 'build' CHECK (phase IN ('build', 'live')),
    repo_url TEXT,
    deploy_url TEXT,
    test_count INTEGER NOT NULL DEFAULT 0,
    build_status TEXT NOT NULL DEFAULT 'unknown' CHECK (build_status IN ('pass', 'fail', 'unknown')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS checklist_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    phase TEXT NOT NULL CHECK (phase IN ('build', 'live')),
    title TEXT NOT NULL,
    is_template INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS checklist_progress (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    checklist_item_id INTEGER NOT NULL REFERENCES checklist_items(id),
    completed INTEGER NOT NULL DEFAULT 0,
    completed_at TEXT,
    notes TEXT,
    UNIQUE(project_id, checklist_item_id)
);

CREATE TABLE IF NOT EXISTS activity (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER REFERENCES projects(id) ON DELETE SET NULL,
    type TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    metadata TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS stock_reports (
    id TEXT PRIMARY KEY,
    ticker TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    report_type TEXT NOT NULL DEFAULT 'deep_dive',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS research_jobs (
    id TEXT PRIMARY KEY,
    ticker TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'processing', 'complete', 'failed')),
    progress INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    report_id TEXT REFERENCES stock_reports(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS stock_scans (
    id TEXT PRIMARY KEY,
    scan_type TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS watchlist (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ticker TEXT NOT NULL UNIQUE,
    notes TEXT,
    added_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS portfolio_holdings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ticker TEXT NOT NULL,
    shares REAL NOT NULL,
    cost_basis REAL NOT NULL,
    account TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS portfolio_reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS themes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    thesis TEXT,
    status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'watching', 'archived'))
);

CREATE TABLE IF NOT EXISTS theme_stocks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    theme_id INTEGER NOT NULL REFERENCES themes(id) ON DELETE CASCADE,
    ticker TEXT NOT NULL,
    UNIQUE(theme_id, ticker)
);

CREATE TABLE IF NOT EXISTS analysts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    firm TEXT
);

CREATE TABLE IF NOT EXISTS analyst_calls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    analyst_id INTEGER NOT NULL REFERENCES analysts(id) ON DELETE CASCADE,
    ticker TEXT NOT NULL,
    rating TEXT,
    price_target REAL,
    note TEXT,
    called_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS comments (
    id TEXT PRIMARY KEY,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    author TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS macro_insights (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    category TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS health_checks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    status_code INTEGER NOT NULL,
    latency_ms INTEGER,
    checked_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_checklist_items_phase ON checklist_items(phase);
CREATE INDEX IF NOT EXISTS idx_checklist_progress_project ON checklist_progress(project_id);
CREATE INDEX IF NOT EXISTS idx_activity_project ON activity(project_id);
CREATE INDEX IF NOT EXISTS idx_activity_created ON activity(created_at);
CREATE INDEX IF NOT EXISTS idx_research_jobs_status ON research_jobs(status);
CREATE INDEX IF NOT EXISTS idx_stock_reports_ticker ON stock_reports(ticker);
CREATE INDEX IF NOT EXISTS idx_theme_stocks_theme ON theme_stocks(theme_id);
CREATE INDEX IF NOT EXISTS idx_analyst_calls_analyst ON analyst_calls(analyst_id);
CREATE INDEX IF NOT EXISTS idx_comments_entity ON comments(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_health_checks_project ON health_checks(project_id);
"#;

/// Normalizes phase values written before the enum collapsed to build/live.
/// Runs unconditionally; a no-op on fresh databases.
pub const PHASE_MIGRATION: &str = r#"
UPDATE projects SET phase = CASE
    WHEN phase IN ('launch', 'grow', 'iterate', 'maintain') THEN 'live'
    WHEN phase NOT IN ('build', 'live') THEN 'build'
    ELSE phase
END WHERE phase NOT IN ('build', 'live');
"#;
