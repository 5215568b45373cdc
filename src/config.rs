use std::path::PathBuf;

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Static key for automation/agent callers (`x-api-key` header or
    /// bearer token). Key auth is disabled when unset.
    pub api_key: Option<String>,
    /// Secret used to sign browser session cookies.
    pub session_secret: String,
    /// Dashboard password exchanged for a session cookie at login.
    /// Login is disabled when unset.
    pub password: Option<String>,
    /// Override for the database location; defaults to the platform data dir.
    pub db_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("MISSION_API_KEY").ok().filter(|k| !k.is_empty()),
            session_secret: std::env::var("MISSION_SESSION_SECRET")
                .unwrap_or_else(|_| "dev-session-secret".into()),
            password: std::env::var("MISSION_PASSWORD").ok().filter(|p| !p.is_empty()),
            db_path: std::env::var("MISSION_DB").ok().map(PathBuf::from),
        }
    }
}
