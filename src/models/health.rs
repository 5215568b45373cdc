use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub id: i64,
    pub project_id: i64,
    pub status_code: i64,
    pub latency_ms: Option<i64>,
    pub checked_at: DateTime<Utc>,
}
