use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Phase;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: i64,
    pub phase: Phase,
    pub title: String,
    pub is_template: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistProgress {
    pub id: i64,
    pub project_id: i64,
    pub checklist_item_id: i64,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistEntry {
    #[serde(flatten)]
    pub progress: ChecklistProgress,
    pub title: String,
    pub phase: Phase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateChecklistInput {
    pub completed: Option<bool>,
    pub notes: Option<String>,
}
