use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchJob {
    pub id: String,
    pub ticker: String,
    pub status: JobStatus,
    pub progress: i64,
    pub error_message: Option<String>,
    pub report_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "complete" => Some(Self::Complete),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Legal lifecycle edges. Terminal states have no successors.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, JobStatus::Processing)
                | (Self::Pending, JobStatus::Failed)
                | (Self::Processing, JobStatus::Complete)
                | (Self::Processing, JobStatus::Failed)
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateJobInput {
    pub status: Option<JobStatus>,
    pub progress: Option<i64>,
    pub error_message: Option<String>,
    pub report_id: Option<Uuid>,
}

impl UpdateJobInput {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.progress.is_none()
            && self.error_message.is_none()
            && self.report_id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockReport {
    pub id: Uuid,
    pub ticker: String,
    pub title: String,
    pub content: String,
    pub report_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReportInput {
    pub ticker: String,
    pub title: String,
    pub content: String,
    pub report_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockScan {
    pub id: Uuid,
    pub scan_type: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScanInput {
    pub scan_type: String,
    pub content: String,
}
