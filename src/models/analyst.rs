use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analyst {
    pub id: i64,
    pub name: String,
    pub firm: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystCall {
    pub id: i64,
    pub analyst_id: i64,
    pub ticker: String,
    pub rating: Option<String>,
    pub price_target: Option<f64>,
    pub note: Option<String>,
    pub called_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystWithCalls {
    #[serde(flatten)]
    pub analyst: Analyst,
    pub calls: Vec<AnalystCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAnalystInput {
    pub name: String,
    pub firm: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCallInput {
    pub analyst_id: i64,
    pub ticker: String,
    pub rating: Option<String>,
    pub price_target: Option<f64>,
    pub note: Option<String>,
}
