use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub user_id: String,
    pub course_id: u64,
    #[serde(default)]
    pub completed_lessons: Vec<String>,
    #[serde(default)]
    pub percent: u8,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub user_id: String,
    pub course_id: u64,
    pub issued_at: DateTime<Utc>,
}
