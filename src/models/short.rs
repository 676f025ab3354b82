use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A finished generated short.
///
/// Written in the same transaction that completes its job, so a row
/// exists if and only if the job reached `completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Short {
    pub id: i64,
    pub job_id: i64,
    pub asset_path: String,
    pub script_text: String,
    pub created_at: DateTime<Utc>,
}
