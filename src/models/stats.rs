use serde::{Deserialize, Serialize};

/// Aggregate counts surfaced to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DashboardStats {
    pub total_trends: i64,
    pub pending_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
}
