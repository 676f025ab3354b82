use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A trending topic discovered from the external source.
///
/// Immutable once stored; rows are never deleted so they double as the
/// dedup record for future polls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trend {
    pub id: i64,
    pub video_id: String,
    pub title: String,
    pub channel: Option<String>,
    pub score: i64,
    pub discovered_at: DateTime<Utc>,
}

/// A trend as returned by the source, before it has been stored.
#[derive(Debug, Clone)]
pub struct NewTrend {
    pub video_id: String,
    pub title: String,
    pub channel: Option<String>,
    pub score: i64,
}
