mod job;
mod metric;
mod short;
mod stats;
mod trend;

pub use job::{Job, JobState};
pub use metric::{Stage, StageOutcome};
pub use short::Short;
pub use stats::DashboardStats;
pub use trend::{NewTrend, Trend};
