// Chart-ready distributions over the full current snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountBucket {
    pub name: String,
    pub count: usize,
}

/// Samples whose timestamp falls in `[hour, hour + 1h)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyBucket {
    pub hour: DateTime<Utc>,
    pub count: usize,
    pub avg_duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    /// Top models by sample count, largest first.
    pub by_model: Vec<CountBucket>,
    /// Every operation by sample count, largest first.
    pub by_operation: Vec<CountBucket>,
    /// Most recent hours that have samples, oldest first.
    pub hourly: Vec<HourlyBucket>,
}
