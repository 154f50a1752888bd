// Aggregated groups and trend classification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Sample;

/// All samples of one snapshot that share a fingerprint, with duration stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryGroup {
    pub fingerprint: String,
    /// Taken from the first sample seen for this fingerprint.
    pub model: String,
    pub operation: String,
    /// Member samples in input order.
    pub samples: Vec<Sample>,
    pub count: usize,
    pub avg_duration_ms: f64,
    pub p95_duration_ms: f64,
    pub max_duration_ms: f64,
    pub min_duration_ms: f64,
}

impl QueryGroup {
    /// Timestamp of the most recent member sample.
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.samples.iter().map(|s| s.timestamp).max()
    }
}

/// Direction of an average-duration change; serializes to lowercase JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Slowing,
    Speeding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub change_percent: i64,
    pub direction: TrendDirection,
}

/// A group as shown in a grouped view: stats plus the trend against the previous snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRow {
    #[serde(flatten)]
    pub group: QueryGroup,
    pub trend: Option<Trend>,
}
