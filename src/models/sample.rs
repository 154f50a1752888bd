// Feed types: one slow-query sample and the snapshot a fetch returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded slow-query event. Never mutated after it is received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub operation: String,
    #[serde(alias = "duration")]
    pub duration_ms: f64,
    /// Query shape and parameters as recorded by the collector (object or string).
    #[serde(default)]
    pub query: serde_json::Value,
}

impl Sample {
    /// Query as a single string: strings verbatim, anything else as compact JSON.
    pub fn query_text(&self) -> String {
        query_text(&self.query)
    }
}

/// Serialized form of a query value used for search and export.
pub fn query_text(query: &serde_json::Value) -> String {
    match query {
        serde_json::Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Result of one successful fetch.
///
/// `slow_queries_count` is expected to equal `samples.len()`, but it is the
/// collector's number and is passed through as received.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(rename = "slowQueries", alias = "samples", default)]
    pub samples: Vec<Sample>,
    #[serde(default)]
    pub total_queries: u64,
    #[serde(default)]
    pub slow_queries_count: u64,
    #[serde(default)]
    pub average_query_time: f64,
    #[serde(default)]
    pub max_query_time: f64,
    #[serde(alias = "threshold", default)]
    pub threshold_ms: f64,
}
