// CSV / JSON export of the currently filtered and sorted samples.

use chrono::{NaiveDate, SecondsFormat};
use serde::{Deserialize, Serialize};

use crate::models::Sample;

pub const CSV_HEADER: [&str; 5] = ["Timestamp", "Model", "Operation", "Duration (ms)", "Query"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/json",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => anyhow::bail!("unsupported export format: {other}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload {
    pub content: String,
    pub filename: String,
    pub mime_type: String,
}

/// Renders `items` as given; callers pass the filtered, sorted list.
/// `date` goes into the filename.
pub fn export(items: &[Sample], format: ExportFormat, date: NaiveDate) -> anyhow::Result<ExportPayload> {
    let content = match format {
        ExportFormat::Csv => to_csv(items),
        ExportFormat::Json => serde_json::to_string_pretty(items)?,
    };
    Ok(ExportPayload {
        content,
        filename: format!("slow-queries-{}.{}", date.format("%Y-%m-%d"), format.extension()),
        mime_type: format.mime_type().to_string(),
    })
}

/// Header plus one row per sample, every field quoted, rows joined by `\n`.
pub fn to_csv(items: &[Sample]) -> String {
    let mut lines = Vec::with_capacity(items.len() + 1);
    lines.push(csv_line(CSV_HEADER.iter().map(|h| h.to_string())));
    for s in items {
        lines.push(csv_line([
            s.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            s.model.clone(),
            s.operation.clone(),
            s.duration_ms.to_string(),
            s.query_text(),
        ]));
    }
    lines.join("\n")
}

fn csv_line(fields: impl IntoIterator<Item = String>) -> String {
    fields
        .into_iter()
        .map(|f| format!("\"{}\"", f.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(",")
}
