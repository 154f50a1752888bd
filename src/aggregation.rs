// Grouped aggregation over an immutable sample list, plus trend classification.
// Pure functions; groups are recomputed in full on every call.

use std::collections::HashMap;

use crate::fingerprint::normalize;
use crate::models::{GroupRow, QueryGroup, Sample, Trend, TrendDirection};

/// Changes smaller than this (absolute, in whole percent) are treated as noise.
pub const TREND_NOISE_PERCENT: i64 = 5;

/// Partitions samples by fingerprint and computes per-group stats.
/// Groups come out in order of first appearance.
pub fn group(samples: &[Sample]) -> Vec<QueryGroup> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut partitions: Vec<(String, Vec<&Sample>)> = Vec::new();
    for s in samples {
        let fp = normalize(&s.query);
        match index.get(&fp) {
            Some(&i) => partitions[i].1.push(s),
            None => {
                index.insert(fp.clone(), partitions.len());
                partitions.push((fp, vec![s]));
            }
        }
    }
    partitions
        .into_iter()
        .map(|(fingerprint, members)| build_group(fingerprint, &members))
        .collect()
}

fn build_group(fingerprint: String, members: &[&Sample]) -> QueryGroup {
    let first = members[0];
    let mut durations: Vec<f64> = members.iter().map(|s| s.duration_ms).collect();
    durations.sort_by(f64::total_cmp);
    let n = durations.len();
    QueryGroup {
        fingerprint,
        model: first.model.clone(),
        operation: first.operation.clone(),
        samples: members.iter().map(|s| (*s).clone()).collect(),
        count: n,
        avg_duration_ms: mean(&durations),
        p95_duration_ms: p95(&durations),
        max_duration_ms: durations[n - 1],
        min_duration_ms: durations[0],
    }
}

/// `sorted[floor(0.95 * n)]`, clamped to the last index. 0.0 when empty.
pub fn p95(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (0.95 * sorted.len() as f64).floor() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

fn mean(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    v.iter().sum::<f64>() / (v.len() as f64)
}

/// Classifies the change from `previous_avg` to `current_avg`.
/// `None` without a usable baseline or when the rounded change is under 5%.
/// Halves round toward positive infinity, so -4.5% is -4 (noise) and +4.5% is +5.
pub fn trend(current_avg: f64, previous_avg: Option<f64>) -> Option<Trend> {
    let previous = previous_avg.filter(|p| *p != 0.0)?;
    let change_percent = (100.0 * (current_avg - previous) / previous + 0.5).floor() as i64;
    if change_percent.abs() < TREND_NOISE_PERCENT {
        return None;
    }
    let direction = if change_percent > 0 {
        TrendDirection::Slowing
    } else {
        TrendDirection::Speeding
    };
    Some(Trend {
        change_percent,
        direction,
    })
}

/// Pairs each current group with its trend against the same fingerprint in `previous`.
pub fn with_trends(current: Vec<QueryGroup>, previous: &[QueryGroup]) -> Vec<GroupRow> {
    let baseline: HashMap<&str, f64> = previous
        .iter()
        .map(|g| (g.fingerprint.as_str(), g.avg_duration_ms))
        .collect();
    current
        .into_iter()
        .map(|group| {
            let trend = trend(
                group.avg_duration_ms,
                baseline.get(group.fingerprint.as_str()).copied(),
            );
            GroupRow { group, trend }
        })
        .collect()
}
