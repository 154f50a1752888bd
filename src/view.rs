// View pipeline: filter -> (group + trend) -> sort -> paginate, and chart data.
// Pure function of (snapshot, previous snapshot, view state).

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, DurationRound, TimeDelta, Utc};

use crate::aggregation::{group, with_trends};
use crate::models::{
    ChartData, CountBucket, GroupRow, HourlyBucket, Sample, Snapshot, SortDirection, SortKey,
    ViewItems, ViewPage, ViewState,
};

/// Number of models kept in the by-model chart.
pub const TOP_MODELS: usize = 5;
/// Number of hourly buckets kept in the duration chart.
pub const HOURLY_BUCKETS: usize = 10;

/// Materializes one page of `current` for `view`. Trends compare against `previous`.
pub fn materialize(current: &Snapshot, previous: Option<&Snapshot>, view: &ViewState) -> ViewPage {
    let filtered = filter_samples(&current.samples, view);
    let items = if view.grouped {
        let previous_groups = previous.map(|p| group(&p.samples)).unwrap_or_default();
        let mut rows = with_trends(group(&filtered), &previous_groups);
        sort_groups(&mut rows, view.sort_key, view.sort_direction);
        ViewItems::Groups(rows)
    } else {
        let mut rows = filtered;
        sort_samples(&mut rows, view.sort_key, view.sort_direction);
        ViewItems::Samples(rows)
    };
    paginate(items, view.page, view.page_size)
}

/// Filtered and sorted samples without grouping or pagination; what an export contains.
pub fn filtered_sorted_samples(current: &Snapshot, view: &ViewState) -> Vec<Sample> {
    let mut rows = filter_samples(&current.samples, view);
    sort_samples(&mut rows, view.sort_key, view.sort_direction);
    rows
}

/// Search, then model, then operation. Empty search matches everything.
pub fn filter_samples(samples: &[Sample], view: &ViewState) -> Vec<Sample> {
    let needle = view.search.trim().to_lowercase();
    samples
        .iter()
        .filter(|s| needle.is_empty() || matches_search(s, &needle))
        .filter(|s| view.model.as_deref().is_none_or(|m| s.model == m))
        .filter(|s| view.operation.as_deref().is_none_or(|o| s.operation == o))
        .cloned()
        .collect()
}

fn matches_search(sample: &Sample, needle: &str) -> bool {
    sample.model.to_lowercase().contains(needle)
        || sample.operation.to_lowercase().contains(needle)
        || sample.query_text().to_lowercase().contains(needle)
}

/// Stable: ties keep input order in both directions.
pub fn sort_samples(rows: &mut [Sample], key: SortKey, direction: SortDirection) {
    rows.sort_by(|a, b| {
        let ord = match key {
            SortKey::Duration => a.duration_ms.total_cmp(&b.duration_ms),
            SortKey::Timestamp => a.timestamp.cmp(&b.timestamp),
            SortKey::Model => a.model.cmp(&b.model),
        };
        directed(ord, direction)
    });
}

/// Duration sorts by average, timestamp by the most recent member.
pub fn sort_groups(rows: &mut [GroupRow], key: SortKey, direction: SortDirection) {
    rows.sort_by(|a, b| {
        let ord = match key {
            SortKey::Duration => a.group.avg_duration_ms.total_cmp(&b.group.avg_duration_ms),
            SortKey::Timestamp => a.group.latest_timestamp().cmp(&b.group.latest_timestamp()),
            SortKey::Model => a.group.model.cmp(&b.group.model),
        };
        directed(ord, direction)
    });
}

fn directed(ord: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    }
}

/// Cuts one page out of `items`; `page` is clamped into `[1, total_pages]`.
pub fn paginate(items: ViewItems, page: usize, page_size: usize) -> ViewPage {
    let page_size = page_size.max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(page_size).max(1);
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * page_size;
    let end = (start + page_size).min(total_items);
    let items = match items {
        ViewItems::Samples(mut rows) => {
            rows.truncate(end);
            ViewItems::Samples(rows.split_off(start.min(rows.len())))
        }
        ViewItems::Groups(mut rows) => {
            rows.truncate(end);
            ViewItems::Groups(rows.split_off(start.min(rows.len())))
        }
    };
    ViewPage {
        items,
        total_items,
        total_pages,
        page,
    }
}

/// Distributions over every sample in `current`, independent of view filters.
pub fn charts(current: &Snapshot) -> ChartData {
    let samples = &current.samples;
    let mut by_model = count_by(samples, |s| s.model.as_str());
    by_model.truncate(TOP_MODELS);
    ChartData {
        by_model,
        by_operation: count_by(samples, |s| s.operation.as_str()),
        hourly: hourly(samples),
    }
}

/// Counts per key, largest first; equal counts keep first-seen order.
fn count_by<'a>(samples: &'a [Sample], key: impl Fn(&'a Sample) -> &'a str) -> Vec<CountBucket> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut buckets: Vec<CountBucket> = Vec::new();
    for s in samples {
        let k = key(s);
        match index.get(k) {
            Some(&i) => buckets[i].count += 1,
            None => {
                index.insert(k, buckets.len());
                buckets.push(CountBucket {
                    name: k.to_string(),
                    count: 1,
                });
            }
        }
    }
    buckets.sort_by(|a, b| b.count.cmp(&a.count));
    buckets
}

fn hourly(samples: &[Sample]) -> Vec<HourlyBucket> {
    let mut by_hour: BTreeMap<DateTime<Utc>, (usize, f64)> = BTreeMap::new();
    for s in samples {
        let hour = truncate_to_hour(s.timestamp);
        let entry = by_hour.entry(hour).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += s.duration_ms;
    }
    let skip = by_hour.len().saturating_sub(HOURLY_BUCKETS);
    by_hour
        .into_iter()
        .skip(skip)
        .map(|(hour, (count, total))| HourlyBucket {
            hour,
            count,
            avg_duration_ms: total / count as f64,
        })
        .collect()
}

fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::hours(1)).unwrap_or(ts)
}
