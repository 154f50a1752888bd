// Model serialization tests (feed field names, aliases, camelCase output)

use serde_json::json;
use slowquery_monitor::coordinator::MonitorEvent;
use slowquery_monitor::models::*;

#[test]
fn test_snapshot_deserializes_collector_feed() {
    let feed = json!({
        "slowQueries": [{
            "timestamp": "2026-01-15T12:00:01.000Z",
            "model": "User",
            "operation": "find",
            "duration": 612.5,
            "query": { "where": { "id": 1 } }
        }],
        "totalQueries": 120,
        "slowQueriesCount": 1,
        "averageQueryTime": 48.2,
        "maxQueryTime": 612.5,
        "threshold": 500
    });
    let snap: Snapshot = serde_json::from_value(feed).unwrap();
    assert_eq!(snap.samples.len(), 1);
    assert_eq!(snap.samples[0].duration_ms, 612.5);
    assert_eq!(snap.total_queries, 120);
    assert_eq!(snap.threshold_ms, 500.0);
    assert_eq!(snap.samples[0].query_text(), r#"{"where":{"id":1}}"#);
}

#[test]
fn test_snapshot_accepts_alternate_names_and_missing_fields() {
    let snap: Snapshot = serde_json::from_value(json!({
        "samples": [{
            "timestamp": "2026-01-15T12:00:00Z",
            "model": "Post",
            "operation": "count",
            "durationMs": 900
        }],
        "thresholdMs": 250
    }))
    .unwrap();
    assert_eq!(snap.samples.len(), 1);
    assert!(snap.samples[0].query.is_null());
    assert_eq!(snap.slow_queries_count, 0);
    assert_eq!(snap.threshold_ms, 250.0);

    let empty: Snapshot = serde_json::from_str("{}").unwrap();
    assert_eq!(empty, Snapshot::default());
}

#[test]
fn test_snapshot_serializes_camel_case() {
    let json = serde_json::to_string(&Snapshot::default()).unwrap();
    assert!(json.contains("\"slowQueries\""));
    assert!(json.contains("\"slowQueriesCount\""));
    assert!(json.contains("\"thresholdMs\""));
}

#[test]
fn test_query_text_keeps_strings_verbatim() {
    assert_eq!(query_text(&json!("SELECT 1")), "SELECT 1");
    assert_eq!(query_text(&json!([1, 2])), "[1,2]");
}

#[test]
fn test_group_row_flattens_group_fields() {
    let row = GroupRow {
        group: QueryGroup {
            fingerprint: "{\"id\":?}".into(),
            model: "User".into(),
            operation: "find".into(),
            samples: vec![],
            count: 2,
            avg_duration_ms: 700.0,
            p95_duration_ms: 800.0,
            max_duration_ms: 800.0,
            min_duration_ms: 600.0,
        },
        trend: Some(Trend {
            change_percent: 40,
            direction: TrendDirection::Slowing,
        }),
    };
    let v = serde_json::to_value(&row).unwrap();
    assert_eq!(v["fingerprint"], "{\"id\":?}");
    assert_eq!(v["p95DurationMs"], 800.0);
    assert_eq!(v["trend"], json!({ "changePercent": 40, "direction": "slowing" }));
}

#[test]
fn test_view_state_defaults_and_wire_names() {
    let state: ViewState = serde_json::from_str("{}").unwrap();
    assert_eq!(state, ViewState::default());
    assert_eq!(state.page, 1);
    assert_eq!(state.page_size, DEFAULT_PAGE_SIZE);

    let patch: ViewStatePatch =
        serde_json::from_value(json!({ "sortKey": "timestamp", "sortDirection": "asc" })).unwrap();
    assert_eq!(patch.sort_key, Some(SortKey::Timestamp));
    assert_eq!(patch.sort_direction, Some(SortDirection::Asc));
    assert!(patch.page.is_none());
}

#[test]
fn test_view_items_tagged_by_mode() {
    let page = ViewPage {
        items: ViewItems::Groups(vec![]),
        total_items: 0,
        total_pages: 1,
        page: 1,
    };
    let v = serde_json::to_value(&page).unwrap();
    assert_eq!(v["items"], json!({ "mode": "groups", "rows": [] }));
    assert_eq!(v["totalPages"], 1);
    assert!(page.items.is_empty());
}

#[test]
fn test_monitor_event_tagged_by_type() {
    let v = serde_json::to_value(MonitorEvent::AutoRefreshPaused { penalty_ms: 30_000 }).unwrap();
    assert_eq!(v, json!({ "type": "autoRefreshPaused", "penaltyMs": 30000 }));
    let v = serde_json::to_value(MonitorEvent::ResetCompleted).unwrap();
    assert_eq!(v, json!({ "type": "resetCompleted" }));
}
