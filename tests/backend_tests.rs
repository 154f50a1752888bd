// HTTP backend against a local feed: body shapes, error classification, auth, cancellation

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use common::{snapshot, user_find};
use serde_json::{Value, json};
use slowquery_monitor::backend::{BackendError, HttpBackend, SnapshotBackend};
use slowquery_monitor::config::BackendConfig;
use slowquery_monitor::coordinator::{FetchCoordinator, FetchError, FetchPolicy, RefreshOutcome};
use tokio_util::sync::CancellationToken;

const TOKEN: &str = "s3cret";

fn feed() -> Value {
    serde_json::to_value(snapshot(vec![user_find(600.0, 1), user_find(800.0, 2)])).unwrap()
}

async fn bare() -> Json<Value> {
    Json(feed())
}

async fn wrapped() -> Json<Value> {
    Json(json!({ "success": true, "data": feed() }))
}

async fn guarded(headers: HeaderMap) -> Response {
    let expected = format!("Bearer {TOKEN}");
    match headers.get(AUTHORIZATION) {
        Some(value) if value.as_bytes() == expected.as_bytes() => Json(feed()).into_response(),
        _ => (StatusCode::UNAUTHORIZED, "missing token").into_response(),
    }
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(10)).await;
    Json(feed())
}

fn feed_routes() -> Router {
    Router::new()
        .route("/bare", get(bare))
        .route("/wrapped", get(wrapped))
        .route("/guarded", get(guarded))
        .route("/slow", get(slow))
        .route(
            "/throttled",
            get(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        )
        .route(
            "/coded",
            get(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "code": "RATE_LIMITED", "message": "quota exhausted" })),
                )
            }),
        )
        .route(
            "/unavailable",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "upstream down") }),
        )
        .route(
            "/declined",
            get(|| async {
                Json(json!({ "success": false, "message": "Rate limit exceeded, try again later" }))
            }),
        )
        .route(
            "/refused",
            get(|| async { Json(json!({ "success": false, "error": "collector offline" })) }),
        )
        .route("/empty", get(|| async { Json(json!({})) }))
        .route(
            "/empty-data",
            get(|| async { Json(json!({ "success": true, "data": { "totalQueries": 3 } })) }),
        )
        .route("/reset", post(|| async { StatusCode::NO_CONTENT }))
        .route(
            "/reset-broken",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "reset failed" })),
                )
            }),
        )
}

/// Binds an ephemeral port on loopback and serves `app` in the background.
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

fn backend_with(
    base_url: &str,
    snapshot_path: &str,
    reset_path: &str,
    token: Option<&str>,
) -> HttpBackend {
    HttpBackend::new(&BackendConfig {
        base_url: format!("{base_url}/"),
        snapshot_path: snapshot_path.to_string(),
        reset_path: reset_path.to_string(),
        timeout_ms: 2_000,
        api_token: token.map(str::to_string),
    })
    .unwrap()
}

async fn fetch(path: &str) -> Result<slowquery_monitor::models::Snapshot, BackendError> {
    let base = serve(feed_routes()).await;
    backend_with(&base, path, "/reset", None)
        .fetch_snapshot(&CancellationToken::new())
        .await
}

#[tokio::test]
async fn test_bare_and_wrapped_bodies_decode() {
    let bare = fetch("/bare").await.unwrap();
    assert_eq!(bare.samples.len(), 2);
    assert_eq!(bare.samples[1].duration_ms, 800.0);

    let wrapped = fetch("/wrapped").await.unwrap();
    assert_eq!(wrapped, bare);
}

#[tokio::test]
async fn test_status_429_is_rate_limited() {
    let err = fetch("/throttled").await.unwrap_err();
    assert_eq!(
        err,
        BackendError::RateLimited {
            message: "slow down".into()
        }
    );
}

#[tokio::test]
async fn test_rate_limit_code_in_error_body_is_rate_limited() {
    let err = fetch("/coded").await.unwrap_err();
    assert_eq!(
        err,
        BackendError::RateLimited {
            message: "quota exhausted".into()
        }
    );
}

#[tokio::test]
async fn test_plain_503_is_http_error() {
    let err = fetch("/unavailable").await.unwrap_err();
    assert_eq!(
        err,
        BackendError::Http {
            status: 503,
            message: "upstream down".into()
        }
    );
}

#[tokio::test]
async fn test_success_false_with_rate_limit_message_is_rate_limited() {
    let err = fetch("/declined").await.unwrap_err();
    assert!(err.is_rate_limited(), "got {err:?}");
}

#[tokio::test]
async fn test_success_false_is_an_error_not_an_empty_snapshot() {
    let err = fetch("/refused").await.unwrap_err();
    assert_eq!(
        err,
        BackendError::Http {
            status: 200,
            message: "collector offline".into()
        }
    );
}

#[tokio::test]
async fn test_body_without_samples_is_rejected() {
    let err = fetch("/empty").await.unwrap_err();
    assert!(matches!(err, BackendError::Decode(_)), "got {err:?}");

    let err = fetch("/empty-data").await.unwrap_err();
    assert!(matches!(err, BackendError::Decode(_)), "got {err:?}");
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let base = serve(feed_routes()).await;
    let cancel = CancellationToken::new();

    let snap = backend_with(&base, "/guarded", "/reset", Some(TOKEN))
        .fetch_snapshot(&cancel)
        .await
        .unwrap();
    assert_eq!(snap.samples.len(), 2);

    let err = backend_with(&base, "/guarded", "/reset", None)
        .fetch_snapshot(&cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Http { status: 401, .. }), "got {err:?}");
}

#[tokio::test]
async fn test_reset_posts_and_classifies_failures() {
    let base = serve(feed_routes()).await;
    backend_with(&base, "/bare", "/reset", None)
        .reset_snapshot()
        .await
        .unwrap();

    let err = backend_with(&base, "/bare", "/reset-broken", None)
        .reset_snapshot()
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BackendError::Http {
            status: 500,
            message: "reset failed".into()
        }
    );
}

#[tokio::test]
async fn test_cancelled_fetch_returns_promptly() {
    let base = serve(feed_routes()).await;
    let backend = backend_with(&base, "/slow", "/reset", None);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = backend.fetch_snapshot(&cancel).await.unwrap_err();
    assert_eq!(err, BackendError::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_unreachable_feed_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = backend_with(&format!("http://{addr}"), "/bare", "/reset", None)
        .fetch_snapshot(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Transport(_)), "got {err:?}");
}

/// Serves the feed on the first request and `failure` on every later one.
async fn degrading_feed(failure: Value) -> String {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/feed",
            get(
                |State((hits, failure)): State<(Arc<AtomicUsize>, Value)>| async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        Json(feed())
                    } else {
                        Json(failure)
                    }
                },
            ),
        )
        .with_state((hits, failure));
    serve(app).await
}

fn coordinator_over(base: &str) -> FetchCoordinator {
    let backend = Arc::new(backend_with(base, "/feed", "/reset", None));
    let policy = FetchPolicy {
        min_interval: Duration::from_secs(5),
        rate_limit_penalty: Duration::from_secs(30),
        max_penalty: Duration::from_secs(120),
    };
    FetchCoordinator::open(backend, policy, 16)
}

#[tokio::test]
async fn test_rate_limit_envelope_keeps_cached_snapshot() {
    let base = degrading_feed(json!({
        "success": false,
        "message": "Rate limit exceeded, try again later"
    }))
    .await;
    let c = coordinator_over(&base);
    c.refresh(true).await.unwrap();
    let cached = c.current().unwrap();

    let outcome = c.refresh(true).await.unwrap();
    let RefreshOutcome::RateLimited { snapshot, .. } = outcome else {
        panic!("expected RateLimited, got {outcome:?}");
    };
    assert_eq!(snapshot.as_deref(), Some(cached.as_ref()));

    let (current, previous) = c.snapshots();
    assert_eq!(current.as_deref(), Some(cached.as_ref()));
    assert!(previous.is_none());
    assert!(c.status().error.is_none());
}

#[tokio::test]
async fn test_payload_less_body_does_not_replace_snapshot() {
    let base = degrading_feed(json!({})).await;
    let c = coordinator_over(&base);
    c.refresh(true).await.unwrap();
    let cached = c.current().unwrap();

    let err = c.refresh(true).await.unwrap_err();
    assert!(matches!(err, FetchError::Backend { .. }), "got {err:?}");

    let (current, previous) = c.snapshots();
    assert_eq!(current.as_deref(), Some(cached.as_ref()));
    assert!(previous.is_none());
    assert!(c.status().stale);
}
