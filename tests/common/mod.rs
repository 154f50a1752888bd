// Shared fixtures: sample builders and a scripted in-memory backend.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use slowquery_monitor::backend::{BackendError, SnapshotBackend};
use slowquery_monitor::models::{Sample, Snapshot};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
}

/// Sample recorded `offset_secs` after [`base_time`].
pub fn sample(
    model: &str,
    operation: &str,
    duration_ms: f64,
    query: serde_json::Value,
    offset_secs: i64,
) -> Sample {
    Sample {
        timestamp: base_time() + chrono::TimeDelta::seconds(offset_secs),
        model: model.to_string(),
        operation: operation.to_string(),
        duration_ms,
        query,
    }
}

pub fn user_find(duration_ms: f64, id: i64) -> Sample {
    sample("User", "find", duration_ms, json!({ "id": id }), id)
}

pub fn snapshot(samples: Vec<Sample>) -> Snapshot {
    let n = samples.len() as u64;
    let max = samples.iter().map(|s| s.duration_ms).fold(0.0, f64::max);
    let avg = if samples.is_empty() {
        0.0
    } else {
        samples.iter().map(|s| s.duration_ms).sum::<f64>() / n as f64
    };
    Snapshot {
        samples,
        total_queries: n * 10,
        slow_queries_count: n,
        average_query_time: avg,
        max_query_time: max,
        threshold_ms: 500.0,
    }
}

enum Scripted {
    Ready(Result<Snapshot, BackendError>),
    Gated(oneshot::Receiver<Result<Snapshot, BackendError>>),
}

/// Answers fetches from a script; once the script is empty it serves `server`,
/// which `reset_snapshot` clears.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Scripted>>,
    server: Mutex<Snapshot>,
    fetches: AtomicUsize,
    resets: AtomicUsize,
    fail_reset: AtomicBool,
}

impl ScriptedBackend {
    pub fn new(server: Snapshot) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            server: Mutex::new(server),
            fetches: AtomicUsize::new(0),
            resets: AtomicUsize::new(0),
            fail_reset: AtomicBool::new(false),
        }
    }

    pub fn push(&self, result: Result<Snapshot, BackendError>) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Ready(result));
    }

    /// Next fetch blocks until the returned sender is used (or dropped).
    pub fn push_gated(&self) -> oneshot::Sender<Result<Snapshot, BackendError>> {
        let (tx, rx) = oneshot::channel();
        self.script.lock().unwrap().push_back(Scripted::Gated(rx));
        tx
    }

    pub fn push_rate_limited(&self) {
        self.push(Err(BackendError::RateLimited {
            message: "Too many requests".into(),
        }));
    }

    pub fn set_server(&self, snapshot: Snapshot) {
        *self.server.lock().unwrap() = snapshot;
    }

    pub fn fail_resets(&self) {
        self.fail_reset.store(true, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotBackend for ScriptedBackend {
    async fn fetch_snapshot(&self, _cancel: &CancellationToken) -> Result<Snapshot, BackendError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Ready(result)) => result,
            Some(Scripted::Gated(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(BackendError::Transport("gate dropped".into()))),
            None => Ok(self.server.lock().unwrap().clone()),
        }
    }

    async fn reset_snapshot(&self) -> Result<(), BackendError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        if self.fail_reset.load(Ordering::SeqCst) {
            return Err(BackendError::Http {
                status: 500,
                message: "reset failed".into(),
            });
        }
        let mut server = self.server.lock().unwrap();
        *server = Snapshot {
            total_queries: server.total_queries,
            threshold_ms: server.threshold_ms,
            ..Snapshot::default()
        };
        Ok(())
    }
}
