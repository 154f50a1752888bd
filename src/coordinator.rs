// Fetch coordinator: sole owner of the current/previous snapshot pair.
//
// Rules, in order: closed -> error; non-forced call while a fetch is in flight
// or inside the throttle window -> no-op; otherwise cancel any in-flight fetch
// and start a new one. Only the latest non-cancelled fetch may install state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, SnapshotBackend};
use crate::config::FetchConfig;
use crate::models::Snapshot;

/// Throttle and backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    pub min_interval: Duration,
    pub rate_limit_penalty: Duration,
    pub max_penalty: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        (&FetchConfig::default()).into()
    }
}

impl From<&FetchConfig> for FetchPolicy {
    fn from(c: &FetchConfig) -> Self {
        Self {
            min_interval: c.min_interval(),
            rate_limit_penalty: c.rate_limit_penalty(),
            max_penalty: c.max_penalty(),
        }
    }
}

impl FetchPolicy {
    /// Penalty after `consecutive` rate-limit responses in a row: base, 2x base, 4x base, ... capped.
    pub fn penalty_for(&self, consecutive: u32) -> Duration {
        if consecutive == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(consecutive - 1);
        self.rate_limit_penalty
            .saturating_mul(factor)
            .min(self.max_penalty)
    }
}

/// Notifications for the presentation boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MonitorEvent {
    SnapshotUpdated { slow_queries_count: u64 },
    /// Auto-refresh was switched off because the backend rate limited us.
    AutoRefreshPaused { penalty_ms: u64 },
    FetchFailed { message: String, serving_cached: bool },
    ResetCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InFlight,
    Throttled,
}

/// Result of a `refresh` call that did not surface an error.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// A new snapshot was installed as current.
    Fetched(Arc<Snapshot>),
    /// No request was issued; carries the last known snapshot.
    Skipped {
        reason: SkipReason,
        snapshot: Option<Arc<Snapshot>>,
    },
    /// Backend rate limited the request. State unchanged apart from the longer throttle window.
    RateLimited {
        snapshot: Option<Arc<Snapshot>>,
        penalty: Duration,
        auto_refresh_paused: bool,
    },
    /// The fetch was cancelled or superseded; its response was dropped.
    Discarded { snapshot: Option<Arc<Snapshot>> },
}

impl RefreshOutcome {
    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        match self {
            RefreshOutcome::Fetched(s) => Some(s),
            RefreshOutcome::Skipped { snapshot, .. }
            | RefreshOutcome::RateLimited { snapshot, .. }
            | RefreshOutcome::Discarded { snapshot } => snapshot.as_ref(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RefreshOutcome::Fetched(_) => "fetched",
            RefreshOutcome::Skipped {
                reason: SkipReason::InFlight,
                ..
            } => "skippedInFlight",
            RefreshOutcome::Skipped {
                reason: SkipReason::Throttled,
                ..
            } => "skippedThrottled",
            RefreshOutcome::RateLimited { .. } => "rateLimited",
            RefreshOutcome::Discarded { .. } => "discarded",
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// Degraded mode: the fetch failed; `serving_cached` tells whether an older snapshot is still served.
    #[error("snapshot fetch failed: {source}")]
    Backend {
        source: BackendError,
        serving_cached: bool,
    },

    /// Reset failed; snapshot state untouched.
    #[error("reset failed: {0}")]
    Reset(#[source] BackendError),

    #[error("fetch coordinator is closed")]
    Closed,
}

/// Coordinator state as seen by callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorStatus {
    /// A fetch is in flight.
    pub loading: bool,
    pub snapshot: Option<Arc<Snapshot>>,
    pub previous: Option<Arc<Snapshot>>,
    /// Last degraded-mode error; cleared by the next successful fetch.
    pub error: Option<String>,
    /// `snapshot` is being served after a failed fetch.
    pub stale: bool,
    pub auto_refresh_active: bool,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub throttle_remaining_ms: u64,
}

struct InFlight {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct State {
    current: Option<Arc<Snapshot>>,
    previous: Option<Arc<Snapshot>>,
    in_flight: Option<InFlight>,
    next_fetch_id: u64,
    last_attempt: Option<Instant>,
    penalty: Duration,
    consecutive_rate_limits: u32,
    error: Option<String>,
    stale: bool,
    auto_refresh: bool,
    last_fetched_at: Option<DateTime<Utc>>,
}

pub struct FetchCoordinator {
    backend: Arc<dyn SnapshotBackend>,
    policy: FetchPolicy,
    state: Mutex<State>,
    events: broadcast::Sender<MonitorEvent>,
    shutdown: CancellationToken,
}

/// Clears the in-flight slot if the refresh future is dropped before completing.
struct InFlightGuard<'a> {
    coordinator: &'a FetchCoordinator,
    id: u64,
    armed: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut st = self.coordinator.lock();
        if st.in_flight.as_ref().is_some_and(|f| f.id == self.id)
            && let Some(f) = st.in_flight.take()
        {
            f.cancel.cancel();
            debug!(fetch_id = self.id, "refresh dropped; in-flight fetch cancelled");
        }
    }
}

impl FetchCoordinator {
    /// Opens a coordinator with empty slots. Pair with [`FetchCoordinator::close`].
    pub fn open(
        backend: Arc<dyn SnapshotBackend>,
        policy: FetchPolicy,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            backend,
            policy,
            state: Mutex::new(State::default()),
            events,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancels any in-flight fetch and everything holding a [`child_token`](Self::child_token).
    /// No state is mutated by fetches after this returns.
    pub fn close(&self) {
        self.shutdown.cancel();
        let mut st = self.lock();
        if let Some(f) = st.in_flight.take() {
            f.cancel.cancel();
        }
        st.auto_refresh = false;
        info!("fetch coordinator closed");
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled when the coordinator closes.
    pub fn child_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub fn policy(&self) -> FetchPolicy {
        self.policy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.lock().current.clone()
    }

    /// `(current, previous)` read under one lock.
    pub fn snapshots(&self) -> (Option<Arc<Snapshot>>, Option<Arc<Snapshot>>) {
        let st = self.lock();
        (st.current.clone(), st.previous.clone())
    }

    pub fn auto_refresh_active(&self) -> bool {
        self.lock().auto_refresh
    }

    /// Sets the auto-refresh flag and returns its previous value.
    pub fn set_auto_refresh(&self, enabled: bool) -> Result<bool, FetchError> {
        if enabled && self.is_closed() {
            return Err(FetchError::Closed);
        }
        Ok(std::mem::replace(&mut self.lock().auto_refresh, enabled))
    }

    /// Remaining time before a non-forced refresh may issue a request.
    pub fn throttle_remaining(&self) -> Duration {
        let st = self.lock();
        self.throttle_remaining_locked(&st, Instant::now())
    }

    pub fn status(&self) -> CoordinatorStatus {
        let st = self.lock();
        CoordinatorStatus {
            loading: st.in_flight.is_some(),
            snapshot: st.current.clone(),
            previous: st.previous.clone(),
            error: st.error.clone(),
            stale: st.stale,
            auto_refresh_active: st.auto_refresh,
            last_fetched_at: st.last_fetched_at,
            throttle_remaining_ms: self.throttle_remaining_locked(&st, Instant::now()).as_millis()
                as u64,
        }
    }

    pub async fn refresh(&self, force: bool) -> Result<RefreshOutcome, FetchError> {
        let (id, cancel) = {
            let mut st = self.lock();
            if self.is_closed() {
                return Err(FetchError::Closed);
            }
            if !force {
                if st.in_flight.is_some() {
                    debug!(operation = "refresh", "fetch already in flight; skipping");
                    return Ok(RefreshOutcome::Skipped {
                        reason: SkipReason::InFlight,
                        snapshot: st.current.clone(),
                    });
                }
                let remaining = self.throttle_remaining_locked(&st, Instant::now());
                if !remaining.is_zero() {
                    debug!(
                        operation = "refresh",
                        remaining_ms = remaining.as_millis() as u64,
                        "throttled; skipping"
                    );
                    return Ok(RefreshOutcome::Skipped {
                        reason: SkipReason::Throttled,
                        snapshot: st.current.clone(),
                    });
                }
            }
            if let Some(prev) = st.in_flight.take() {
                prev.cancel.cancel();
                debug!(fetch_id = prev.id, "superseded in-flight fetch cancelled");
            }
            let id = st.next_fetch_id;
            st.next_fetch_id += 1;
            let cancel = self.shutdown.child_token();
            st.in_flight = Some(InFlight {
                id,
                cancel: cancel.clone(),
            });
            st.last_attempt = Some(Instant::now());
            (id, cancel)
        };

        let mut guard = InFlightGuard {
            coordinator: self,
            id,
            armed: true,
        };
        debug!(fetch_id = id, force, operation = "fetch_snapshot", "fetch started");
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BackendError::Cancelled),
            r = self.backend.fetch_snapshot(&cancel) => r,
        };
        guard.armed = false;
        self.complete(id, &cancel, result)
    }

    /// Clears server-side samples, then forces a fetch. On failure nothing changes.
    pub async fn reset(&self) -> Result<RefreshOutcome, FetchError> {
        if self.is_closed() {
            return Err(FetchError::Closed);
        }
        let result = tokio::select! {
            _ = self.shutdown.cancelled() => return Err(FetchError::Closed),
            r = self.backend.reset_snapshot() => r,
        };
        if let Err(e) = result {
            warn!(error = %e, operation = "reset_snapshot", "reset failed");
            return Err(FetchError::Reset(e));
        }
        info!(operation = "reset_snapshot", "server-side samples cleared");
        let _ = self.events.send(MonitorEvent::ResetCompleted);
        self.refresh(true).await
    }

    fn complete(
        &self,
        id: u64,
        cancel: &CancellationToken,
        result: Result<Snapshot, BackendError>,
    ) -> Result<RefreshOutcome, FetchError> {
        let mut st = self.lock();
        let is_latest = st.in_flight.as_ref().is_some_and(|f| f.id == id);
        if is_latest {
            st.in_flight = None;
        }
        if self.is_closed() {
            return Err(FetchError::Closed);
        }
        if !is_latest || cancel.is_cancelled() || matches!(result, Err(BackendError::Cancelled)) {
            debug!(fetch_id = id, "discarding response of cancelled fetch");
            return Ok(RefreshOutcome::Discarded {
                snapshot: st.current.clone(),
            });
        }

        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                st.previous = st.current.replace(snapshot.clone());
                st.error = None;
                st.stale = false;
                st.penalty = Duration::ZERO;
                st.consecutive_rate_limits = 0;
                st.last_fetched_at = Some(Utc::now());
                info!(
                    fetch_id = id,
                    samples = snapshot.samples.len(),
                    slow_queries_count = snapshot.slow_queries_count,
                    "snapshot updated"
                );
                let _ = self.events.send(MonitorEvent::SnapshotUpdated {
                    slow_queries_count: snapshot.slow_queries_count,
                });
                Ok(RefreshOutcome::Fetched(snapshot))
            }
            Err(e) if e.is_rate_limited() => {
                st.consecutive_rate_limits = st.consecutive_rate_limits.saturating_add(1);
                st.penalty = self.policy.penalty_for(st.consecutive_rate_limits);
                let paused = std::mem::replace(&mut st.auto_refresh, false);
                let penalty_ms = st.penalty.as_millis() as u64;
                warn!(
                    error = %e,
                    penalty_ms,
                    auto_refresh_paused = paused,
                    serving_cached = st.current.is_some(),
                    "rate limited; backing off"
                );
                if paused {
                    let _ = self
                        .events
                        .send(MonitorEvent::AutoRefreshPaused { penalty_ms });
                }
                Ok(RefreshOutcome::RateLimited {
                    snapshot: st.current.clone(),
                    penalty: st.penalty,
                    auto_refresh_paused: paused,
                })
            }
            Err(e) => {
                let serving_cached = st.current.is_some();
                st.error = Some(e.to_string());
                st.stale = serving_cached;
                warn!(error = %e, serving_cached, operation = "fetch_snapshot", "snapshot fetch failed");
                let _ = self.events.send(MonitorEvent::FetchFailed {
                    message: e.to_string(),
                    serving_cached,
                });
                Err(FetchError::Backend {
                    source: e,
                    serving_cached,
                })
            }
        }
    }

    fn throttle_remaining_locked(&self, st: &State, now: Instant) -> Duration {
        match st.last_attempt {
            Some(at) => (at + self.policy.min_interval + st.penalty).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for FetchCoordinator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
