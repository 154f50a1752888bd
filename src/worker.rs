// Auto-refresh scheduler: a cancellable periodic task that asks the
// coordinator for a non-forced refresh, so throttle and backoff still apply.

use std::sync::Arc;

use tokio::time::{Duration, Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::coordinator::{FetchCoordinator, FetchError, RefreshOutcome};

/// Handle for a running scheduler; stopping it cancels the loop.
pub struct AutoRefresh {
    stop: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl AutoRefresh {
    pub fn stop(self) -> tokio::task::JoinHandle<()> {
        self.stop.cancel();
        self.handle
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Spawns the scheduler. First tick fires one `period` after start.
/// The loop exits when `stop` is cancelled, when auto-refresh is switched off
/// (including the rate-limit pause), or when the coordinator closes.
pub fn spawn(
    coordinator: Arc<FetchCoordinator>,
    period: Duration,
    stop: CancellationToken,
) -> AutoRefresh {
    let token = stop.clone();
    let span = tracing::span!(
        tracing::Level::DEBUG,
        "auto_refresh",
        period_ms = period.as_millis() as u64
    );
    let task = async move {
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!("auto-refresh started");

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("auto-refresh stopped");
                    break;
                }
                _ = tick.tick() => {
                    if !coordinator.auto_refresh_active() {
                        tracing::info!("auto-refresh disabled; scheduler exiting");
                        break;
                    }
                    match coordinator.refresh(false).await {
                        Ok(RefreshOutcome::RateLimited { auto_refresh_paused: true, .. }) => {
                            tracing::info!("auto-refresh paused after rate limit");
                            break;
                        }
                        Ok(outcome) => {
                            tracing::debug!(outcome = outcome.kind(), "auto-refresh tick");
                        }
                        Err(FetchError::Closed) => break,
                        Err(e) => {
                            tracing::warn!(error = %e, operation = "auto_refresh", "auto-refresh fetch failed");
                        }
                    }
                }
            }
        }
    };
    let handle = tokio::spawn(task.instrument(span));
    AutoRefresh { stop, handle }
}
