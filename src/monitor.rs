// Engine facade for the presentation boundary: coordinator + stored view state
// + auto-refresh scheduler.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::backend::SnapshotBackend;
use crate::config::{AppConfig, FetchConfig, PublishingConfig, ViewConfig};
use crate::coordinator::{
    CoordinatorStatus, FetchCoordinator, FetchError, FetchPolicy, MonitorEvent, RefreshOutcome,
};
use crate::export::{ExportFormat, ExportPayload, export};
use crate::models::{ChartData, Snapshot, ViewPage, ViewState, ViewStatePatch};
use crate::view;
use crate::worker::{self, AutoRefresh};

/// Engine settings that are not part of the fetch policy.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub policy: FetchPolicy,
    pub auto_refresh_interval: Duration,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub event_capacity: usize,
}

impl From<&AppConfig> for MonitorSettings {
    fn from(c: &AppConfig) -> Self {
        Self {
            policy: (&c.fetch).into(),
            auto_refresh_interval: c.fetch.auto_refresh_interval(),
            default_page_size: c.view.default_page_size,
            max_page_size: c.view.max_page_size,
            event_capacity: c.publishing.event_capacity,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        let fetch = FetchConfig::default();
        let view = ViewConfig::default();
        Self {
            policy: (&fetch).into(),
            auto_refresh_interval: fetch.auto_refresh_interval(),
            default_page_size: view.default_page_size,
            max_page_size: view.max_page_size,
            event_capacity: PublishingConfig::default().event_capacity,
        }
    }
}

pub struct SlowQueryMonitor {
    coordinator: Arc<FetchCoordinator>,
    view: Mutex<ViewState>,
    settings: MonitorSettings,
    scheduler: Mutex<Option<AutoRefresh>>,
}

impl SlowQueryMonitor {
    pub fn new(backend: Arc<dyn SnapshotBackend>, settings: MonitorSettings) -> Self {
        let coordinator = Arc::new(FetchCoordinator::open(
            backend,
            settings.policy,
            settings.event_capacity,
        ));
        let view = ViewState {
            page_size: settings.default_page_size,
            ..ViewState::default()
        };
        Self {
            coordinator,
            view: Mutex::new(view),
            settings,
            scheduler: Mutex::new(None),
        }
    }

    pub fn coordinator(&self) -> &Arc<FetchCoordinator> {
        &self.coordinator
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.coordinator.status()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.coordinator.subscribe()
    }

    pub fn view_state(&self) -> ViewState {
        lock(&self.view).clone()
    }

    /// Applies a partial update; page size is capped at the configured maximum.
    pub fn update_view(&self, patch: ViewStatePatch) -> ViewState {
        let mut view = lock(&self.view);
        view.apply(patch);
        view.page_size = view.page_size.min(self.settings.max_page_size);
        view.clone()
    }

    pub async fn refresh(&self, force: bool) -> Result<RefreshOutcome, FetchError> {
        self.coordinator.refresh(force).await
    }

    pub async fn reset(&self) -> Result<RefreshOutcome, FetchError> {
        self.coordinator.reset().await
    }

    /// Current page for the stored view state; empty before the first snapshot.
    pub fn page(&self) -> ViewPage {
        let state = self.view_state();
        let (current, previous) = self.coordinator.snapshots();
        let empty = Snapshot::default();
        view::materialize(
            current.as_deref().unwrap_or(&empty),
            previous.as_deref(),
            &state,
        )
    }

    pub fn charts(&self) -> ChartData {
        self.coordinator
            .current()
            .map(|s| view::charts(&s))
            .unwrap_or_default()
    }

    /// Exports the filtered, sorted samples of the stored view (all pages).
    pub fn export(&self, format: ExportFormat) -> anyhow::Result<ExportPayload> {
        let state = self.view_state();
        let items = self
            .coordinator
            .current()
            .map(|s| view::filtered_sorted_samples(&s, &state))
            .unwrap_or_default();
        export(&items, format, Utc::now().date_naive())
    }

    /// Starts or stops the periodic refresh. Must be called inside a tokio runtime.
    pub fn enable_auto_refresh(&self, enabled: bool) -> Result<(), FetchError> {
        let was_active = self.coordinator.set_auto_refresh(enabled)?;
        let mut scheduler = lock(&self.scheduler);
        if enabled {
            // A scheduler still alive under an inactive flag is about to exit.
            let running = was_active && scheduler.as_ref().is_some_and(|s| !s.is_finished());
            if !running {
                if let Some(exiting) = scheduler.take() {
                    drop(exiting.stop());
                }
                *scheduler = Some(worker::spawn(
                    self.coordinator.clone(),
                    self.settings.auto_refresh_interval,
                    self.coordinator.child_token(),
                ));
            }
        } else if let Some(running) = scheduler.take() {
            drop(running.stop());
            tracing::info!("auto-refresh disabled");
        }
        Ok(())
    }

    pub fn auto_refresh_active(&self) -> bool {
        self.coordinator.auto_refresh_active()
    }

    /// Stops the scheduler and closes the coordinator, cancelling any in-flight fetch.
    pub fn close(&self) {
        if let Some(running) = lock(&self.scheduler).take() {
            drop(running.stop());
        }
        self.coordinator.close();
    }
}

impl Drop for SlowQueryMonitor {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
