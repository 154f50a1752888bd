use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub publishing: PublishingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
    #[serde(default = "default_reset_path")]
    pub reset_path: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Sent as `Authorization: Bearer <token>` when set.
    #[serde(default)]
    pub api_token: Option<String>,
}

fn default_snapshot_path() -> String {
    "/api/admin/slow-queries".into()
}

fn default_reset_path() -> String {
    "/api/admin/slow-queries/reset".into()
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// Fetch policy: throttle window, rate-limit penalty, auto-refresh cadence.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Added to the throttle window on the first rate-limit response; doubles on each consecutive one.
    #[serde(default = "default_rate_limit_penalty_ms")]
    pub rate_limit_penalty_ms: u64,
    #[serde(default = "default_max_penalty_ms")]
    pub max_penalty_ms: u64,
    #[serde(default = "default_auto_refresh_interval_secs")]
    pub auto_refresh_interval_secs: u64,
    #[serde(default)]
    pub auto_refresh_on_start: bool,
}

fn default_min_interval_ms() -> u64 {
    5_000
}

fn default_rate_limit_penalty_ms() -> u64 {
    30_000
}

fn default_max_penalty_ms() -> u64 {
    300_000
}

fn default_auto_refresh_interval_secs() -> u64 {
    10
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            rate_limit_penalty_ms: default_rate_limit_penalty_ms(),
            max_penalty_ms: default_max_penalty_ms(),
            auto_refresh_interval_secs: default_auto_refresh_interval_secs(),
            auto_refresh_on_start: false,
        }
    }
}

impl FetchConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn rate_limit_penalty(&self) -> Duration {
        Duration::from_millis(self.rate_limit_penalty_ms)
    }

    pub fn max_penalty(&self) -> Duration {
        Duration::from_millis(self.max_penalty_ms)
    }

    pub fn auto_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.auto_refresh_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

fn default_page_size() -> usize {
    crate::models::DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> usize {
    500
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishingConfig {
    /// Max number of monitor events kept in the broadcast channel for /ws/events (slow clients may lag).
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    64
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        Self::load_from_path(path)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            self.backend.base_url.starts_with("http://")
                || self.backend.base_url.starts_with("https://"),
            "backend.base_url must be an http(s) URL, got {:?}",
            self.backend.base_url
        );
        anyhow::ensure!(
            self.backend.snapshot_path.starts_with('/'),
            "backend.snapshot_path must start with '/', got {:?}",
            self.backend.snapshot_path
        );
        anyhow::ensure!(
            self.backend.reset_path.starts_with('/'),
            "backend.reset_path must start with '/', got {:?}",
            self.backend.reset_path
        );
        anyhow::ensure!(
            self.backend.timeout_ms > 0,
            "backend.timeout_ms must be > 0, got {}",
            self.backend.timeout_ms
        );
        anyhow::ensure!(
            self.fetch.min_interval_ms > 0,
            "fetch.min_interval_ms must be > 0, got {}",
            self.fetch.min_interval_ms
        );
        anyhow::ensure!(
            self.fetch.rate_limit_penalty_ms > 0,
            "fetch.rate_limit_penalty_ms must be > 0, got {}",
            self.fetch.rate_limit_penalty_ms
        );
        anyhow::ensure!(
            self.fetch.max_penalty_ms >= self.fetch.rate_limit_penalty_ms,
            "fetch.max_penalty_ms must be >= fetch.rate_limit_penalty_ms, got {}",
            self.fetch.max_penalty_ms
        );
        anyhow::ensure!(
            self.fetch.auto_refresh_interval_secs > 0,
            "fetch.auto_refresh_interval_secs must be > 0, got {}",
            self.fetch.auto_refresh_interval_secs
        );
        anyhow::ensure!(
            self.view.default_page_size > 0,
            "view.default_page_size must be > 0, got {}",
            self.view.default_page_size
        );
        anyhow::ensure!(
            self.view.max_page_size >= self.view.default_page_size,
            "view.max_page_size must be >= view.default_page_size, got {}",
            self.view.max_page_size
        );
        anyhow::ensure!(
            self.publishing.event_capacity > 0,
            "publishing.event_capacity must be > 0, got {}",
            self.publishing.event_capacity
        );
        Ok(())
    }
}
