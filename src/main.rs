use anyhow::Result;
use slowquery_monitor::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    let backend = Arc::new(backend::HttpBackend::new(&app_config.backend)?);
    let monitor = Arc::new(monitor::SlowQueryMonitor::new(
        backend,
        monitor::MonitorSettings::from(&app_config),
    ));
    tracing::info!(
        backend = %app_config.backend.base_url,
        min_interval_ms = app_config.fetch.min_interval_ms,
        "slow-query monitor starting"
    );

    let initial = monitor.clone();
    tokio::spawn(async move {
        if let Err(e) = initial.refresh(false).await {
            tracing::warn!(error = %e, "initial fetch failed");
        }
    });
    if app_config.fetch.auto_refresh_on_start {
        monitor.enable_auto_refresh(true)?;
    }

    let app = routes::app(monitor.clone(), app_config.clone());
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
        }
    }
    monitor.close();

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
