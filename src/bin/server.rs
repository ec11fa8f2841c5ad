//! Headless server variant of the daemon: identical wiring to the
//! default binary, plus a periodic push of the Prometheus text
//! exposition format to stdout for log-based scraping where no sidecar
//! can pull `/metrics` directly.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;
use xautrade::application::bootstrap::bootstrap;
use xautrade::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("xautrade server {} starting (headless)", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().context("loading configuration from the environment")?;
    let observability = config.observability.clone();

    let supervisor = bootstrap(&config).await.context("bootstrapping supervisor")?;
    let cancel = supervisor.cancellation_token();
    let metrics = supervisor.metrics();

    let run = tokio::spawn(supervisor.start());

    let reporter_cancel = cancel.clone();
    let reporter = if observability.enabled {
        let interval = observability.interval;
        Some(tokio::spawn(async move {
            report_metrics_loop(metrics, interval, reporter_cancel).await;
        }))
    } else {
        info!("metrics reporting disabled");
        None
    };

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown signal received, stopping supervisor");
    cancel.cancel();

    run.await.context("supervisor task panicked")??;
    if let Some(reporter) = reporter {
        let _ = reporter.await;
    }
    info!("xautrade server stopped cleanly");
    Ok(())
}

async fn report_metrics_loop(
    metrics: std::sync::Arc<xautrade::infrastructure::metrics::Metrics>,
    interval: Duration,
    cancel: tokio_util::sync::CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match metrics.render() {
                    Ok(rendered) => info!(target: "metrics", "{}", rendered),
                    Err(err) => tracing::warn!("failed to render metrics: {err}"),
                }
            }
        }
    }
}
