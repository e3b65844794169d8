//! dashsync - headless dashboard runner.
//!
//! Keeps the default dashboard targets fresh against the configured API,
//! logs what it sees, and exits cleanly on Ctrl-C.
//!
//! Usage:
//!   dashsync                  poll until interrupted
//!   dashsync --once           fetch every target once and print JSON
//!   dashsync --print-config   print the effective configuration

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dashsync_core::api::LogObserver;
use dashsync_core::dashboard::{health_key, series_key};
use dashsync_core::stream::{StreamClient, StreamError, StreamHandler, StreamMessage};
use dashsync_core::{Config, Dashboard};

// ============================================================================
// Constants
// ============================================================================

/// How often the runner logs a snapshot of the cached values
const REPORT_INTERVAL_SECS: u64 = 15;

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=dashsync_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

/// Logs stream traffic; the runner has nothing else to do with it.
struct LogStreamHandler;

impl StreamHandler for LogStreamHandler {
    fn on_open(&self) {
        info!("Stream open");
    }

    fn on_message(&self, message: &StreamMessage) {
        info!(id = ?message.id, bytes = message.data.len(), "Stream message: {}", message.data);
    }

    fn on_error(&self, error: &StreamError) {
        warn!("Stream error: {}", error);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    let config = Config::load()?;

    if args.iter().any(|a| a == "--print-config") {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    init_tracing();
    info!(api = %config.api_base_url, "dashsync starting");

    let dashboard = Dashboard::from_config(config)?;
    dashboard.failures().subscribe(Arc::new(LogObserver));

    if dashboard.config().auto_credential_bootstrap && !dashboard.bootstrap().await {
        warn!("No credential at start-up; requests will refresh on demand");
    }

    if args.iter().any(|a| a == "--once") {
        return run_once(&dashboard).await;
    }

    let started = dashboard.start_polling();
    info!(targets = started, "Polling started");

    let mut stream = StreamClient::new(dashboard.config().enable_streaming)?
        .with_credentials(dashboard.credentials().clone());
    match dashboard.config().streaming_endpoint() {
        Some(url) => {
            stream.connect(url, Arc::new(LogStreamHandler));
        }
        None if stream.is_enabled() => warn!("Streaming enabled but no stream URL configured"),
        None => {}
    }

    let result = run(&dashboard).await;

    stream.disconnect();
    dashboard.reset();
    let stats = dashboard.client().stats();
    info!(
        calls = stats.calls,
        errors = stats.errors,
        retries = stats.retries,
        auth_replays = stats.auth_replays,
        "dashsync shutting down"
    );
    result
}

/// Report periodically until Ctrl-C.
async fn run(dashboard: &Dashboard) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_secs(REPORT_INTERVAL_SECS));
    // The first tick completes immediately, before anything has been fetched
    ticker.tick().await;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Interrupted");
                return Ok(());
            }
            _ = ticker.tick() => report(dashboard),
        }
    }
}

fn report(dashboard: &Dashboard) {
    match dashboard.health().entry(&health_key()) {
        Some(entry) => {
            let updated = entry.age_display();
            match (entry.value, entry.error) {
                (_, Some(err)) => warn!(code = %err.code, "Health: {}", err.message),
                (Some(health), None) => info!(status = ?health.status, %updated, "Health"),
                (None, None) => info!("Health: loading"),
            }
        }
        None => info!("Health: no data yet"),
    }

    let rps = series_key("rps", "7d");
    match dashboard.series().store().entry(&rps) {
        Some(entry) => {
            let updated = entry.age_display();
            let points = entry.value.as_ref().map(|v| v.point_count()).unwrap_or(0);
            match entry.error {
                Some(err) => warn!(key = %rps, code = %err.code, "Series: {}", err.message),
                None => info!(key = %rps, points, %updated, "Series"),
            }
        }
        None => info!(key = %rps, "Series: no data yet"),
    }
}

/// Fetch each default target once and print the results as JSON.
async fn run_once(dashboard: &Dashboard) -> Result<()> {
    let health = dashboard.fetch_health().await;
    let rps = dashboard.fetch_metric_series("rps", "7d").await;

    let output = json!({
        "health": match &health {
            Ok(h) => json!(h),
            Err(e) => json!({ "error": e }),
        },
        "rps_7d": match &rps {
            Ok(r) => json!({ "range": r.range.as_deref(), "points": r.point_count() }),
            Err(e) => json!({ "error": e }),
        },
        "stats": dashboard.client().stats(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    if health.is_err() && rps.is_err() {
        anyhow::bail!("All targets failed");
    }
    Ok(())
}
