//! Prometheus metrics for scrub runs.
//!
//! Provides metrics for:
//! - Unit outcomes per run
//! - Blobs deleted
//! - Errors by kind
//! - Run duration

#[cfg(feature = "prometheus")]
use metrics::{counter, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;

/// Initialize the metrics system and start the scrape listener.
///
/// Must be called from within a Tokio runtime; the listener runs as a task on it.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let addr: std::net::SocketAddr = config
        .listen_addr
        .parse()
        .map_err(|e| MetricsError::Setup(format!("invalid listen_addr: {e}")))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
            &config.duration_buckets_secs,
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?
        .install()
        .map_err(MetricsError::Install)?;

    tracing::info!(listen_addr = %addr, "Prometheus metrics listener started");
    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(_config: &MetricsConfig) -> Result<(), MetricsError> {
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record the outcome of one scrub unit.
///
/// `outcome` is one of `scrubbed`, `skipped_duplicate`, `skipped_live`, `failed`.
pub fn record_scrub_unit(outcome: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("scrub_units_total", "outcome" => outcome.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = outcome;
    }
}

/// Record blobs removed from storage.
pub fn record_blobs_deleted(count: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!("scrub_blobs_deleted_total").increment(count);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = count;
    }
}

/// Record a scrub error.
///
/// `kind` is one of `fetch`, `missing_data_source`, `liveness`, `list`,
/// `delete`, `purge`.
pub fn record_scrub_error(kind: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("scrub_errors_total", "kind" => kind.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = kind;
    }
}

/// Record how long a scrub run took.
pub fn record_scrub_run(duration_secs: f64, dry_run: bool) {
    #[cfg(feature = "prometheus")]
    {
        histogram!(
            "scrub_run_duration_seconds",
            "dry_run" => dry_run.to_string()
        )
        .record(duration_secs);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (duration_secs, dry_run);
    }
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
