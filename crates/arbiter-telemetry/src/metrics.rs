//! Prometheus metrics.
//!
//! Instrumented crates record through the `metrics` facade; this module
//! installs the Prometheus recorder behind it and renders the text format
//! for the `/_arbiter/metrics` endpoint.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `arbiter_requests_total` | Counter | `method`, `status` |
//! | `arbiter_request_duration_seconds` | Histogram | `method` |
//! | `arbiter_decisions_total` | Counter | `result` |
//! | `arbiter_identity_resolutions_total` | Counter | `outcome` |
//! | `arbiter_router_queries_total` | Counter | `endpoint`, `service` |

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use parking_lot::Mutex;
use std::sync::OnceLock;

pub use arbiter_core::metric_names::{
    DECISIONS_TOTAL, IDENTITY_RESOLUTIONS_TOTAL, REQUESTS_TOTAL, REQUEST_DURATION_SECONDS,
    ROUTER_QUERIES_TOTAL,
};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static INSTALL: Mutex<()> = parking_lot::const_mutex(());

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Buckets for the request duration histogram, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // 1ms .. 10s
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

/// Installs the global Prometheus recorder.
///
/// Calling this again after a successful install is a no-op, so tests and
/// embedders can call it freely.
///
/// # Errors
///
/// Returns `TelemetryError::MetricsInit` if the buckets are invalid or
/// another recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let _guard = INSTALL.lock();
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION_SECONDS.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();

    Ok(())
}

/// Returns true once the recorder is installed.
#[must_use]
pub fn metrics_installed() -> bool {
    METRICS_HANDLE.get().is_some()
}

/// Renders metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(REQUESTS_TOTAL, "Total number of HTTP requests processed");
    describe_histogram!(
        REQUEST_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_counter!(DECISIONS_TOTAL, "Policy decisions by result");
    describe_counter!(
        IDENTITY_RESOLUTIONS_TOTAL,
        "Credential resolutions by outcome"
    );
    describe_counter!(
        ROUTER_QUERIES_TOTAL,
        "Decision queries by endpoint and service alias"
    );
}
