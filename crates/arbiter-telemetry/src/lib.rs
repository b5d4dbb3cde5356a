//! Logging and metrics for Arbiter.
//!
//! - **Logging**: `tracing` events rendered by `tracing-subscriber`, JSON or
//!   pretty, filtered by an `EnvFilter` directive from configuration.
//! - **Metrics**: the `metrics` facade backed by a Prometheus recorder,
//!   rendered on demand by the server's `/_arbiter/metrics` endpoint.
//!
//! ```text
//!   arbiter-identity ─┐
//!   arbiter-policy ───┼─► metrics facade ─► Prometheus recorder ─► /_arbiter/metrics
//!   arbiter-middleware┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use arbiter_telemetry::{init_telemetry, TelemetryConfig};
//!
//! init_telemetry(&TelemetryConfig::default())?;
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};
pub use self::metrics::{init_metrics, metrics_installed, render_metrics, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Configuration for both subsystems.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Logging configuration.
    pub logging: LogConfig,

    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

/// Initializes logging, then metrics.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    Ok(())
}
