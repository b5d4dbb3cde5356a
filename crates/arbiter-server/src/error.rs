//! Error types for the decision service.
//!
//! These cover start-up and serving failures. Request-level failures are
//! [`PdpError`](arbiter_core::PdpError)s and become error responses instead.

use arbiter_identity::BackendError;
use arbiter_policy::PolicyError;
use arbiter_telemetry::TelemetryError;
use thiserror::Error;

/// Result type for service operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Service errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// Policy rules could not be loaded.
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    /// The identity backend could not be built.
    #[error("Identity backend error: {0}")]
    Identity(#[from] BackendError),

    /// Logging or metrics could not be initialized.
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    /// The listener could not be bound.
    #[error("Bind error: {message}")]
    Bind {
        /// Error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a bind error.
    pub fn bind(message: impl Into<String>) -> Self {
        Self::Bind {
            message: message.into(),
        }
    }

    /// Get the error category for logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Policy(_) => "policy",
            Self::Identity(_) => "identity",
            Self::Telemetry(_) => "telemetry",
            Self::Bind { .. } | Self::Io(_) => "io",
        }
    }
}
