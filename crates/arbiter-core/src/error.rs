//! Error taxonomy for the decision pipeline.
//!
//! Every failure the pipeline can produce is a [`PdpError`]. Each variant has
//! a fixed HTTP status and a machine-readable reason code, which is what the
//! caller sees in the error envelope:
//!
//! | Variant | Status | Code |
//! |---|---|---|
//! | `InvalidCredential` | 401 | `InvalidCredential` |
//! | `BackendUnavailable` | 503 | `BackendUnavailable` |
//! | `UnsupportedVersion` | 406 | `UnsupportedVersion` |
//! | `MalformedQuery` | 400 | `MalformedQuery` |
//! | `Unauthenticated` | 401 | `Unauthenticated` |
//! | `Forbidden` | 403 | `Forbidden` |
//! | `NotFound` | 404 | `NotFound` |
//! | `Internal` | 500 | `Internal` |
//!
//! None of these are retried inside the service. Only `BackendUnavailable`
//! is worth retrying by the caller.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`PdpError`].
pub type PdpResult<T> = Result<T, PdpError>;

/// Errors produced by the decision pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PdpError {
    /// The credential is missing, or the identity backend rejected it.
    #[error("invalid credential: {message}")]
    InvalidCredential {
        /// Human-readable error message.
        message: String,
    },

    /// The identity backend could not be reached or gave no usable answer.
    #[error("identity backend unavailable: {message}")]
    BackendUnavailable {
        /// Human-readable error message.
        message: String,
    },

    /// The request names an API version this service does not serve.
    #[error("unsupported API version: {version}")]
    UnsupportedVersion {
        /// The version string from the request.
        version: String,
    },

    /// The decision query is missing data or cannot be parsed.
    #[error("malformed query: {message}")]
    MalformedQuery {
        /// Human-readable error message.
        message: String,
    },

    /// The endpoint requires an authenticated context.
    #[error("unauthenticated: {message}")]
    Unauthenticated {
        /// Human-readable error message.
        message: String,
    },

    /// The endpoint is disabled by deployment policy.
    #[error("forbidden: {message}")]
    Forbidden {
        /// Human-readable error message.
        message: String,
    },

    /// No route matches the request.
    #[error("not found: {method} {path}")]
    NotFound {
        /// Request method.
        method: String,
        /// Request path.
        path: String,
    },

    /// The service failed to produce a response.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
    },
}

impl PdpError {
    /// Creates an invalid credential error.
    pub fn invalid_credential(message: impl Into<String>) -> Self {
        Self::InvalidCredential {
            message: message.into(),
        }
    }

    /// Creates a backend unavailable error.
    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            message: message.into(),
        }
    }

    /// Creates an unsupported version error.
    pub fn unsupported_version(version: impl Into<String>) -> Self {
        Self::UnsupportedVersion {
            version: version.into(),
        }
    }

    /// Creates a malformed query error.
    pub fn malformed_query(message: impl Into<String>) -> Self {
        Self::MalformedQuery {
            message: message.into(),
        }
    }

    /// Creates an unauthenticated error.
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// Creates a forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::NotFound {
            method: method.into(),
            path: path.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCredential { .. } | Self::Unauthenticated { .. } => {
                StatusCode::UNAUTHORIZED
            }
            Self::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::UnsupportedVersion { .. } => StatusCode::NOT_ACCEPTABLE,
            Self::MalformedQuery { .. } => StatusCode::BAD_REQUEST,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the machine-readable reason code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredential { .. } => "InvalidCredential",
            Self::BackendUnavailable { .. } => "BackendUnavailable",
            Self::UnsupportedVersion { .. } => "UnsupportedVersion",
            Self::MalformedQuery { .. } => "MalformedQuery",
            Self::Unauthenticated { .. } => "Unauthenticated",
            Self::Forbidden { .. } => "Forbidden",
            Self::NotFound { .. } => "NotFound",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Returns true if a caller-level retry could change the outcome.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }

    /// Converts this error to a serializable error envelope.
    #[must_use]
    pub fn to_envelope(&self, request_id: Option<&str>) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
                request_id: request_id.map(ToString::to_string),
            },
        }
    }
}

/// JSON error envelope returned to callers.
///
/// ```json
/// {"error": {"code": "InvalidCredential", "message": "...", "request_id": "req-..."}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Error details.
    pub error: ErrorDetail,
}

/// Body of the error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable reason code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}
