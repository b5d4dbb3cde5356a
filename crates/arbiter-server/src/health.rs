//! Health checks and the operational `/_arbiter/*` endpoints.
//!
//! These bypass version negotiation and authentication.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use arbiter_core::{PdpError, RequestId};
use arbiter_identity::AuthMode;
use arbiter_middleware::{ApiVersion, Response, ResponseExt};
use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Prefix of the operational endpoints.
pub const OPERATIONAL_PREFIX: &str = "/_arbiter/";

/// Health status of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Service is healthy.
    Healthy,
    /// Service is unhealthy.
    Unhealthy,
}

/// Readiness status of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStatus {
    /// Ready to handle traffic.
    Ready,
    /// Not ready.
    NotReady,
}

impl ReadinessStatus {
    /// Check if the service is ready.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall health status.
    pub status: HealthStatus,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
    /// Service version.
    pub version: String,
}

/// Readiness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Overall readiness status.
    pub status: ReadinessStatus,
    /// Individual check results.
    pub checks: Vec<CheckResult>,
}

/// Result of a single readiness check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// Name of the check.
    pub name: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Optional message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckResult {
    /// Create a passing check result.
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: Some(message.into()),
        }
    }

    /// Create a failing check result.
    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: Some(message.into()),
        }
    }
}

/// Version response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    /// Service version.
    pub version: String,
    /// API versions served, newest first.
    pub api_versions: Vec<String>,
}

/// Health checker for the service.
#[derive(Debug)]
pub struct HealthChecker {
    start_time: Instant,
    ready: AtomicBool,
    rule_count: usize,
    auth_mode: AuthMode,
    api_versions: Vec<ApiVersion>,
    metrics_enabled: bool,
}

impl HealthChecker {
    /// Create a health checker for a service holding `rule_count` rules.
    pub fn new(rule_count: usize, auth_mode: AuthMode) -> Self {
        Self {
            start_time: Instant::now(),
            ready: AtomicBool::new(false),
            rule_count,
            auth_mode,
            api_versions: ApiVersion::ALL.to_vec(),
            metrics_enabled: true,
        }
    }

    /// Set the API versions reported by `/_arbiter/version`.
    #[must_use]
    pub fn with_api_versions(mut self, versions: &[ApiVersion]) -> Self {
        self.api_versions = versions.to_vec();
        self
    }

    /// Enable or disable `/_arbiter/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Mark the service as ready.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if the service is ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Get the uptime.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Perform a liveness check.
    pub fn liveness(&self) -> HealthResponse {
        HealthResponse {
            status: HealthStatus::Healthy,
            uptime_seconds: self.uptime().as_secs(),
            version: crate::VERSION.to_string(),
        }
    }

    /// Perform a readiness check.
    pub fn readiness(&self) -> ReadinessResponse {
        let checks = vec![
            if self.is_ready() {
                CheckResult::pass("server", "accepting requests")
            } else {
                CheckResult::fail("server", "not accepting requests")
            },
            if self.rule_count > 0 {
                CheckResult::pass("rules", format!("{} rules loaded", self.rule_count))
            } else {
                CheckResult::fail("rules", "no rules loaded, every action is denied")
            },
            CheckResult::pass("auth", format!("{} mode", self.auth_mode)),
        ];

        let status = if checks.iter().all(|c| c.passed) {
            ReadinessStatus::Ready
        } else {
            ReadinessStatus::NotReady
        };

        ReadinessResponse { status, checks }
    }

    /// Answers an operational endpoint.
    pub fn handle(&self, path: &str, request_id: RequestId) -> Response {
        match path.strip_prefix(OPERATIONAL_PREFIX).unwrap_or_default() {
            "health" => Response::json(StatusCode::OK, &self.liveness()),
            "ready" => {
                let response = self.readiness();
                let status = if response.status.is_ready() {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                Response::json(status, &response)
            }
            "metrics" => match arbiter_telemetry::render_metrics().filter(|_| self.metrics_enabled) {
                Some(text) => Response::text(StatusCode::OK, text),
                None => Response::pdp_error(&PdpError::not_found("GET", path), request_id),
            },
            "version" => Response::json(
                StatusCode::OK,
                &VersionResponse {
                    version: crate::VERSION.to_string(),
                    api_versions: self.api_versions.iter().map(ToString::to_string).collect(),
                },
            ),
            _ => Response::pdp_error(&PdpError::not_found("GET", path), request_id),
        }
    }
}
