//! The identity backend contract.

use arbiter_core::{RequestContext, ServiceEndpoint};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Identity claims returned by a backend for a valid token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdentityClaims {
    /// Subject (user) id.
    pub subject_id: String,
    /// Subject display name.
    pub subject_name: Option<String>,
    /// Tenant (project) id.
    pub tenant_id: String,
    /// Tenant display name.
    pub tenant_name: Option<String>,
    /// Role names.
    pub roles: Vec<String>,
    /// Service catalog, in backend order.
    pub service_catalog: Vec<ServiceEndpoint>,
    /// When the token stops being valid, if the backend said so.
    pub expires_at: Option<DateTime<Utc>>,
}

impl IdentityClaims {
    /// Builds the authenticated request context for these claims.
    #[must_use]
    pub fn to_context(&self) -> RequestContext {
        let mut builder = RequestContext::builder(&self.subject_id, &self.tenant_id)
            .roles(self.roles.iter().cloned())
            .service_catalog(self.service_catalog.clone());
        if let Some(name) = &self.subject_name {
            builder = builder.subject_name(name);
        }
        if let Some(name) = &self.tenant_name {
            builder = builder.tenant_name(name);
        }
        builder.build()
    }
}

/// Why a backend could not validate a token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend answered and the token is not valid.
    #[error("token rejected: {reason}")]
    Rejected {
        /// Reason reported by (or inferred from) the backend.
        reason: String,
    },

    /// The backend could not be asked, or its answer could not be used.
    #[error("backend unavailable: {reason}")]
    Unavailable {
        /// What went wrong.
        reason: String,
    },
}

impl BackendError {
    /// Creates a rejection.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Creates an unavailability error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Returns true for rejections.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// A system that validates bearer tokens and reports identity claims.
#[async_trait]
pub trait IdentityBackend: Send + Sync + std::fmt::Debug {
    /// Short name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Validates `token` and returns its claims.
    ///
    /// # Errors
    ///
    /// - `Rejected` if the token is invalid, expired, malformed or revoked
    /// - `Unavailable` if the backend cannot be reached or answers unusably
    async fn validate(&self, token: &str) -> Result<IdentityClaims, BackendError>;
}
