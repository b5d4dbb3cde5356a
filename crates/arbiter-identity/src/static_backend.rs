//! In-process identity backend for development and tests.
//!
//! Two modes:
//!
//! - `StaticTokens`: only the configured tokens validate, each to its own
//!   identity.
//! - `AcceptAll`: any non-empty token validates to one default identity.
//!
//! Nothing here talks to the network.

use std::collections::HashMap;

use arbiter_core::ServiceEndpoint;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backend::{BackendError, IdentityBackend, IdentityClaims};

/// How a [`StaticBackend`] decides which tokens are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaticMode {
    /// Any non-empty token is valid.
    AcceptAll,
    /// Only configured tokens are valid.
    #[default]
    StaticTokens,
}

/// An identity handed out by the static backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticIdentity {
    /// Subject id.
    pub subject_id: String,
    /// Tenant id.
    pub tenant_id: String,
    /// Role names.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Service catalog.
    #[serde(default)]
    pub service_catalog: Vec<ServiceEndpoint>,
}

impl StaticIdentity {
    /// Creates an identity with no roles and an empty catalog.
    pub fn new(subject_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            tenant_id: tenant_id.into(),
            roles: Vec::new(),
            service_catalog: Vec::new(),
        }
    }

    /// Sets the roles.
    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the service catalog.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Vec<ServiceEndpoint>) -> Self {
        self.service_catalog = catalog;
        self
    }

    fn to_claims(&self) -> IdentityClaims {
        IdentityClaims {
            subject_id: self.subject_id.clone(),
            tenant_id: self.tenant_id.clone(),
            roles: self.roles.clone(),
            service_catalog: self.service_catalog.clone(),
            ..IdentityClaims::default()
        }
    }
}

/// Identity backend backed by a fixed token table.
#[derive(Debug, Clone)]
pub struct StaticBackend {
    mode: StaticMode,
    tokens: HashMap<String, StaticIdentity>,
    default_identity: StaticIdentity,
}

impl StaticBackend {
    /// Creates a backend that accepts only the given tokens.
    pub fn tokens<I, K>(tokens: I) -> Self
    where
        I: IntoIterator<Item = (K, StaticIdentity)>,
        K: Into<String>,
    {
        Self {
            mode: StaticMode::StaticTokens,
            tokens: tokens.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            default_identity: StaticIdentity::new("anonymous", ""),
        }
    }

    /// Creates a backend that accepts any non-empty token as `identity`.
    pub fn accept_all(identity: StaticIdentity) -> Self {
        Self {
            mode: StaticMode::AcceptAll,
            tokens: HashMap::new(),
            default_identity: identity,
        }
    }

    /// Returns the mode.
    #[must_use]
    pub const fn mode(&self) -> StaticMode {
        self.mode
    }

    /// Returns the number of configured tokens.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

#[async_trait]
impl IdentityBackend for StaticBackend {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn validate(&self, token: &str) -> Result<IdentityClaims, BackendError> {
        if token.is_empty() {
            return Err(BackendError::rejected("empty token"));
        }

        match self.mode {
            StaticMode::AcceptAll => Ok(self.default_identity.to_claims()),
            StaticMode::StaticTokens => self
                .tokens
                .get(token)
                .map(StaticIdentity::to_claims)
                .ok_or_else(|| BackendError::rejected("unknown token")),
        }
    }
}
