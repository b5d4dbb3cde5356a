//! Credential to request context resolution.

use std::sync::Arc;

use arbiter_core::metric_names::IDENTITY_RESOLUTIONS_TOTAL;
use arbiter_core::{PdpError, PdpResult, RequestContext};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{BackendError, IdentityBackend};

/// Whether requests must carry a valid credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Every request needs a credential the backend accepts.
    #[default]
    Authenticated,
    /// Every request runs as the anonymous subject.
    Unauthenticated,
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authenticated => write!(f, "authenticated"),
            Self::Unauthenticated => write!(f, "unauthenticated"),
        }
    }
}

/// Turns a credential into a [`RequestContext`].
///
/// The resolver holds no per-request state and is shared by every request.
/// It never retries: a backend failure is reported as `BackendUnavailable`
/// and the caller decides what to do.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    mode: AuthMode,
    backend: Option<Arc<dyn IdentityBackend>>,
}

impl IdentityResolver {
    /// Creates a resolver that validates every credential with `backend`.
    pub fn authenticated(backend: Arc<dyn IdentityBackend>) -> Self {
        Self {
            mode: AuthMode::Authenticated,
            backend: Some(backend),
        }
    }

    /// Creates a resolver that resolves every request to the anonymous
    /// context without consulting any backend.
    #[must_use]
    pub const fn unauthenticated() -> Self {
        Self {
            mode: AuthMode::Unauthenticated,
            backend: None,
        }
    }

    /// Returns the mode.
    #[must_use]
    pub const fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Resolves `credential` (possibly empty) into a request context.
    ///
    /// # Errors
    ///
    /// - `InvalidCredential` if the credential is empty or rejected
    /// - `BackendUnavailable` if the backend cannot answer
    pub async fn resolve(&self, credential: &str) -> PdpResult<RequestContext> {
        let Some(backend) = self.backend.as_ref().filter(|_| self.mode == AuthMode::Authenticated)
        else {
            record("anonymous");
            return Ok(RequestContext::anonymous());
        };

        if credential.trim().is_empty() {
            record("missing");
            debug!("no credential presented");
            return Err(PdpError::invalid_credential("credential is required"));
        }

        match backend.validate(credential).await {
            Ok(claims) => {
                let ctx = claims.to_context();
                record("success");
                debug!(
                    backend = backend.name(),
                    subject = %ctx.subject_id(),
                    tenant = %ctx.tenant_id(),
                    roles = ctx.roles().len(),
                    "identity resolved"
                );
                Ok(ctx)
            }
            Err(BackendError::Rejected { reason }) => {
                record("rejected");
                debug!(backend = backend.name(), %reason, "credential rejected");
                Err(PdpError::invalid_credential(reason))
            }
            Err(BackendError::Unavailable { reason }) => {
                record("unavailable");
                warn!(backend = backend.name(), %reason, "identity backend unavailable");
                Err(PdpError::backend_unavailable(reason))
            }
        }
    }
}

fn record(outcome: &'static str) {
    counter!(IDENTITY_RESOLUTIONS_TOTAL, "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::IdentityClaims;
    use crate::static_backend::{StaticBackend, StaticIdentity};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct SpyBackend {
        calls: AtomicUsize,
        answer: Option<BackendError>,
    }

    #[async_trait]
    impl IdentityBackend for SpyBackend {
        fn name(&self) -> &'static str {
            "spy"
        }

        async fn validate(&self, _token: &str) -> Result<IdentityClaims, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.answer {
                Some(err) => Err(err.clone()),
                None => Ok(IdentityClaims {
                    subject_id: "u1".into(),
                    tenant_id: "t1".into(),
                    roles: vec!["admin".into()],
                    ..IdentityClaims::default()
                }),
            }
        }
    }

    fn spy(answer: Option<BackendError>) -> Arc<SpyBackend> {
        Arc::new(SpyBackend {
            calls: AtomicUsize::new(0),
            answer,
        })
    }

    #[tokio::test]
    async fn test_valid_credential() {
        let backend = spy(None);
        let resolver = IdentityResolver::authenticated(backend.clone());

        let ctx = resolver.resolve("tok-123").await.unwrap();
        assert!(ctx.is_authenticated());
        assert_eq!(ctx.subject_id(), "u1");
        assert_eq!(ctx.tenant_id(), "t1");
        assert!(ctx.has_role("admin"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_credential_skips_backend() {
        let backend = spy(None);
        let resolver = IdentityResolver::authenticated(backend.clone());

        for credential in ["", "   "] {
            let err = resolver.resolve(credential).await.unwrap_err();
            assert_eq!(err.code(), "InvalidCredential");
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejection_maps_to_invalid_credential() {
        let resolver = IdentityResolver::authenticated(spy(Some(BackendError::rejected("expired"))));

        let err = resolver.resolve("tok").await.unwrap_err();
        assert!(matches!(err, PdpError::InvalidCredential { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unavailable_maps_to_backend_unavailable() {
        let backend = spy(Some(BackendError::unavailable("timeout")));
        let resolver = IdentityResolver::authenticated(backend.clone());

        let err = resolver.resolve("tok").await.unwrap_err();
        assert!(matches!(err, PdpError::BackendUnavailable { .. }));
        assert!(err.is_retryable());
        // No retry.
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unauthenticated_mode_is_always_anonymous() {
        let resolver = IdentityResolver::unauthenticated();
        assert_eq!(resolver.mode(), AuthMode::Unauthenticated);

        for credential in ["", "tok-123"] {
            let ctx = resolver.resolve(credential).await.unwrap();
            assert!(!ctx.is_authenticated());
            assert!(ctx.roles().is_empty());
            assert!(ctx.service_catalog().is_empty());
        }
    }

    #[tokio::test]
    async fn test_with_static_backend() {
        let backend = StaticBackend::tokens([(
            "tok-123",
            StaticIdentity::new("u1", "t1").with_roles(["admin"]),
        )]);
        let resolver = IdentityResolver::authenticated(Arc::new(backend));

        assert!(resolver.resolve("tok-123").await.unwrap().is_admin());
        assert!(resolver.resolve("nope").await.is_err());
    }

    #[test]
    fn test_auth_mode_serde() {
        let mode: AuthMode = serde_json::from_str("\"unauthenticated\"").unwrap();
        assert_eq!(mode, AuthMode::Unauthenticated);
        assert_eq!(AuthMode::default().to_string(), "authenticated");
    }
}
