//! Keystone v3 token validation.
//!
//! Tokens are validated with `GET /v3/auth/tokens`, passing the service's own
//! token in `X-Auth-Token` and the caller's token in `X-Subject-Token`.
//!
//! | Keystone answer | Result |
//! |---|---|
//! | 200 with a token body | claims |
//! | 401, 403, 404 | `Rejected` |
//! | any other status | `Unavailable` |
//! | connect error, timeout, unreadable body | `Unavailable` |

use std::time::Duration;

use arbiter_core::ServiceEndpoint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::StatusCode;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::backend::{BackendError, IdentityBackend, IdentityClaims};

/// Path of the token validation API.
const TOKENS_PATH: &str = "/v3/auth/tokens";

/// Header carrying the token being validated.
const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// Header carrying the service's own credential.
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Connection settings for [`KeystoneBackend`].
#[derive(Debug, Clone)]
pub struct KeystoneConfig {
    /// Base URL of the identity service (`http://keystone:5000`).
    pub url: String,
    /// Token this service presents when validating caller tokens.
    pub service_token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl KeystoneConfig {
    /// Creates a configuration with a 10 second timeout and no service token.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            service_token: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// Sets the service token.
    #[must_use]
    pub fn with_service_token(mut self, token: impl Into<String>) -> Self {
        self.service_token = Some(token.into());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Identity backend that asks a Keystone v3 service.
#[derive(Debug, Clone)]
pub struct KeystoneBackend {
    client: Client,
    tokens_url: String,
    service_token: Option<String>,
}

impl KeystoneBackend {
    /// Creates a backend from its configuration.
    pub fn new(config: &KeystoneConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(32)
            .build()
            .map_err(|e| BackendError::unavailable(format!("failed to create client: {e}")))?;

        Ok(Self {
            client,
            tokens_url: format!("{}{TOKENS_PATH}", config.url.trim_end_matches('/')),
            service_token: config.service_token.clone(),
        })
    }

    /// Returns the validation URL.
    pub fn tokens_url(&self) -> &str {
        &self.tokens_url
    }
}

#[async_trait]
impl IdentityBackend for KeystoneBackend {
    fn name(&self) -> &'static str {
        "keystone"
    }

    #[instrument(skip_all, fields(url = %self.tokens_url))]
    async fn validate(&self, token: &str) -> Result<IdentityClaims, BackendError> {
        let mut request = self
            .client
            .get(&self.tokens_url)
            .header(SUBJECT_TOKEN_HEADER, token)
            .header(http::header::ACCEPT, "application/json");
        if let Some(service_token) = &self.service_token {
            request = request.header(AUTH_TOKEN_HEADER, service_token);
        }

        let response = request.send().await.map_err(|e| {
            warn!(error = %e, timeout = e.is_timeout(), "identity backend request failed");
            BackendError::unavailable(format!("request failed: {e}"))
        })?;

        let status = response.status();
        match status {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                debug!(%status, "identity backend rejected token");
                return Err(BackendError::rejected(format!(
                    "identity backend answered {status}"
                )));
            }
            _ => {
                warn!(%status, "unexpected identity backend status");
                return Err(BackendError::unavailable(format!(
                    "identity backend answered {status}"
                )));
            }
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| BackendError::unavailable(format!("unreadable token body: {e}")))?;

        Ok(body.token.into_claims())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    user: NamedRef,
    #[serde(default)]
    project: Option<NamedRef>,
    #[serde(default)]
    roles: Vec<NamedRef>,
    #[serde(default)]
    catalog: Vec<ServiceEndpoint>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct NamedRef {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: Option<String>,
}

impl TokenBody {
    fn into_claims(self) -> IdentityClaims {
        let (tenant_id, tenant_name) = self
            .project
            .map_or_else(|| (String::new(), None), |p| (p.id, p.name));

        IdentityClaims {
            subject_id: self.user.id,
            subject_name: self.user.name,
            tenant_id,
            tenant_name,
            roles: self.roles.into_iter().filter_map(|r| r.name).collect(),
            service_catalog: self.catalog,
            expires_at: self.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn token_body() -> serde_json::Value {
        json!({
            "token": {
                "expires_at": "2030-01-01T00:00:00.000000Z",
                "user": {"id": "u1", "name": "alice"},
                "project": {"id": "t1", "name": "demo"},
                "roles": [{"id": "r1", "name": "admin"}, {"id": "r2", "name": "member"}],
                "catalog": [{
                    "type": "image",
                    "name": "glance",
                    "endpoints": [{"interface": "public", "region": "RegionOne", "url": "http://glance:9292"}]
                }]
            }
        })
    }

    fn backend_for(server: &MockServer) -> KeystoneBackend {
        let config = KeystoneConfig::new(server.base_url())
            .with_service_token("svc-token")
            .with_timeout(Duration::from_millis(500));
        KeystoneBackend::new(&config).unwrap()
    }

    #[test]
    fn test_tokens_url_trims_trailing_slash() {
        let backend = KeystoneBackend::new(&KeystoneConfig::new("http://keystone:5000/")).unwrap();
        assert_eq!(backend.tokens_url(), "http://keystone:5000/v3/auth/tokens");
    }

    #[tokio::test]
    async fn test_valid_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v3/auth/tokens")
                    .header("x-subject-token", "tok-123")
                    .header("x-auth-token", "svc-token");
                then.status(200).json_body(token_body());
            })
            .await;

        let claims = backend_for(&server).validate("tok-123").await.unwrap();
        mock.assert_async().await;

        assert_eq!(claims.subject_id, "u1");
        assert_eq!(claims.subject_name.as_deref(), Some("alice"));
        assert_eq!(claims.tenant_id, "t1");
        assert_eq!(claims.tenant_name.as_deref(), Some("demo"));
        assert_eq!(claims.roles, ["admin", "member"]);
        assert_eq!(claims.service_catalog.len(), 1);
        assert_eq!(claims.service_catalog[0].service_type, "image");
        assert!(claims.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_unscoped_token_has_empty_tenant() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v3/auth/tokens");
                then.status(200)
                    .json_body(json!({"token": {"user": {"id": "u9"}}}));
            })
            .await;

        let claims = backend_for(&server).validate("tok").await.unwrap();
        assert_eq!(claims.subject_id, "u9");
        assert!(claims.tenant_id.is_empty());
        assert!(claims.roles.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_statuses() {
        for status in [401, 403, 404] {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/v3/auth/tokens");
                    then.status(status);
                })
                .await;

            let err = backend_for(&server).validate("bad").await.unwrap_err();
            assert!(err.is_rejection(), "status {status} should reject");
        }
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v3/auth/tokens");
                then.status(500);
            })
            .await;

        let err = backend_for(&server).validate("tok").await.unwrap_err();
        assert!(!err.is_rejection());
    }

    #[tokio::test]
    async fn test_garbage_body_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v3/auth/tokens");
                then.status(200).body("<html>oops</html>");
            })
            .await;

        let err = backend_for(&server).validate("tok").await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_timeout_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v3/auth/tokens");
                then.status(200)
                    .json_body(token_body())
                    .delay(Duration::from_secs(2));
            })
            .await;

        let err = backend_for(&server).validate("tok").await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unavailable() {
        // Nothing listens on port 9 (discard) in the test environment.
        let config = KeystoneConfig::new("http://127.0.0.1:9").with_timeout(Duration::from_millis(200));
        let backend = KeystoneBackend::new(&config).unwrap();

        let err = backend.validate("tok").await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable { .. }));
    }
}
