//! Request context types.
//!
//! The [`RequestContext`] is the identity snapshot attached to one request by
//! the auth context middleware. It is created once, never mutated, and dropped
//! when the response is sent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use uuid::Uuid;

/// Prefix used when rendering request IDs.
const REQUEST_ID_PREFIX: &str = "req-";

/// A unique identifier for each request, using UUID v7.
///
/// Rendered as `req-<uuid>`, the format OpenStack services use for
/// `X-Request-Id`.
///
/// # Example
///
/// ```
/// use arbiter_core::RequestId;
///
/// let id = RequestId::new();
/// assert!(id.to_string().starts_with("req-"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `RequestId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{REQUEST_ID_PREFIX}{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    /// Parses `req-<uuid>` or a bare UUID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(REQUEST_ID_PREFIX).unwrap_or(s);
        Uuid::parse_str(raw).map(Self)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// One endpoint of a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Interface name (`public`, `internal`, `admin`).
    #[serde(default)]
    pub interface: String,
    /// Region the endpoint lives in.
    #[serde(default)]
    pub region: String,
    /// Endpoint URL.
    pub url: String,
}

/// A service catalog record as reported by the identity backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Service type (`image`, `compute`, ...).
    #[serde(rename = "type")]
    pub service_type: String,
    /// Service name.
    #[serde(default)]
    pub name: String,
    /// Endpoints offered by this service.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl ServiceEndpoint {
    /// Creates a catalog record with no endpoints.
    pub fn new(service_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
            name: name.into(),
            endpoints: Vec::new(),
        }
    }

    /// Adds an endpoint.
    #[must_use]
    pub fn with_endpoint(
        mut self,
        interface: impl Into<String>,
        region: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        self.endpoints.push(Endpoint {
            interface: interface.into(),
            region: region.into(),
            url: url.into(),
        });
        self
    }
}

/// The identity attached to one request.
///
/// An unauthenticated context never carries privilege data: the only way to
/// obtain one is [`RequestContext::anonymous`], which leaves `roles` and
/// `service_catalog` empty. Authenticated contexts come from
/// [`RequestContext::builder`].
///
/// # Example
///
/// ```
/// use arbiter_core::RequestContext;
///
/// let ctx = RequestContext::builder("u1", "t1").role("admin").build();
/// assert!(ctx.is_authenticated());
/// assert!(ctx.has_role("admin"));
///
/// let anon = RequestContext::anonymous();
/// assert!(!anon.is_authenticated());
/// assert!(anon.roles().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestContext {
    subject_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject_name: Option<String>,
    tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tenant_name: Option<String>,
    roles: BTreeSet<String>,
    service_catalog: Vec<ServiceEndpoint>,
    is_authenticated: bool,
}

impl RequestContext {
    /// Creates the anonymous context used in unauthenticated mode.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            subject_id: String::new(),
            subject_name: None,
            tenant_id: String::new(),
            tenant_name: None,
            roles: BTreeSet::new(),
            service_catalog: Vec::new(),
            is_authenticated: false,
        }
    }

    /// Starts building an authenticated context.
    pub fn builder(
        subject_id: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> RequestContextBuilder {
        RequestContextBuilder {
            inner: Self {
                subject_id: subject_id.into(),
                subject_name: None,
                tenant_id: tenant_id.into(),
                tenant_name: None,
                roles: BTreeSet::new(),
                service_catalog: Vec::new(),
                is_authenticated: true,
            },
        }
    }

    /// Returns the subject (user) id, empty for anonymous.
    #[must_use]
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Returns the subject display name, if the backend reported one.
    #[must_use]
    pub fn subject_name(&self) -> Option<&str> {
        self.subject_name.as_deref()
    }

    /// Returns the tenant (project) id, empty for anonymous.
    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Returns the tenant display name, if the backend reported one.
    #[must_use]
    pub fn tenant_name(&self) -> Option<&str> {
        self.tenant_name.as_deref()
    }

    /// Returns the role set.
    #[must_use]
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    /// Returns true if the context holds `role`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Returns true if the context holds the `admin` role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
    }

    /// Returns the service catalog.
    #[must_use]
    pub fn service_catalog(&self) -> &[ServiceEndpoint] {
        &self.service_catalog
    }

    /// Returns true if the context was produced from a validated credential.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }

    /// Returns a string identifier suitable for logging.
    ///
    /// Never includes credentials.
    #[must_use]
    pub fn log_id(&self) -> String {
        if self.is_authenticated {
            format!("user:{}@{}", self.subject_id, self.tenant_id)
        } else {
            "anonymous".to_string()
        }
    }
}

/// Builder for authenticated [`RequestContext`] values.
#[derive(Debug, Clone)]
pub struct RequestContextBuilder {
    inner: RequestContext,
}

impl RequestContextBuilder {
    /// Sets the subject display name.
    #[must_use]
    pub fn subject_name(mut self, name: impl Into<String>) -> Self {
        self.inner.subject_name = Some(name.into());
        self
    }

    /// Sets the tenant display name.
    #[must_use]
    pub fn tenant_name(mut self, name: impl Into<String>) -> Self {
        self.inner.tenant_name = Some(name.into());
        self
    }

    /// Adds a role.
    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.inner.roles.insert(role.into());
        self
    }

    /// Adds several roles.
    #[must_use]
    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Appends a service catalog record.
    #[must_use]
    pub fn service(mut self, service: ServiceEndpoint) -> Self {
        self.inner.service_catalog.push(service);
        self
    }

    /// Replaces the service catalog.
    #[must_use]
    pub fn service_catalog(mut self, catalog: Vec<ServiceEndpoint>) -> Self {
        self.inner.service_catalog = catalog;
        self
    }

    /// Finishes the context.
    #[must_use]
    pub fn build(self) -> RequestContext {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_display_and_parse() {
        let id = RequestId::new();
        let rendered = id.to_string();
        assert!(rendered.starts_with("req-"));

        let parsed: RequestId = rendered.parse().unwrap();
        assert_eq!(parsed, id);

        let bare: RequestId = id.as_uuid().to_string().parse().unwrap();
        assert_eq!(bare, id);
    }

    #[test]
    fn test_request_id_rejects_garbage() {
        assert!("req-not-a-uuid".parse::<RequestId>().is_err());
    }

    #[test]
    fn test_anonymous_carries_no_privilege() {
        let ctx = RequestContext::anonymous();
        assert!(!ctx.is_authenticated());
        assert!(ctx.subject_id().is_empty());
        assert!(ctx.tenant_id().is_empty());
        assert!(ctx.roles().is_empty());
        assert!(ctx.service_catalog().is_empty());
        assert_eq!(ctx.log_id(), "anonymous");
    }

    #[test]
    fn test_builder() {
        let ctx = RequestContext::builder("u1", "t1")
            .subject_name("alice")
            .tenant_name("demo")
            .roles(["member", "reader"])
            .role("admin")
            .service(ServiceEndpoint::new("image", "glance").with_endpoint(
                "public",
                "RegionOne",
                "http://glance:9292",
            ))
            .build();

        assert!(ctx.is_authenticated());
        assert_eq!(ctx.subject_id(), "u1");
        assert_eq!(ctx.subject_name(), Some("alice"));
        assert_eq!(ctx.tenant_id(), "t1");
        assert_eq!(ctx.tenant_name(), Some("demo"));
        assert_eq!(ctx.roles().len(), 3);
        assert!(ctx.is_admin());
        assert_eq!(ctx.service_catalog().len(), 1);
        assert_eq!(ctx.service_catalog()[0].endpoints[0].url, "http://glance:9292");
        assert_eq!(ctx.log_id(), "user:u1@t1");
    }

    #[test]
    fn test_catalog_serde_uses_type_key() {
        let svc = ServiceEndpoint::new("compute", "nova");
        let json = serde_json::to_value(&svc).unwrap();
        assert_eq!(json["type"], "compute");

        let back: ServiceEndpoint =
            serde_json::from_str(r#"{"type":"image","endpoints":[{"url":"http://x"}]}"#).unwrap();
        assert_eq!(back.service_type, "image");
        assert!(back.name.is_empty());
        assert_eq!(back.endpoints[0].url, "http://x");
    }
}
