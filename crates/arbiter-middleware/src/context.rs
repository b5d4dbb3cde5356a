//! Middleware context types.
//!
//! The [`MiddlewareContext`] carries per-request state through the pipeline:
//! the request id, the negotiated API version, the version-relative route
//! path and, once the auth context stage has run, the caller's
//! [`RequestContext`].

use arbiter_core::{RequestContext, RequestId};
use std::time::{Duration, Instant};

use crate::version::ApiVersion;

/// Context that flows through the middleware pipeline.
///
/// # Example
///
/// ```
/// use arbiter_core::RequestContext;
/// use arbiter_middleware::MiddlewareContext;
///
/// let mut ctx = MiddlewareContext::new();
/// assert!(ctx.identity().is_none());
///
/// ctx.set_identity(RequestContext::anonymous());
/// assert!(!ctx.identity().unwrap().is_authenticated());
/// ```
#[derive(Debug, Clone)]
pub struct MiddlewareContext {
    request_id: RequestId,
    api_version: Option<ApiVersion>,
    route_path: Option<String>,
    identity: Option<RequestContext>,
    started_at: Instant,
}

impl MiddlewareContext {
    /// Creates a new middleware context with a fresh request ID.
    #[must_use]
    pub fn new() -> Self {
        Self::with_request_id(RequestId::new())
    }

    /// Creates a context with a specific request ID.
    #[must_use]
    pub fn with_request_id(request_id: RequestId) -> Self {
        Self {
            request_id,
            api_version: None,
            route_path: None,
            identity: None,
            started_at: Instant::now(),
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Sets the request ID.
    ///
    /// Only the request id stage calls this.
    pub fn set_request_id(&mut self, request_id: RequestId) {
        self.request_id = request_id;
    }

    /// Returns the negotiated API version.
    #[must_use]
    pub const fn api_version(&self) -> Option<ApiVersion> {
        self.api_version
    }

    /// Records the negotiated API version and the path below the version
    /// prefix (`/v1/pdp/check` is recorded as `/pdp/check`).
    pub fn set_api_version(&mut self, version: ApiVersion, route_path: impl Into<String>) {
        self.api_version = Some(version);
        self.route_path = Some(route_path.into());
    }

    /// Returns the version-relative path, once negotiated.
    #[must_use]
    pub fn route_path(&self) -> Option<&str> {
        self.route_path.as_deref()
    }

    /// Returns the caller's context, once resolved.
    #[must_use]
    pub const fn identity(&self) -> Option<&RequestContext> {
        self.identity.as_ref()
    }

    /// Attaches the caller's context.
    ///
    /// Only the auth context stage calls this.
    pub fn set_identity(&mut self, identity: RequestContext) {
        self.identity = Some(identity);
    }

    /// Returns when the request started processing.
    #[must_use]
    pub const fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for MiddlewareContext {
    fn default() -> Self {
        Self::new()
    }
}
