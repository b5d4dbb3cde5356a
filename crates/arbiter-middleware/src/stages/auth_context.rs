//! Auth context middleware.
//!
//! Reads the credential from the token header, resolves it with the
//! [`IdentityResolver`] and attaches the resulting [`RequestContext`] to the
//! middleware context. Requests whose credential cannot be resolved are
//! answered here and never reach the router:
//!
//! - `InvalidCredential` (missing or rejected token): 401
//! - `BackendUnavailable`: 503
//!
//! [`RequestContext`]: arbiter_core::RequestContext

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt};
use arbiter_identity::{AuthMode, IdentityResolver};
use http::HeaderName;
use tracing::{debug, warn};

/// Default credential header.
pub const DEFAULT_TOKEN_HEADER: &str = "x-auth-token";

/// Middleware that resolves the caller's identity.
#[derive(Debug, Clone)]
pub struct AuthContextMiddleware {
    resolver: IdentityResolver,
    header: HeaderName,
}

impl AuthContextMiddleware {
    /// Creates the middleware, reading the credential from `X-Auth-Token`.
    #[must_use]
    pub fn new(resolver: IdentityResolver) -> Self {
        Self {
            resolver,
            header: HeaderName::from_static(DEFAULT_TOKEN_HEADER),
        }
    }

    /// Reads the credential from `header` instead.
    #[must_use]
    pub fn with_header(mut self, header: HeaderName) -> Self {
        self.header = header;
        self
    }

    /// Returns the resolver's mode.
    #[must_use]
    pub const fn mode(&self) -> AuthMode {
        self.resolver.mode()
    }
}

impl Middleware for AuthContextMiddleware {
    fn name(&self) -> &'static str {
        "auth_context"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            // A header that is not valid UTF-8 counts as no credential.
            let credential = request
                .headers()
                .get(&self.header)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .trim()
                .to_string();

            match self.resolver.resolve(&credential).await {
                Ok(identity) => {
                    debug!(subject = %identity.log_id(), "request context attached");
                    ctx.set_identity(identity);
                    next.run(ctx, request).await
                }
                Err(err) => {
                    warn!(code = err.code(), status = err.status_code().as_u16(), "identity resolution failed");
                    Response::pdp_error(&err, ctx.request_id())
                }
            }
        })
    }
}
