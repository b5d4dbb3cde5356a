//! Request ID middleware.
//!
//! Every response carries `X-Request-Id`. By default a fresh UUID v7 id is
//! generated for each request; when incoming ids are trusted, a well-formed
//! `X-Request-Id` (`req-<uuid>` or a bare UUID) from the caller is reused.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use arbiter_core::RequestId;
use http::HeaderValue;

/// The header name for request ID propagation.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Middleware that generates or propagates request IDs.
#[derive(Debug, Clone, Default)]
pub struct RequestIdMiddleware {
    trust_incoming: bool,
}

impl RequestIdMiddleware {
    /// Creates a middleware that always generates new ids.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a middleware that reuses well-formed incoming ids.
    #[must_use]
    pub const fn trust_incoming() -> Self {
        Self {
            trust_incoming: true,
        }
    }

    fn extract_request_id(&self, request: &Request) -> Option<RequestId> {
        if !self.trust_incoming {
            return None;
        }

        request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
    }
}

impl Middleware for RequestIdMiddleware {
    fn name(&self) -> &'static str {
        "request_id"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let request_id = self
                .extract_request_id(&request)
                .unwrap_or_else(RequestId::new);
            ctx.set_request_id(request_id);

            let mut response = next.run(ctx, request).await;

            if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            response
        })
    }
}
