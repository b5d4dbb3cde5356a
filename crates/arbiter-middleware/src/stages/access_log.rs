//! Access log middleware.
//!
//! Opens the per-request tracing span (`request_id`, `method`, `path`) that
//! every later log line is recorded under, then writes one access log line
//! and updates the request metrics once the response is ready:
//!
//! - `arbiter_requests_total{method, status}`
//! - `arbiter_request_duration_seconds{method}`
//!
//! Extension methods are counted under `method="OTHER"`.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use arbiter_core::metric_names::{REQUESTS_TOTAL, REQUEST_DURATION_SECONDS};
use http::Method;
use metrics::{counter, histogram};
use std::time::Instant;
use tracing::{info, info_span, Instrument};

/// Middleware that logs and counts every request.
#[derive(Debug, Clone, Default)]
pub struct AccessLogMiddleware;

impl AccessLogMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for AccessLogMiddleware {
    fn name(&self) -> &'static str {
        "access_log"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let start = Instant::now();
            let method = request.method().to_string();
            let method_label = method_label(request.method());
            let path = request.uri().path().to_string();
            let span = info_span!(
                "request",
                request_id = %ctx.request_id(),
                method = %method,
                path = %path,
            );

            let response = next.run(ctx, request).instrument(span.clone()).await;

            let duration = start.elapsed();
            let status = response.status().as_u16();
            span.in_scope(|| {
                info!(
                    status,
                    duration_ms = duration.as_secs_f64() * 1000.0,
                    subject = %ctx.identity().map_or_else(|| "-".to_string(), |id| id.log_id()),
                    "request completed"
                );
            });

            counter!(
                REQUESTS_TOTAL,
                "method" => method_label,
                "status" => status.to_string()
            )
            .increment(1);
            histogram!(REQUEST_DURATION_SECONDS, "method" => method_label)
                .record(duration.as_secs_f64());

            response
        })
    }
}

/// Metric label for `method`. Keeps the label set bounded.
fn method_label(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        Method::HEAD => "HEAD",
        Method::OPTIONS => "OPTIONS",
        Method::PATCH => "PATCH",
        Method::CONNECT => "CONNECT",
        Method::TRACE => "TRACE",
        _ => "OTHER",
    }
}
