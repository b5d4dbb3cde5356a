//! Response formatting.
//!
//! | Result | Status | Body |
//! |---|---|---|
//! | single decision | 200 | `True` / `False` (text/plain) |
//! | batch | 200 | `{"decisions":[{"action":"a","allowed":true}]}` |
//! | introspection | 200 | `{"roles":[..]}`, `{"tenant_id":".."}`, `{"service_catalog":[..]}` |
//! | error | per taxonomy | `{"error":{"code":..,"message":..,"request_id":..}}` |

use arbiter_core::{Decision, IntrospectionResult, PdpError, RequestId};
use arbiter_middleware::{Response, ResponseExt};
use http::StatusCode;
use serde::Serialize;

#[derive(Serialize)]
struct DecisionBatch<'a> {
    decisions: &'a [Decision],
}

/// Body of a single decision.
#[must_use]
pub const fn decision_text(allowed: bool) -> &'static str {
    if allowed {
        "True"
    } else {
        "False"
    }
}

/// Formats a single decision.
pub fn single(allowed: bool) -> Response {
    Response::text(StatusCode::OK, decision_text(allowed))
}

/// Formats a batch of decisions, in the order given.
pub fn batch(decisions: &[Decision]) -> Response {
    Response::json(StatusCode::OK, &DecisionBatch { decisions })
}

/// Formats an introspection result.
pub fn introspection(result: &IntrospectionResult) -> Response {
    Response::json(StatusCode::OK, result)
}

/// Formats an error.
pub fn error(err: &PdpError, request_id: RequestId) -> Response {
    Response::pdp_error(err, request_id)
}
