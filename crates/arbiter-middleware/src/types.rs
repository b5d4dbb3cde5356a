//! Common types used throughout the middleware pipeline.

use arbiter_core::{PdpError, RequestId};
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;

/// The HTTP request type used in the middleware pipeline.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type used in the middleware pipeline.
pub type Response = http::Response<Full<Bytes>>;

/// Content type for JSON bodies.
pub const APPLICATION_JSON: &str = "application/json";

/// Content type for plain text bodies.
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Extension trait for building responses.
pub trait ResponseExt {
    /// Creates a plain text response.
    fn text(status: StatusCode, body: impl Into<Bytes>) -> Response;

    /// Creates a JSON response.
    ///
    /// Falls back to a plain 500 if `body` cannot be serialized.
    fn json<T: Serialize>(status: StatusCode, body: &T) -> Response;

    /// Creates the error envelope response for `err`.
    fn pdp_error(err: &PdpError, request_id: RequestId) -> Response;
}

impl ResponseExt for Response {
    fn text(status: StatusCode, body: impl Into<Bytes>) -> Response {
        let mut response = Response::new(Full::new(body.into()));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
        response
    }

    fn json<T: Serialize>(status: StatusCode, body: &T) -> Response {
        match serde_json::to_vec(body) {
            Ok(bytes) => {
                let mut response = Response::new(Full::new(Bytes::from(bytes)));
                *response.status_mut() = status;
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
                response
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize response body");
                Self::text(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }

    fn pdp_error(err: &PdpError, request_id: RequestId) -> Response {
        let envelope = err.to_envelope(Some(&request_id.to_string()));
        Self::json(err.status_code(), &envelope)
    }
}
