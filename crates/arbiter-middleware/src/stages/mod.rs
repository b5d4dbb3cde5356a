//! Pipeline stages, in pipeline order.
//!
//! 1. [`request_id`] - assign and echo the request id
//! 2. [`access_log`] - request span, access log, request metrics
//! 3. [`version_negotiation`] - discovery, version prefix, 406
//! 4. [`auth_context`] - credential to request context

pub mod access_log;
pub mod auth_context;
pub mod request_id;
pub mod version_negotiation;

pub use access_log::AccessLogMiddleware;
pub use auth_context::{AuthContextMiddleware, DEFAULT_TOKEN_HEADER};
pub use request_id::{RequestIdMiddleware, REQUEST_ID_HEADER};
pub use version_negotiation::{VersionNegotiationMiddleware, MEDIA_TYPE_PREFIX};
