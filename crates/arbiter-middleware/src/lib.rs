//! # Arbiter Middleware
//!
//! The request pipeline of the Arbiter policy decision point.
//!
//! ```text
//! Request → RequestId → AccessLog → VersionNegotiation → AuthContext → Router
//!              │            │               │                  │
//!              │            │               ├─ discovery (300/200)
//!              │            │               └─ 406 UnsupportedVersion
//!              │            │                                  ├─ 401 InvalidCredential
//!              │            │                                  └─ 503 BackendUnavailable
//!              │            └─ span, access log, request metrics
//!              └─ X-Request-Id on every response
//! ```
//!
//! Each stage implements [`Middleware`] and may answer the request itself.
//! The router is the terminal handler passed to [`Pipeline::process`]; it
//! only runs once a request has a negotiated version and a resolved
//! [`RequestContext`](arbiter_core::RequestContext).
//!
//! ## Example
//!
//! ```
//! use arbiter_middleware::pipeline::Stage;
//!
//! let stages = Stage::all();
//! assert_eq!(stages.len(), 4);
//! assert_eq!(stages[0].name(), "request_id");
//! assert_eq!(stages[3].name(), "auth_context");
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod middleware;
pub mod pipeline;
pub mod stages;
pub mod types;
pub mod version;

pub use context::MiddlewareContext;
pub use middleware::{BoxFuture, Handler, Middleware, Next};
pub use pipeline::{Pipeline, PipelineBuilder, Stage};
pub use types::{Request, Response, ResponseExt};
pub use version::{ApiVersion, VersionChoices, VersionDetail, VersionStatus};
