//! # Arbiter Core
//!
//! Core types for the Arbiter policy decision point.
//!
//! This crate provides the types shared by every stage of the decision
//! pipeline:
//!
//! - [`RequestContext`] - The authenticated (or anonymous) identity of one request
//! - [`RequestId`] - UUID v7 request identifier
//! - [`ActionQuery`] / [`Decision`] - One decision request and its outcome
//! - [`IntrospectionKind`] / [`IntrospectionResult`] - Identity introspection projections
//! - [`PdpError`] - The error taxonomy, with HTTP status mapping

#![doc(html_root_url = "https://docs.rs/arbiter-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
pub mod fixtures;
pub mod metric_names;
mod query;

pub use context::{Endpoint, RequestContext, RequestContextBuilder, RequestId, ServiceEndpoint};
pub use error::{ErrorDetail, ErrorEnvelope, PdpError, PdpResult};
pub use query::{ActionQuery, Decision, IntrospectionKind, IntrospectionResult, Target};
