//! Arbiter Identity - credential validation and request context resolution.
//!
//! This crate turns the opaque bearer token carried by a request into a
//! [`RequestContext`](arbiter_core::RequestContext).
//!
//! # Architecture
//!
//! ```text
//!   X-Auth-Token
//!        │
//!        ▼
//!  ┌──────────────────┐   unauthenticated mode
//!  │ IdentityResolver │ ─────────────────────────► anonymous context
//!  └────────┬─────────┘
//!           │ validate(token)
//!  ┌────────▼─────────┐
//!  │  CachingBackend  │  (optional, successful validations only)
//!  └────────┬─────────┘
//!  ┌────────▼─────────┐
//!  │ IdentityBackend  │  KeystoneBackend | StaticBackend
//!  └──────────────────┘
//! ```
//!
//! Backend rejections surface as `InvalidCredential`; anything that prevents
//! the backend from answering surfaces as `BackendUnavailable`. The resolver
//! never retries.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use arbiter_identity::{IdentityResolver, StaticBackend, StaticIdentity};
//!
//! # tokio_test::block_on(async {
//! let backend = StaticBackend::tokens([(
//!     "tok-123",
//!     StaticIdentity::new("u1", "t1").with_roles(["admin"]),
//! )]);
//! let resolver = IdentityResolver::authenticated(Arc::new(backend));
//!
//! let ctx = resolver.resolve("tok-123").await.unwrap();
//! assert!(ctx.has_role("admin"));
//! # });
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod cache;
pub mod keystone;
pub mod resolver;
pub mod static_backend;

pub use backend::{BackendError, IdentityBackend, IdentityClaims};
pub use cache::{CacheConfig, CacheStats, CachingBackend};
pub use keystone::{KeystoneBackend, KeystoneConfig};
pub use resolver::{AuthMode, IdentityResolver};
pub use static_backend::{StaticBackend, StaticIdentity, StaticMode};
