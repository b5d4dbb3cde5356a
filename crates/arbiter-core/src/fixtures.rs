//! Test fixtures shared across the Arbiter crates.
//!
//! # Example
//!
//! ```
//! use arbiter_core::fixtures;
//!
//! let ctx = fixtures::admin_context();
//! assert_eq!(ctx.subject_id(), "u1");
//! assert!(ctx.is_admin());
//! ```

use crate::context::{RequestContext, ServiceEndpoint};

/// A two-service catalog (image + compute) in `RegionOne`.
#[must_use]
pub fn sample_catalog() -> Vec<ServiceEndpoint> {
    vec![
        ServiceEndpoint::new("image", "glance")
            .with_endpoint("public", "RegionOne", "http://glance.example.com:9292")
            .with_endpoint("internal", "RegionOne", "http://glance.internal:9292"),
        ServiceEndpoint::new("compute", "nova")
            .with_endpoint("public", "RegionOne", "http://nova.example.com:8774/v2.1"),
    ]
}

/// Subject `u1` in tenant `t1` holding the `admin` role.
#[must_use]
pub fn admin_context() -> RequestContext {
    RequestContext::builder("u1", "t1")
        .role("admin")
        .service_catalog(sample_catalog())
        .build()
}

/// Subject `u2` in tenant `t2` holding the `member` role.
#[must_use]
pub fn member_context() -> RequestContext {
    RequestContext::builder("u2", "t2")
        .role("member")
        .service_catalog(sample_catalog())
        .build()
}
