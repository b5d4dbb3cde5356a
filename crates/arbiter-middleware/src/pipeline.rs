//! Ordered middleware pipeline.
//!
//! The decision service runs every API request through four stages, in this
//! order, before the router sees it:
//!
//! 1. **Request ID** - assign the request id, echo it as `X-Request-Id`
//! 2. **Access Log** - request span, access log line, request metrics
//! 3. **Version Negotiation** - discovery documents, strip `/v1`, 406
//! 4. **Auth Context** - resolve the credential into a request context
//!
//! Any stage may answer the request itself; the stages after it and the
//! handler then never run.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use std::sync::Arc;

/// A type-erased middleware.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// An immutable, ordered list of middleware stages.
///
/// # Example
///
/// ```
/// use arbiter_middleware::pipeline::Pipeline;
/// use arbiter_middleware::stages::RequestIdMiddleware;
///
/// let pipeline = Pipeline::builder()
///     .stage(RequestIdMiddleware::new())
///     .build();
/// assert_eq!(pipeline.stage_names(), ["request_id"]);
/// ```
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<BoxedMiddleware>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Runs `request` through every stage, then `handler`.
    pub async fn process<H>(&self, mut ctx: MiddlewareContext, request: Request, handler: H) -> Response
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'static,
    {
        let next = self.build_chain(handler);
        next.run(&mut ctx, request).await
    }

    fn build_chain<'a, H>(&'a self, handler: H) -> Next<'a>
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        let mut next = Next::handler(handler);
        for middleware in self.stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }
        next
    }

    /// Returns the stage names in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|mw| mw.name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<BoxedMiddleware>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage<M: Middleware>(mut self, middleware: M) -> Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
        }
    }
}

/// The standard stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Request id assignment.
    RequestId = 1,
    /// Access logging and request metrics.
    AccessLog = 2,
    /// API version negotiation.
    VersionNegotiation = 3,
    /// Credential resolution.
    AuthContext = 4,
}

impl Stage {
    /// Returns the stage name, matching [`Middleware::name`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RequestId => "request_id",
            Self::AccessLog => "access_log",
            Self::VersionNegotiation => "version_negotiation",
            Self::AuthContext => "auth_context",
        }
    }

    /// Returns all stages in order.
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [
            Self::RequestId,
            Self::AccessLog,
            Self::VersionNegotiation,
            Self::AuthContext,
        ]
    }
}
