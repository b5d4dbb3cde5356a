//! The decision service: pipeline, router and health, assembled from
//! configuration.

use std::sync::Arc;

use arbiter_core::{PdpError, RequestId};
use arbiter_identity::{
    AuthMode, CacheConfig, CachingBackend, IdentityBackend, IdentityResolver, KeystoneBackend,
    StaticBackend, StaticMode,
};
use arbiter_middleware::stages::{
    AccessLogMiddleware, AuthContextMiddleware, RequestIdMiddleware,
    VersionNegotiationMiddleware, REQUEST_ID_HEADER,
};
use arbiter_middleware::{MiddlewareContext, Pipeline, Request, Response, ResponseExt};
use arbiter_policy::{PolicyDecider, PolicyEngine};
use bytes::Bytes;
use http::{HeaderName, HeaderValue};
use http_body_util::BodyExt;
use tracing::{error, info};

use crate::config::{BackendKind, IdentitySettings, PdpConfig};
use crate::error::{ServerError, ServerResult};
use crate::health::{HealthChecker, OPERATIONAL_PREFIX};
use crate::router::{DecisionRouter, RoutedRequest};

/// Marks a request whose body the server refused to buffer.
///
/// The request still runs the pipeline with an empty body, so it is stamped,
/// logged and authenticated; the router is never reached and the carried
/// error becomes the response.
#[derive(Debug, Clone)]
pub struct RefusedBody(pub PdpError);

/// The assembled decision service.
///
/// Cheap to share behind an `Arc`; it holds no per-request state.
#[derive(Debug)]
pub struct PdpService {
    pipeline: Pipeline,
    router: Arc<DecisionRouter>,
    health: Arc<HealthChecker>,
}

impl PdpService {
    /// Assembles the service from its parts.
    ///
    /// `rule_count` feeds the readiness check.
    pub fn new(
        config: &PdpConfig,
        resolver: IdentityResolver,
        engine: Arc<dyn PolicyDecider>,
        rule_count: usize,
    ) -> ServerResult<Self> {
        let token_header = HeaderName::try_from(config.auth.token_header.as_str())
            .map_err(|_| ServerError::config("token_header is not a valid header name"))?;

        let request_id = if config.server.trust_incoming_request_id {
            RequestIdMiddleware::trust_incoming()
        } else {
            RequestIdMiddleware::new()
        };
        let mut versions = VersionNegotiationMiddleware::new(config.api.enable_v1);
        if let Some(base_url) = &config.api.public_base_url {
            versions = versions.with_base_url(base_url.clone());
        }
        let api_versions = versions.versions().to_vec();
        let mode = resolver.mode();

        let pipeline = Pipeline::builder()
            .stage(request_id)
            .stage(AccessLogMiddleware::new())
            .stage(versions)
            .stage(AuthContextMiddleware::new(resolver).with_header(token_header))
            .build();

        let router = DecisionRouter::new(engine).with_introspection(config.api.introspection_enabled);
        let health = HealthChecker::new(rule_count, mode)
            .with_api_versions(&api_versions)
            .with_metrics(config.telemetry.metrics_enabled);

        Ok(Self {
            pipeline,
            router: Arc::new(router),
            health: Arc::new(health),
        })
    }

    /// Builds the identity backend, loads the rules and assembles the
    /// service.
    pub fn from_config(config: &PdpConfig) -> ServerResult<Self> {
        let rules = config.policy.load()?;
        let rule_count = rules.len();
        if rules.is_empty() {
            // Fail closed: every action is denied until rules are loaded.
            error!("no policy rules loaded, every action will be denied");
        }

        let resolver = match config.auth.mode {
            AuthMode::Authenticated => IdentityResolver::authenticated(build_backend(&config.identity)?),
            AuthMode::Unauthenticated => IdentityResolver::unauthenticated(),
        };

        info!(
            rules = rule_count,
            auth_mode = %config.auth.mode,
            v1_enabled = config.api.enable_v1,
            "decision service assembled"
        );

        Self::new(config, resolver, Arc::new(PolicyEngine::new(rules)), rule_count)
    }

    /// Returns the health checker.
    pub fn health(&self) -> &Arc<HealthChecker> {
        &self.health
    }

    /// Returns the pipeline.
    pub const fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Handles one request.
    pub async fn handle(&self, request: Request) -> Response {
        if request.uri().path().starts_with(OPERATIONAL_PREFIX) {
            let request_id = RequestId::new();
            let mut response = self.health.handle(request.uri().path(), request_id);
            if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            return response;
        }

        let router = Arc::clone(&self.router);
        self.pipeline
            .process(MiddlewareContext::new(), request, move |ctx, request| {
                let request_id = ctx.request_id();
                let route_path = ctx.route_path().map(ToString::to_string);
                let identity = ctx.identity().cloned();

                Box::pin(async move {
                    let (Some(path), Some(identity)) = (route_path, identity) else {
                        let err = PdpError::internal("request reached the router unresolved");
                        return Response::pdp_error(&err, request_id);
                    };

                    let (parts, body) = request.into_parts();
                    if let Some(RefusedBody(err)) = parts.extensions.get::<RefusedBody>() {
                        return Response::pdp_error(err, request_id);
                    }
                    // A `Full` body cannot fail.
                    let body: Bytes = body
                        .collect()
                        .await
                        .map(http_body_util::Collected::to_bytes)
                        .unwrap_or_default();

                    router.dispatch(&RoutedRequest {
                        method: &parts.method,
                        path: &path,
                        headers: &parts.headers,
                        body: &body,
                        identity: &identity,
                        request_id,
                    })
                })
            })
            .await
    }
}

fn build_backend(settings: &IdentitySettings) -> ServerResult<Arc<dyn IdentityBackend>> {
    let cache = settings.cache_config();
    let backend = match settings.backend {
        BackendKind::Keystone => {
            let backend = KeystoneBackend::new(&settings.keystone_config())?;
            info!(url = %settings.url, cache_ttl = ?cache.ttl, "using keystone identity backend");
            with_cache(backend, cache)
        }
        BackendKind::Static => {
            let backend = match settings.static_mode {
                StaticMode::StaticTokens => StaticBackend::tokens(settings.static_tokens.clone()),
                StaticMode::AcceptAll => {
                    let identity = settings
                        .static_identity
                        .clone()
                        .ok_or_else(|| ServerError::config("accept_all mode needs static_identity"))?;
                    StaticBackend::accept_all(identity)
                }
            };
            info!(mode = ?settings.static_mode, "using static identity backend");
            // Static lookups are already local.
            Arc::new(backend) as Arc<dyn IdentityBackend>
        }
    };
    Ok(backend)
}

fn with_cache<B: IdentityBackend + 'static>(backend: B, cache: CacheConfig) -> Arc<dyn IdentityBackend> {
    if cache.is_enabled() {
        Arc::new(CachingBackend::new(backend, cache))
    } else {
        Arc::new(backend)
    }
}
