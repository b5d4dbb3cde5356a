//! Decision router.
//!
//! Maps the version-stripped path to a decision handler:
//!
//! | Method | Path | Handler |
//! |---|---|---|
//! | GET, POST | `/pdp/check`, `/pdp/check_<service>` | single decision |
//! | GET, POST | `/pdp/enforce`, `/pdp/enforce_<service>` | batch decisions |
//! | GET | `/ics_api/my_roles`, `my_tenant`, `my_service_catalog` | introspection |
//!
//! The `<service>` suffix is accepted for callers that address one endpoint
//! per service; it is recorded in logs and metrics and never affects which
//! rule is evaluated.

use std::sync::Arc;

use arbiter_core::metric_names::ROUTER_QUERIES_TOTAL;
use arbiter_core::{IntrospectionKind, IntrospectionResult, PdpError, PdpResult, RequestContext, RequestId};
use arbiter_middleware::Response;
use arbiter_policy::PolicyDecider;
use http::{HeaderMap, Method};
use metrics::counter;
use tracing::debug;

use crate::extract;
use crate::format;

/// Longest accepted `<service>` alias suffix.
const MAX_SERVICE_LEN: usize = 32;

/// A recognized API route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Single decision, with the optional service alias.
    Check(Option<String>),
    /// Batch decisions, with the optional service alias.
    Enforce(Option<String>),
    /// Identity introspection.
    Introspect(IntrospectionKind),
}

impl Route {
    /// Resolves `method` and the version-stripped `path`.
    ///
    /// Returns `None` for unknown paths and for known paths with the wrong
    /// method.
    pub fn resolve(method: &Method, path: &str) -> Option<Self> {
        let path = path.strip_suffix('/').unwrap_or(path);
        let decision_method = *method == Method::GET || *method == Method::POST;

        if let Some(name) = path.strip_prefix("/pdp/") {
            if !decision_method {
                return None;
            }
            return match name {
                "check" => Some(Self::Check(None)),
                "enforce" => Some(Self::Enforce(None)),
                _ => {
                    if let Some(service) = name.strip_prefix("check_").and_then(service_alias) {
                        Some(Self::Check(Some(service)))
                    } else {
                        name.strip_prefix("enforce_")
                            .and_then(service_alias)
                            .map(|s| Self::Enforce(Some(s)))
                    }
                }
            };
        }

        if let Some(name) = path.strip_prefix("/ics_api/") {
            if *method != Method::GET {
                return None;
            }
            return IntrospectionKind::from_endpoint(name).map(Self::Introspect);
        }

        None
    }

    /// Returns the endpoint name used in logs and metrics.
    pub const fn endpoint(&self) -> &'static str {
        match self {
            Self::Check(_) => "check",
            Self::Enforce(_) => "enforce",
            Self::Introspect(kind) => kind.endpoint(),
        }
    }

    fn service(&self) -> &str {
        match self {
            Self::Check(Some(s)) | Self::Enforce(Some(s)) => s,
            _ => "none",
        }
    }
}

fn service_alias(suffix: &str) -> Option<String> {
    let valid = !suffix.is_empty()
        && suffix.len() <= MAX_SERVICE_LEN
        && suffix
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    valid.then(|| suffix.to_string())
}

/// A request as the router sees it: the version-stripped path and the
/// resolved identity, plus what the handlers read from the HTTP request.
#[derive(Debug)]
pub struct RoutedRequest<'a> {
    /// HTTP method.
    pub method: &'a Method,
    /// Path after version negotiation.
    pub path: &'a str,
    /// Request headers.
    pub headers: &'a HeaderMap,
    /// Request body.
    pub body: &'a [u8],
    /// Caller identity.
    pub identity: &'a RequestContext,
    /// Request id for error envelopes.
    pub request_id: RequestId,
}

/// Dispatches routed requests to the decision handlers.
#[derive(Debug, Clone)]
pub struct DecisionRouter {
    engine: Arc<dyn PolicyDecider>,
    introspection_enabled: bool,
}

impl DecisionRouter {
    /// Creates a router evaluating with `engine`.
    pub fn new(engine: Arc<dyn PolicyDecider>) -> Self {
        Self {
            engine,
            introspection_enabled: true,
        }
    }

    /// Enables or disables the introspection endpoints.
    #[must_use]
    pub fn with_introspection(mut self, enabled: bool) -> Self {
        self.introspection_enabled = enabled;
        self
    }

    /// Handles one request.
    pub fn dispatch(&self, request: &RoutedRequest<'_>) -> Response {
        let result = match Route::resolve(request.method, request.path) {
            Some(route) => self.handle(&route, request),
            None => Err(PdpError::not_found(request.method.as_str(), request.path)),
        };

        result.unwrap_or_else(|err| {
            debug!(code = err.code(), path = request.path, "request refused by router");
            format::error(&err, request.request_id)
        })
    }

    fn handle(&self, route: &Route, request: &RoutedRequest<'_>) -> PdpResult<Response> {
        counter!(
            ROUTER_QUERIES_TOTAL,
            "endpoint" => route.endpoint(),
            "service" => route.service().to_string()
        )
        .increment(1);

        match route {
            Route::Check(_) => {
                let query = extract::single_query(request.headers)?;
                let allowed = self.engine.decide(request.identity, &query);
                debug!(
                    action = %query.action,
                    service = route.service(),
                    allowed,
                    "check decided"
                );
                Ok(format::single(allowed))
            }
            Route::Enforce(_) => {
                let queries = extract::batch_queries(request.headers, request.body)?;
                let decisions = self.engine.decide_all(request.identity, &queries);
                debug!(
                    queries = queries.len(),
                    allowed = decisions.iter().filter(|d| d.allowed).count(),
                    service = route.service(),
                    "enforce decided"
                );
                Ok(format::batch(&decisions))
            }
            Route::Introspect(kind) => {
                if !self.introspection_enabled {
                    return Err(PdpError::forbidden("introspection is disabled"));
                }
                let result = IntrospectionResult::project(request.identity, *kind)?;
                Ok(format::introspection(&result))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_core::fixtures;
    use arbiter_policy::{PolicyEngine, Rule, RuleSet};
    use bytes::Bytes;
    use http::{HeaderValue, StatusCode};
    use http_body_util::BodyExt;

    #[test]
    fn test_resolve_routes() {
        let get = Method::GET;
        let post = Method::POST;

        assert_eq!(Route::resolve(&get, "/pdp/check"), Some(Route::Check(None)));
        assert_eq!(Route::resolve(&post, "/pdp/check/"), Some(Route::Check(None)));
        assert_eq!(Route::resolve(&post, "/pdp/enforce"), Some(Route::Enforce(None)));
        assert_eq!(
            Route::resolve(&get, "/pdp/check_glance"),
            Some(Route::Check(Some("glance".into())))
        );
        assert_eq!(
            Route::resolve(&post, "/pdp/enforce_nova"),
            Some(Route::Enforce(Some("nova".into())))
        );
        assert_eq!(
            Route::resolve(&get, "/ics_api/my_roles"),
            Some(Route::Introspect(IntrospectionKind::Roles))
        );
    }

    #[test]
    fn test_resolve_rejects() {
        assert_eq!(Route::resolve(&Method::DELETE, "/pdp/check"), None);
        assert_eq!(Route::resolve(&Method::POST, "/ics_api/my_roles"), None);
        assert_eq!(Route::resolve(&Method::GET, "/ics_api/my_secrets"), None);
        assert_eq!(Route::resolve(&Method::GET, "/pdp/check_"), None);
        assert_eq!(Route::resolve(&Method::GET, "/pdp/check_Glance"), None);
        assert_eq!(Route::resolve(&Method::GET, "/pdp/decide"), None);
        assert_eq!(Route::resolve(&Method::GET, "/"), None);
    }

    fn router() -> DecisionRouter {
        let rules = RuleSet::new()
            .with_rule("context_is_admin", Rule::role("admin"))
            .with_rule("enforce_glance", Rule::reference("context_is_admin"));
        DecisionRouter::new(Arc::new(PolicyEngine::new(rules)))
    }

    async fn body_of(response: Response) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    fn dispatch(router: &DecisionRouter, method: Method, path: &str, headers: &HeaderMap) -> Response {
        let identity = fixtures::admin_context();
        router.dispatch(&RoutedRequest {
            method: &method,
            path,
            headers,
            body: b"",
            identity: &identity,
            request_id: RequestId::new(),
        })
    }

    #[tokio::test]
    async fn test_check_alias_evaluates_same_rule() {
        let router = router();
        let mut headers = HeaderMap::new();
        headers.insert("x-action", HeaderValue::from_static("enforce_glance"));

        for path in ["/pdp/check", "/pdp/check_glance", "/pdp/check_nova"] {
            let response = dispatch(&router, Method::GET, path, &headers);
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_of(response).await, "True", "{path}");
        }
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let response = dispatch(&router(), Method::GET, "/pdp/unknown", &HeaderMap::new());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_introspection_disabled() {
        let router = router().with_introspection(false);
        let response = dispatch(&router, Method::GET, "/ics_api/my_tenant", &HeaderMap::new());
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_enforce_body() {
        let router = router();
        let identity = fixtures::member_context();
        let body = br#"{"queries": [{"action": "enforce_glance"}, {"action": "nope"}]}"#;
        let response = router.dispatch(&RoutedRequest {
            method: &Method::POST,
            path: "/pdp/enforce",
            headers: &HeaderMap::new(),
            body,
            identity: &identity,
            request_id: RequestId::new(),
        });

        let value: serde_json::Value = serde_json::from_slice(&body_of(response).await).unwrap();
        assert_eq!(value["decisions"][0]["allowed"], false);
        assert_eq!(value["decisions"][1]["action"], "nope");
        assert_eq!(value["decisions"][1]["allowed"], false);
    }
}
