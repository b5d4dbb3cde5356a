//! Version negotiation middleware.
//!
//! Decides which API version a request targets and strips the version
//! prefix before the router sees the path.
//!
//! | Request | Outcome |
//! |---|---|
//! | `GET /` | discovery document, 300 |
//! | `GET /versions` | discovery document, 200 |
//! | `/v1`, `/v1.0`, `/v1.1` | version detail, 200 |
//! | `/v1/...`, `/v1.0/...`, `/v1.1/...` | forward with path `/...` |
//! | `/v<n>[.<m>]/...` not served | `UnsupportedVersion`, 406 |
//! | `Accept: application/vnd.arbiter-v1` on an unversioned path | forward with the full path |
//! | any other unversioned path | discovery document, 300 |

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt};
use crate::version::{looks_like_version, ApiVersion, VersionChoices, VersionDetail};
use arbiter_core::PdpError;
use http::header::{ACCEPT, HOST};
use http::StatusCode;
use tracing::debug;

/// Media type prefix for version selection through `Accept`.
pub const MEDIA_TYPE_PREFIX: &str = "application/vnd.arbiter-";

/// Middleware that negotiates the API version.
#[derive(Debug, Clone)]
pub struct VersionNegotiationMiddleware {
    versions: Vec<ApiVersion>,
    base_url: Option<String>,
}

impl Default for VersionNegotiationMiddleware {
    fn default() -> Self {
        Self::new(true)
    }
}

/// What the `Accept` header asks for.
enum MediaVersion {
    None,
    Supported(ApiVersion),
    Unsupported(String),
}

impl VersionNegotiationMiddleware {
    /// Creates the middleware; `v1_enabled` controls whether the v1 API is
    /// served at all.
    #[must_use]
    pub fn new(v1_enabled: bool) -> Self {
        Self {
            versions: if v1_enabled {
                ApiVersion::ALL.to_vec()
            } else {
                Vec::new()
            },
            base_url: None,
        }
    }

    /// Sets the public base URL used in discovery links. Without it, links
    /// are built from the request's `Host` header.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url = (!base_url.is_empty()).then_some(base_url);
        self
    }

    /// Returns the served versions, newest first.
    #[must_use]
    pub fn versions(&self) -> &[ApiVersion] {
        &self.versions
    }

    fn recognize(&self, id: &str) -> Option<ApiVersion> {
        ApiVersion::parse(id).filter(|v| self.versions.contains(v))
    }

    fn base_url(&self, request: &Request) -> String {
        if let Some(base) = &self.base_url {
            return base.clone();
        }
        request
            .headers()
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .map(|host| format!("http://{host}"))
            .unwrap_or_default()
    }

    fn media_version(&self, request: &Request) -> MediaVersion {
        let mut unsupported = None;
        for value in request.headers().get_all(ACCEPT) {
            let Ok(value) = value.to_str() else { continue };
            for media_type in value.split(',') {
                let essence = media_type.split(';').next().unwrap_or_default().trim();
                let Some(id) = essence.strip_prefix(MEDIA_TYPE_PREFIX) else {
                    continue;
                };
                let id = id.strip_suffix("+json").unwrap_or(id);
                match self.recognize(id) {
                    Some(version) => return MediaVersion::Supported(version),
                    None => unsupported = Some(id.to_string()),
                }
            }
        }
        unsupported.map_or(MediaVersion::None, MediaVersion::Unsupported)
    }

    fn choices(&self, request: &Request, status: StatusCode) -> Response {
        let choices = VersionChoices::new(&self.versions, &self.base_url(request));
        Response::json(status, &choices)
    }
}

impl Middleware for VersionNegotiationMiddleware {
    fn name(&self) -> &'static str {
        "version_negotiation"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let path = request.uri().path().to_string();

            match path.as_str() {
                "/" => return self.choices(&request, StatusCode::MULTIPLE_CHOICES),
                "/versions" | "/versions/" => return self.choices(&request, StatusCode::OK),
                _ => {}
            }

            let trimmed = path.trim_start_matches('/');
            let (segment, rest) = trimmed.split_once('/').unwrap_or((trimmed, ""));

            if let Some(version) = self.recognize(segment) {
                if rest.is_empty() {
                    let detail = VersionDetail::new(version, &self.base_url(&request));
                    return Response::json(StatusCode::OK, &detail);
                }
                debug!(%version, "version selected by path");
                ctx.set_api_version(version, format!("/{rest}"));
                return next.run(ctx, request).await;
            }

            if looks_like_version(segment) {
                debug!(version = segment, "unsupported version requested");
                return Response::pdp_error(&PdpError::unsupported_version(segment), ctx.request_id());
            }

            match self.media_version(&request) {
                MediaVersion::Supported(version) => {
                    debug!(%version, "version selected by media type");
                    ctx.set_api_version(version, path);
                    next.run(ctx, request).await
                }
                MediaVersion::Unsupported(id) => {
                    Response::pdp_error(&PdpError::unsupported_version(id), ctx.request_id())
                }
                MediaVersion::None => self.choices(&request, StatusCode::MULTIPLE_CHOICES),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Request as HttpRequest;
    use http_body_util::{BodyExt, Full};

    fn request(path: &str, accept: Option<&str>) -> Request {
        let mut builder = HttpRequest::builder()
            .uri(path)
            .header(HOST, "pdp.example.com:9292");
        if let Some(accept) = accept {
            builder = builder.header(ACCEPT, accept);
        }
        builder.body(Full::new(Bytes::new())).unwrap()
    }

    /// Runs the stage; returns the response and the route path the handler
    /// saw, if it ran.
    async fn run(
        middleware: &VersionNegotiationMiddleware,
        request: Request,
    ) -> (Response, Option<String>) {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(None));
        let seen_by_handler = seen.clone();
        let mut ctx = MiddlewareContext::new();
        let next = Next::handler(move |ctx: &mut MiddlewareContext, _req| {
            *seen_by_handler.lock().unwrap() = ctx.route_path().map(ToString::to_string);
            Box::pin(async { Response::text(StatusCode::OK, "handled") })
        });
        let response = middleware.process(&mut ctx, request, next).await;
        let seen = seen.lock().unwrap().clone();
        (response, seen)
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_root_returns_choices() {
        let (response, seen) = run(&VersionNegotiationMiddleware::default(), request("/", None)).await;
        assert_eq!(response.status(), StatusCode::MULTIPLE_CHOICES);
        assert!(seen.is_none());

        let body = json_body(response).await;
        assert_eq!(body["versions"][0]["id"], "v1.1");
        assert_eq!(body["versions"][0]["status"], "CURRENT");
        assert_eq!(body["versions"][0]["links"][0]["href"], "http://pdp.example.com:9292/v1/");
        assert_eq!(body["versions"][1]["id"], "v1.0");
    }

    #[tokio::test]
    async fn test_versions_endpoint() {
        let middleware = VersionNegotiationMiddleware::default().with_base_url("https://pdp.internal");
        let (response, _) = run(&middleware, request("/versions", None)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["versions"][0]["links"][0]["href"], "https://pdp.internal/v1/");
    }

    #[tokio::test]
    async fn test_strips_version_prefix() {
        let middleware = VersionNegotiationMiddleware::default();
        for path in ["/v1/pdp/check", "/v1.0/pdp/check", "/v1.1/pdp/check"] {
            let (response, seen) = run(&middleware, request(path, None)).await;
            assert_eq!(response.status(), StatusCode::OK, "{path}");
            assert_eq!(seen.as_deref(), Some("/pdp/check"), "{path}");
        }
    }

    #[tokio::test]
    async fn test_version_root_returns_detail() {
        let (response, seen) = run(&VersionNegotiationMiddleware::default(), request("/v1/", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(seen.is_none());
        assert_eq!(json_body(response).await["version"]["id"], "v1.1");
    }

    #[tokio::test]
    async fn test_unknown_version_is_not_acceptable() {
        let (response, seen) = run(&VersionNegotiationMiddleware::default(), request("/v2/pdp/check", None)).await;
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        assert!(seen.is_none());
        assert_eq!(json_body(response).await["error"]["code"], "UnsupportedVersion");
    }

    #[tokio::test]
    async fn test_disabled_v1_is_not_acceptable() {
        let middleware = VersionNegotiationMiddleware::new(false);
        let (response, _) = run(&middleware, request("/v1/pdp/check", None)).await;
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);

        let (response, _) = run(&middleware, request("/", None)).await;
        assert_eq!(json_body(response).await["versions"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_media_type_selects_version() {
        let middleware = VersionNegotiationMiddleware::default();
        let (response, seen) = run(
            &middleware,
            request("/pdp/check", Some("text/plain, application/vnd.arbiter-v1.0+json;q=0.9")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(seen.as_deref(), Some("/pdp/check"));

        let (response, _) = run(&middleware, request("/pdp/check", Some("application/vnd.arbiter-v3"))).await;
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn test_unversioned_path_returns_choices() {
        let (response, seen) = run(&VersionNegotiationMiddleware::default(), request("/pdp/check", None)).await;
        assert_eq!(response.status(), StatusCode::MULTIPLE_CHOICES);
        assert!(seen.is_none());
    }
}
