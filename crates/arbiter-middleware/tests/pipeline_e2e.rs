//! End-to-end pipeline tests.
//!
//! All four stages run together in their standard order, with a handler
//! that records what it saw.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use arbiter_core::RequestContext;
use arbiter_identity::{BackendError, IdentityBackend, IdentityClaims, IdentityResolver};
use arbiter_middleware::{
    pipeline::{Pipeline, Stage},
    stages::{
        AccessLogMiddleware, AuthContextMiddleware, RequestIdMiddleware,
        VersionNegotiationMiddleware, REQUEST_ID_HEADER,
    },
    MiddlewareContext, Request, Response, ResponseExt,
};
use bytes::Bytes;
use http::{Request as HttpRequest, StatusCode};
use http_body_util::{BodyExt, Full};

/// Backend that counts calls and answers from a fixed script.
#[derive(Debug)]
struct ScriptedBackend {
    calls: AtomicUsize,
    answer: Result<IdentityClaims, BackendError>,
}

#[async_trait::async_trait]
impl IdentityBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn validate(&self, _token: &str) -> Result<IdentityClaims, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}

fn backend(answer: Result<IdentityClaims, BackendError>) -> Arc<ScriptedBackend> {
    Arc::new(ScriptedBackend {
        calls: AtomicUsize::new(0),
        answer,
    })
}

fn admin_claims() -> IdentityClaims {
    IdentityClaims {
        subject_id: "u1".into(),
        tenant_id: "t1".into(),
        roles: vec!["admin".into()],
        ..IdentityClaims::default()
    }
}

fn build_pipeline(resolver: IdentityResolver) -> Pipeline {
    Pipeline::builder()
        .stage(RequestIdMiddleware::new())
        .stage(AccessLogMiddleware::new())
        .stage(VersionNegotiationMiddleware::default())
        .stage(AuthContextMiddleware::new(resolver))
        .build()
}

fn make_request(path: &str, token: Option<&str>) -> Request {
    let mut builder = HttpRequest::builder().method("GET").uri(path);
    if let Some(token) = token {
        builder = builder.header("x-auth-token", token);
    }
    builder.body(Full::new(Bytes::new())).unwrap()
}

#[derive(Debug, Default, Clone)]
struct Seen {
    calls: usize,
    route_path: Option<String>,
    identity: Option<RequestContext>,
}

async fn run(pipeline: &Pipeline, request: Request) -> (Response, Seen) {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let recorder = seen.clone();
    let response = pipeline
        .process(MiddlewareContext::new(), request, move |ctx, _req| {
            let mut seen = recorder.lock().unwrap();
            seen.calls += 1;
            seen.route_path = ctx.route_path().map(ToString::to_string);
            seen.identity = ctx.identity().cloned();
            Box::pin(async { Response::text(StatusCode::OK, "routed") })
        })
        .await;
    let seen = seen.lock().unwrap().clone();
    (response, seen)
}

async fn error_code(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    body["error"]["code"].as_str().unwrap().to_string()
}

#[test]
fn stage_names_follow_standard_order() {
    let pipeline = build_pipeline(IdentityResolver::unauthenticated());
    let expected: Vec<&str> = Stage::all().iter().map(|s| s.name()).collect();
    assert_eq!(pipeline.stage_names(), expected);
}

#[tokio::test]
async fn valid_token_reaches_router_with_context() {
    let backend = backend(Ok(admin_claims()));
    let pipeline = build_pipeline(IdentityResolver::authenticated(backend.clone()));

    let (response, seen) = run(&pipeline, make_request("/v1/pdp/check", Some("tok-123"))).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    assert_eq!(seen.calls, 1);
    assert_eq!(seen.route_path.as_deref(), Some("/pdp/check"));
    let identity = seen.identity.unwrap();
    assert_eq!(identity.subject_id(), "u1");
    assert!(identity.has_role("admin"));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_token_is_rejected_on_every_path() {
    let backend = backend(Ok(admin_claims()));
    let pipeline = build_pipeline(IdentityResolver::authenticated(backend.clone()));

    for path in ["/v1/pdp/check", "/v1/pdp/enforce", "/v1/ics_api/my_roles", "/v1/nowhere"] {
        let (response, seen) = run(&pipeline, make_request(path, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{path}");
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        assert_eq!(error_code(response).await, "InvalidCredential");
        assert_eq!(seen.calls, 0, "{path}");
    }
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn backend_failure_is_503_and_router_not_reached() {
    let pipeline = build_pipeline(IdentityResolver::authenticated(backend(Err(
        BackendError::unavailable("connection refused"),
    ))));

    let (response, seen) = run(&pipeline, make_request("/v1/pdp/check", Some("tok-123"))).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_code(response).await, "BackendUnavailable");
    assert_eq!(seen.calls, 0);
}

#[tokio::test]
async fn unauthenticated_mode_never_contacts_backend() {
    let pipeline = build_pipeline(IdentityResolver::unauthenticated());

    let (response, seen) = run(&pipeline, make_request("/v1/pdp/check", Some("tok-123"))).await;

    assert_eq!(response.status(), StatusCode::OK);
    let identity = seen.identity.unwrap();
    assert!(!identity.is_authenticated());
    assert!(identity.roles().is_empty());
    assert!(identity.service_catalog().is_empty());
}

#[tokio::test]
async fn version_negotiation_runs_before_authentication() {
    let backend = backend(Ok(admin_claims()));
    let pipeline = build_pipeline(IdentityResolver::authenticated(backend.clone()));

    let (response, _) = run(&pipeline, make_request("/", None)).await;
    assert_eq!(response.status(), StatusCode::MULTIPLE_CHOICES);

    let (response, _) = run(&pipeline, make_request("/v9/pdp/check", Some("tok-123"))).await;
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    assert_eq!(error_code(response).await, "UnsupportedVersion");

    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn request_id_in_error_envelope_matches_header() {
    let pipeline = build_pipeline(IdentityResolver::authenticated(backend(Ok(admin_claims()))));

    let (response, _) = run(&pipeline, make_request("/v1/pdp/check", None)).await;
    let header = response
        .headers()
        .get(REQUEST_ID_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(body["error"]["request_id"], header);
}
