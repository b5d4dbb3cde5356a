//! HTTP server.
//!
//! Accepts HTTP/1.1 connections, buffers each request body (bounded by
//! `server.max_body_size`) and hands the request to [`PdpService`]. An
//! oversized body is dropped and the request marked with [`RefusedBody`],
//! so it still goes through the pipeline.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arbiter_core::PdpError;
use arbiter_middleware::Request;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::PdpConfig;
use crate::error::{ServerError, ServerResult};
use crate::service::{PdpService, RefusedBody};
use crate::shutdown::ShutdownSignal;

/// How long in-flight connections get to finish after shutdown.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause after a failed accept, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// The decision service's HTTP server.
#[derive(Debug)]
pub struct PdpServer {
    config: Arc<PdpConfig>,
    service: Arc<PdpService>,
}

impl PdpServer {
    /// Create a server, assembling the service from `config`.
    pub fn new(config: PdpConfig) -> ServerResult<Self> {
        let service = PdpService::from_config(&config)?;
        Ok(Self::with_service(config, service))
    }

    /// Create a server around an already assembled service.
    pub fn with_service(config: PdpConfig, service: PdpService) -> Self {
        Self {
            config: Arc::new(config),
            service: Arc::new(service),
        }
    }

    /// Returns the service.
    pub fn service(&self) -> &Arc<PdpService> {
        &self.service
    }

    /// Run until SIGTERM or SIGINT.
    pub async fn run(self) -> ServerResult<()> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Run until `shutdown` is triggered.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::bind(format!("failed to bind to {addr}: {e}")))?;

        info!(%addr, version = crate::VERSION, "Arbiter policy decision point listening");

        serve(listener, self.service, self.config.server.max_body_size, shutdown).await
    }
}

/// Serves connections from `listener` until `shutdown` is triggered, then
/// waits up to [`DRAIN_TIMEOUT`] for open connections to finish.
pub async fn serve(
    listener: TcpListener,
    service: Arc<PdpService>,
    max_body_size: usize,
    shutdown: ShutdownSignal,
) -> ServerResult<()> {
    let mut connections = JoinSet::new();
    service.health().set_ready(true);

    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    let service = Arc::clone(&service);
                    let shutdown = shutdown.clone();
                    connections.spawn(
                        serve_connection(stream, service, max_body_size, shutdown)
                            .instrument(info_span!("connection", %peer)),
                    );
                }
                Err(e) => accept_failed(&e).await,
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            () = shutdown.recv() => {
                info!("shutdown signal received, no longer accepting connections");
                break;
            }
        }
    }

    service.health().set_ready(false);

    let open = connections.len();
    if open > 0 {
        info!(connections = open, timeout = ?DRAIN_TIMEOUT, "draining connections");
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(connections = connections.len(), "drain timeout reached, closing connections");
            connections.abort_all();
        }
    }

    info!("server stopped");
    Ok(())
}

async fn accept_failed(e: &std::io::Error) {
    error!(error = %e, "failed to accept connection");
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

async fn serve_connection(
    stream: TcpStream,
    service: Arc<PdpService>,
    max_body_size: usize,
    shutdown: ShutdownSignal,
) {
    let io = TokioIo::new(stream);
    let handler = service_fn(move |request: http::Request<Incoming>| {
        let service = Arc::clone(&service);
        async move {
            let request = buffer(request, max_body_size).await;
            Ok::<_, Infallible>(service.handle(request).await)
        }
    });

    let conn = http1::Builder::new().serve_connection(io, handler);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown.recv() => {
            // Finish the in-flight request, then close.
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(e) = result {
        debug!(error = %e, "connection error");
    }
}

/// Buffers the body of `request`, refusing bodies over `limit` bytes.
async fn buffer(request: http::Request<Incoming>, limit: usize) -> Request {
    let (mut parts, body) = request.into_parts();
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Request::from_parts(parts, Full::new(collected.to_bytes())),
        Err(e) => {
            let err = if e.downcast_ref::<LengthLimitError>().is_some() {
                PdpError::malformed_query(format!("request body exceeds {limit} bytes"))
            } else {
                PdpError::malformed_query(format!("failed to read request body: {e}"))
            };
            debug!(error = %err, "request body refused");
            parts.extensions.insert(RefusedBody(err));
            Request::from_parts(parts, Full::default())
        }
    }
}

/// Binds `addr` and serves in the background; returns the bound address.
///
/// For tests and embedding: readiness and shutdown are driven through
/// `service` and `shutdown`.
pub async fn spawn(
    addr: SocketAddr,
    service: Arc<PdpService>,
    max_body_size: usize,
    shutdown: ShutdownSignal,
) -> ServerResult<SocketAddr> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::bind(format!("failed to bind to {addr}: {e}")))?;
    let local = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = serve(listener, service, max_body_size, shutdown).await {
            error!(error = %e, category = e.category(), "server failed");
        }
    });

    Ok(local)
}
