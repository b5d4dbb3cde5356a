//! # Arbiter Server
//!
//! The Arbiter policy decision point: a small HTTP service that answers
//! "may this caller perform this action?" for other services.
//!
//! ```text
//!                ┌──────────────────────── PdpService ───────────────────────┐
//!   HTTP  ──►    │ RequestId → AccessLog → VersionNegotiation → AuthContext  │
//!                │                                                   │       │
//!                │                       DecisionRouter ◄────────────┘       │
//!                │        check / enforce │           │ ics_api              │
//!                │                 PolicyEngine   IntrospectionResult        │
//!                └───────────────────────────────────────────────────────────┘
//!   /_arbiter/health, /ready, /metrics, /version bypass the pipeline.
//! ```
//!
//! # Example
//!
//! ```bash
//! $ arbiter-pdp --config /etc/arbiter/pdp.toml
//!
//! $ curl -H 'X-Auth-Token: tok-123' -H 'X-Action: get_image' \
//!        -H 'X-Target: {"owner": "t1"}' http://localhost:9292/v1/pdp/check
//! True
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod extract;
pub mod format;
pub mod health;
pub mod router;
pub mod server;
pub mod service;
pub mod shutdown;

pub use config::PdpConfig;
pub use error::{ServerError, ServerResult};
pub use health::HealthChecker;
pub use router::{DecisionRouter, Route};
pub use server::{serve, spawn, PdpServer};
pub use service::{PdpService, RefusedBody};
pub use shutdown::ShutdownSignal;

/// Version of the decision service.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
