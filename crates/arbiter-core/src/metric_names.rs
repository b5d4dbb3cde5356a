//! Metric names shared by the recording crates and the Prometheus exporter.

/// Request counter, labelled `method` and `status`.
pub const REQUESTS_TOTAL: &str = "arbiter_requests_total";
/// Request latency histogram, labelled `method`.
pub const REQUEST_DURATION_SECONDS: &str = "arbiter_request_duration_seconds";
/// Decision counter, labelled `result`.
pub const DECISIONS_TOTAL: &str = "arbiter_decisions_total";
/// Identity resolution counter, labelled `outcome`.
pub const IDENTITY_RESOLUTIONS_TOTAL: &str = "arbiter_identity_resolutions_total";
/// Routed decision query counter, labelled `endpoint` and `service`.
pub const ROUTER_QUERIES_TOTAL: &str = "arbiter_router_queries_total";
