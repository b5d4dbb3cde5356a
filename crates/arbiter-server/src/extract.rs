//! Decision query extraction.
//!
//! A query names its action in `X-Action` and its target in `X-Target` (a
//! JSON object of scalar values). Enforce requests may carry several
//! actions, as repeated headers and/or comma-separated lists, all sharing the
//! one target, or a JSON body:
//!
//! ```json
//! {"queries": [{"action": "get_image", "target": {"owner": "t1"}}]}
//! ```
//!
//! A non-empty body takes precedence over the headers.

use arbiter_core::{ActionQuery, PdpError, PdpResult, Target};
use http::HeaderMap;
use serde::Deserialize;
use serde_json::Value;

/// Action header.
pub const ACTION_HEADER: &str = "x-action";

/// Target header.
pub const TARGET_HEADER: &str = "x-target";

#[derive(Debug, Deserialize)]
struct BatchBody {
    #[serde(default)]
    queries: Vec<QueryBody>,
}

#[derive(Debug, Deserialize)]
struct QueryBody {
    action: String,
    #[serde(default)]
    target: Value,
}

/// Extracts the query of a single `check`.
///
/// # Errors
///
/// `MalformedQuery` if there is no action, more than one, or the target is
/// invalid.
pub fn single_query(headers: &HeaderMap) -> PdpResult<ActionQuery> {
    let mut actions = header_actions(headers)?;
    if actions.len() > 1 {
        return Err(PdpError::malformed_query(
            "check takes exactly one action; use enforce for several",
        ));
    }
    let action = actions
        .pop()
        .ok_or_else(|| PdpError::malformed_query("X-Action header is required"))?;
    Ok(ActionQuery::new(action).with_target(header_target(headers)?))
}

/// Extracts the queries of an `enforce`, in request order.
///
/// # Errors
///
/// `MalformedQuery` if the batch is empty, an action is blank, a target is
/// invalid, or the body is not a valid batch document.
pub fn batch_queries(headers: &HeaderMap, body: &[u8]) -> PdpResult<Vec<ActionQuery>> {
    let queries = if body.iter().all(u8::is_ascii_whitespace) {
        let target = header_target(headers)?;
        header_actions(headers)?
            .into_iter()
            .map(|action| ActionQuery::new(action).with_target(target.clone()))
            .collect()
    } else {
        body_queries(body)?
    };

    if queries.is_empty() {
        return Err(PdpError::malformed_query("enforce needs at least one action"));
    }
    Ok(queries)
}

fn body_queries(body: &[u8]) -> PdpResult<Vec<ActionQuery>> {
    let batch: BatchBody = serde_json::from_slice(body)
        .map_err(|e| PdpError::malformed_query(format!("invalid query body: {e}")))?;

    batch
        .queries
        .into_iter()
        .map(|query| {
            let action = query.action.trim();
            if action.is_empty() {
                return Err(PdpError::malformed_query("query action is empty"));
            }
            Ok(ActionQuery::new(action).with_target(Target::from_json(&query.target)?))
        })
        .collect()
}

fn header_actions(headers: &HeaderMap) -> PdpResult<Vec<String>> {
    let mut actions = Vec::new();
    for value in headers.get_all(ACTION_HEADER) {
        let value = value
            .to_str()
            .map_err(|_| PdpError::malformed_query("X-Action is not valid text"))?;
        actions.extend(
            value
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(ToString::to_string),
        );
    }
    Ok(actions)
}

fn header_target(headers: &HeaderMap) -> PdpResult<Target> {
    match headers.get(TARGET_HEADER) {
        None => Ok(Target::new()),
        Some(value) => {
            let text = value
                .to_str()
                .map_err(|_| PdpError::malformed_query("X-Target is not valid text"))?;
            Target::parse(text)
        }
    }
}
