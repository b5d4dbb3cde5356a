//! Decision request and result types.

use crate::context::{RequestContext, ServiceEndpoint};
use crate::error::{PdpError, PdpResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The resource an action is performed on.
///
/// A flat, insertion-ordered mapping from attribute names to string values
/// (`{"owner": "t1", "visibility": "private"}`). May be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target(IndexMap<String, String>);

impl Target {
    /// Creates an empty target.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Returns the value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns true if the target has no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the attributes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Builds a target from a JSON value.
    ///
    /// The value must be an object (or `null`, meaning empty). String values
    /// are taken as-is; numbers and booleans use their JSON text. Nested
    /// objects and arrays are rejected.
    pub fn from_json(value: &Value) -> PdpResult<Self> {
        let map = match value {
            Value::Null => return Ok(Self::new()),
            Value::Object(map) => map,
            _ => return Err(PdpError::malformed_query("target must be a JSON object")),
        };

        let mut target = IndexMap::with_capacity(map.len());
        for (key, value) in map {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(PdpError::malformed_query(format!(
                        "target attribute '{key}' must be a scalar"
                    )));
                }
            };
            target.insert(key.clone(), text);
        }

        Ok(Self(target))
    }

    /// Parses a target from its header text (a JSON object).
    ///
    /// Blank input yields an empty target.
    pub fn parse(text: &str) -> PdpResult<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Self::new());
        }
        let value: Value = serde_json::from_str(text)
            .map_err(|e| PdpError::malformed_query(format!("target is not valid JSON: {e}")))?;
        Self::from_json(&value)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Target {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A single decision request unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionQuery {
    /// The action (policy rule name) being authorized.
    pub action: String,
    /// The resource the action applies to.
    #[serde(default)]
    pub target: Target,
}

impl ActionQuery {
    /// Creates a query with an empty target.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            target: Target::new(),
        }
    }

    /// Sets the target.
    #[must_use]
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }
}

/// The outcome of evaluating one [`ActionQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// The action from the query.
    pub action: String,
    /// Whether the action is allowed.
    pub allowed: bool,
}

impl Decision {
    /// Creates a decision for `query`.
    #[must_use]
    pub fn for_query(query: &ActionQuery, allowed: bool) -> Self {
        Self {
            action: query.action.clone(),
            allowed,
        }
    }
}

/// Which part of the context an introspection endpoint exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntrospectionKind {
    /// `my_roles`
    Roles,
    /// `my_tenant`
    Tenant,
    /// `my_service_catalog`
    ServiceCatalog,
}

impl IntrospectionKind {
    /// Resolves the endpoint name (`my_roles`, ...) to a kind.
    #[must_use]
    pub fn from_endpoint(name: &str) -> Option<Self> {
        match name {
            "my_roles" => Some(Self::Roles),
            "my_tenant" => Some(Self::Tenant),
            "my_service_catalog" => Some(Self::ServiceCatalog),
            _ => None,
        }
    }

    /// Returns the endpoint name.
    #[must_use]
    pub const fn endpoint(&self) -> &'static str {
        match self {
            Self::Roles => "my_roles",
            Self::Tenant => "my_tenant",
            Self::ServiceCatalog => "my_service_catalog",
        }
    }
}

/// A read-only projection of a [`RequestContext`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum IntrospectionResult {
    /// The caller's roles.
    Roles {
        /// Role names, sorted.
        roles: Vec<String>,
    },
    /// The caller's tenant.
    Tenant {
        /// Tenant id.
        tenant_id: String,
    },
    /// The caller's service catalog.
    ServiceCatalog {
        /// Catalog records in backend order.
        service_catalog: Vec<ServiceEndpoint>,
    },
}

impl IntrospectionResult {
    /// Projects `kind` out of `ctx`.
    ///
    /// Fails with `Unauthenticated` for anonymous contexts.
    pub fn project(ctx: &RequestContext, kind: IntrospectionKind) -> PdpResult<Self> {
        if !ctx.is_authenticated() {
            return Err(PdpError::unauthenticated(format!(
                "{} requires an authenticated caller",
                kind.endpoint()
            )));
        }

        Ok(match kind {
            IntrospectionKind::Roles => Self::Roles {
                roles: ctx.roles().iter().cloned().collect(),
            },
            IntrospectionKind::Tenant => Self::Tenant {
                tenant_id: ctx.tenant_id().to_string(),
            },
            IntrospectionKind::ServiceCatalog => Self::ServiceCatalog {
                service_catalog: ctx.service_catalog().to_vec(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_target_parse() {
        let target = Target::parse(r#"{"owner":"t1","size":10,"public":false}"#).unwrap();
        assert_eq!(target.get("owner"), Some("t1"));
        assert_eq!(target.get("size"), Some("10"));
        assert_eq!(target.get("public"), Some("false"));
        let keys: Vec<_> = target.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["owner", "size", "public"]);
    }

    #[test]
    fn test_target_parse_blank_is_empty() {
        assert!(Target::parse("").unwrap().is_empty());
        assert!(Target::parse("   ").unwrap().is_empty());
        assert!(Target::parse("null").unwrap().is_empty());
    }

    #[test]
    fn test_target_rejects_bad_input() {
        let err = Target::parse("{not json").unwrap_err();
        assert_eq!(err.code(), "MalformedQuery");

        assert!(Target::parse(r#"["a"]"#).is_err());
        assert!(Target::parse(r#"{"nested":{"a":1}}"#).is_err());
        assert!(Target::parse(r#"{"list":[1]}"#).is_err());
    }

    #[test]
    fn test_action_query_deserialize() {
        let q: ActionQuery = serde_json::from_value(json!({"action": "get_image"})).unwrap();
        assert_eq!(q.action, "get_image");
        assert!(q.target.is_empty());

        let q: ActionQuery =
            serde_json::from_value(json!({"action": "a", "target": {"owner": "t1"}})).unwrap();
        assert_eq!(q.target.get("owner"), Some("t1"));
    }

    #[test]
    fn test_introspection_kind_endpoints() {
        for kind in [
            IntrospectionKind::Roles,
            IntrospectionKind::Tenant,
            IntrospectionKind::ServiceCatalog,
        ] {
            assert_eq!(IntrospectionKind::from_endpoint(kind.endpoint()), Some(kind));
        }
        assert_eq!(IntrospectionKind::from_endpoint("my_secrets"), None);
    }

    #[test]
    fn test_projection_of_authenticated_context() {
        let ctx = crate::fixtures::admin_context();

        let roles = IntrospectionResult::project(&ctx, IntrospectionKind::Roles).unwrap();
        assert_eq!(serde_json::to_value(&roles).unwrap(), json!({"roles": ["admin"]}));

        let tenant = IntrospectionResult::project(&ctx, IntrospectionKind::Tenant).unwrap();
        assert_eq!(serde_json::to_value(&tenant).unwrap(), json!({"tenant_id": "t1"}));

        let catalog =
            IntrospectionResult::project(&ctx, IntrospectionKind::ServiceCatalog).unwrap();
        let value = serde_json::to_value(&catalog).unwrap();
        assert_eq!(
            value["service_catalog"].as_array().unwrap().len(),
            ctx.service_catalog().len()
        );
    }

    #[test]
    fn test_projection_of_anonymous_context_fails() {
        let ctx = RequestContext::anonymous();
        let err = IntrospectionResult::project(&ctx, IntrospectionKind::Roles).unwrap_err();
        assert_eq!(err.code(), "Unauthenticated");
        assert_eq!(err.status_code(), http::StatusCode::UNAUTHORIZED);
    }
}
