//! Rule expressions.
//!
//! A [`Rule`] is a small boolean expression over the request context and the
//! query target. Rules are tagged by `type` when written in TOML or JSON:
//!
//! ```toml
//! [rules.context_is_admin]
//! type = "role"
//! name = "admin"
//!
//! [rules.get_image]
//! type = "any_of"
//! rules = [
//!     { type = "rule", name = "context_is_admin" },
//!     { type = "tenant_matches", key = "owner" },
//! ]
//! ```

use serde::{Deserialize, Serialize};

/// A policy rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rule {
    /// Always allows.
    Allow,
    /// Always denies.
    Deny,
    /// Allows if the context holds the named role.
    Role {
        /// Role name.
        name: String,
    },
    /// Allows any authenticated context.
    Authenticated,
    /// Allows if the context tenant equals `target[key]`.
    TenantMatches {
        /// Target attribute holding a tenant id.
        key: String,
    },
    /// Allows if the context subject equals `target[key]`.
    SubjectMatches {
        /// Target attribute holding a subject id.
        key: String,
    },
    /// Allows if `target[key]` equals `value`.
    TargetEquals {
        /// Target attribute.
        key: String,
        /// Expected value.
        value: String,
    },
    /// Allows if any sub-rule allows. An empty list denies.
    AnyOf {
        /// Alternatives.
        rules: Vec<Rule>,
    },
    /// Allows if every sub-rule allows. An empty list denies.
    AllOf {
        /// Conditions.
        rules: Vec<Rule>,
    },
    /// Inverts a rule.
    Not {
        /// Inverted rule.
        rule: Box<Rule>,
    },
    /// Evaluates another named rule.
    #[serde(rename = "rule")]
    Ref {
        /// Name of the referenced rule.
        name: String,
    },
    /// Evaluates a check registered in code under `name`.
    Custom {
        /// Name of the registered check.
        name: String,
    },
}

impl Rule {
    /// Role rule.
    pub fn role(name: impl Into<String>) -> Self {
        Self::Role { name: name.into() }
    }

    /// Tenant match rule.
    pub fn tenant_matches(key: impl Into<String>) -> Self {
        Self::TenantMatches { key: key.into() }
    }

    /// Subject match rule.
    pub fn subject_matches(key: impl Into<String>) -> Self {
        Self::SubjectMatches { key: key.into() }
    }

    /// Target attribute equality rule.
    pub fn target_equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::TargetEquals {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Disjunction.
    pub fn any_of(rules: impl IntoIterator<Item = Self>) -> Self {
        Self::AnyOf {
            rules: rules.into_iter().collect(),
        }
    }

    /// Conjunction.
    pub fn all_of(rules: impl IntoIterator<Item = Self>) -> Self {
        Self::AllOf {
            rules: rules.into_iter().collect(),
        }
    }

    /// Negation.
    #[must_use]
    pub fn negate(rule: Self) -> Self {
        Self::Not {
            rule: Box::new(rule),
        }
    }

    /// Reference to a named rule.
    pub fn reference(name: impl Into<String>) -> Self {
        Self::Ref { name: name.into() }
    }

    /// Reference to a check registered in code.
    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom { name: name.into() }
    }

    /// Calls `f` with the name of every rule this rule references.
    pub(crate) fn visit_references<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            Self::Ref { name } => f(name),
            Self::AnyOf { rules } | Self::AllOf { rules } => {
                for rule in rules {
                    rule.visit_references(f);
                }
            }
            Self::Not { rule } => rule.visit_references(f),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_shape() {
        let rule = Rule::any_of([Rule::reference("context_is_admin"), Rule::tenant_matches("owner")]);
        let value = serde_json::to_value(&rule).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "any_of",
                "rules": [
                    {"type": "rule", "name": "context_is_admin"},
                    {"type": "tenant_matches", "key": "owner"}
                ]
            })
        );
    }

    #[test]
    fn test_parse_unit_and_nested() {
        let rule: Rule = serde_json::from_value(json!({
            "type": "not",
            "rule": {"type": "authenticated"}
        }))
        .unwrap();
        assert_eq!(rule, Rule::negate(Rule::Authenticated));

        let rule: Rule = serde_json::from_value(json!({"type": "allow"})).unwrap();
        assert_eq!(rule, Rule::Allow);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result: Result<Rule, _> = serde_json::from_value(json!({"type": "maybe"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_visit_references() {
        let rule = Rule::all_of([
            Rule::reference("a"),
            Rule::negate(Rule::any_of([Rule::reference("b"), Rule::role("admin")])),
        ]);
        let mut seen = Vec::new();
        rule.visit_references(&mut |name| seen.push(name));
        assert_eq!(seen, ["a", "b"]);
    }
}
