//! The policy decision engine.

use std::collections::HashMap;
use std::sync::Arc;

use arbiter_core::metric_names::DECISIONS_TOTAL;
use arbiter_core::{ActionQuery, Decision, RequestContext, Target};
use metrics::counter;
use tracing::{debug, warn};

use crate::rule::Rule;
use crate::ruleset::RuleSet;

/// Maximum nesting of named rule references before evaluation gives up and
/// denies.
pub const MAX_REFERENCE_DEPTH: usize = 16;

/// A check implemented in code, referenced from rules as `custom`.
pub type CustomCheck = Arc<dyn Fn(&RequestContext, &Target) -> bool + Send + Sync>;

/// Decides whether a context may perform an action.
///
/// Implementations must be pure: the same context and query always give the
/// same answer, and a decision never fails. Anything that cannot be decided
/// is `false`.
pub trait PolicyDecider: Send + Sync + std::fmt::Debug {
    /// Decides one query.
    fn decide(&self, ctx: &RequestContext, query: &ActionQuery) -> bool;

    /// Decides a batch, one decision per query, in query order.
    fn decide_all(&self, ctx: &RequestContext, queries: &[ActionQuery]) -> Vec<Decision> {
        queries
            .iter()
            .map(|query| Decision::for_query(query, self.decide(ctx, query)))
            .collect()
    }

    /// Returns true if `action` has a rule.
    fn has_rule(&self, action: &str) -> bool;
}

/// Rule-driven [`PolicyDecider`].
///
/// The engine looks up the rule named by the query action and evaluates it
/// against the context and target. Unregistered actions deny.
///
/// # Example
///
/// ```
/// use arbiter_core::{ActionQuery, Target, fixtures};
/// use arbiter_policy::{PolicyDecider, PolicyEngine, Rule, RuleSet};
///
/// let rules = RuleSet::new()
///     .with_rule("context_is_admin", Rule::role("admin"))
///     .with_rule("enforce_glance", Rule::reference("context_is_admin"));
/// let engine = PolicyEngine::new(rules);
///
/// let query = ActionQuery::new("enforce_glance").with_target(Target::new().with("owner", "t1"));
/// assert!(engine.decide(&fixtures::admin_context(), &query));
/// assert!(!engine.decide(&fixtures::member_context(), &query));
/// ```
#[derive(Clone, Default)]
pub struct PolicyEngine {
    rules: RuleSet,
    custom: HashMap<String, CustomCheck>,
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut custom: Vec<&str> = self.custom.keys().map(String::as_str).collect();
        custom.sort_unstable();
        f.debug_struct("PolicyEngine")
            .field("rules", &self.rules.names())
            .field("custom", &custom)
            .finish()
    }
}

impl PolicyEngine {
    /// Creates an engine over `rules`.
    #[must_use]
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules,
            custom: HashMap::new(),
        }
    }

    /// Registers a check callable from rules as `{"type": "custom", "name": ...}`.
    #[must_use]
    pub fn with_custom<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&RequestContext, &Target) -> bool + Send + Sync + 'static,
    {
        self.custom.insert(name.into(), Arc::new(check));
        self
    }

    /// Returns the rule set.
    #[must_use]
    pub const fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Evaluates `rule`. `Err` means the rule could not be resolved (missing
    /// reference, missing custom check, reference depth exceeded), which makes
    /// the whole decision deny regardless of any enclosing `not`.
    fn evaluate(
        &self,
        rule: &Rule,
        ctx: &RequestContext,
        target: &Target,
        depth: usize,
    ) -> Result<bool, Unresolved> {
        Ok(match rule {
            Rule::Allow => true,
            Rule::Deny => false,
            Rule::Role { name } => ctx.has_role(name),
            Rule::Authenticated => ctx.is_authenticated(),
            Rule::TenantMatches { key } => non_empty_eq(ctx.tenant_id(), target.get(key)),
            Rule::SubjectMatches { key } => non_empty_eq(ctx.subject_id(), target.get(key)),
            Rule::TargetEquals { key, value } => target.get(key) == Some(value.as_str()),
            Rule::AnyOf { rules } => {
                let mut any = false;
                for r in rules {
                    any |= self.evaluate(r, ctx, target, depth)?;
                }
                any
            }
            Rule::AllOf { rules } => {
                let mut all = !rules.is_empty();
                for r in rules {
                    all &= self.evaluate(r, ctx, target, depth)?;
                }
                all
            }
            Rule::Not { rule } => !self.evaluate(rule, ctx, target, depth)?,
            Rule::Ref { name } => {
                if depth >= MAX_REFERENCE_DEPTH {
                    return Err(Unresolved(format!("reference depth exceeded at {name}")));
                }
                let referenced = self
                    .rules
                    .get(name)
                    .ok_or_else(|| Unresolved(format!("undefined rule {name}")))?;
                self.evaluate(referenced, ctx, target, depth + 1)?
            }
            Rule::Custom { name } => {
                let check = self
                    .custom
                    .get(name)
                    .ok_or_else(|| Unresolved(format!("unregistered custom check {name}")))?;
                check(ctx, target)
            }
        })
    }
}

/// Why a rule could not be evaluated.
#[derive(Debug)]
struct Unresolved(String);

fn non_empty_eq(ours: &str, theirs: Option<&str>) -> bool {
    !ours.is_empty() && theirs == Some(ours)
}

impl PolicyDecider for PolicyEngine {
    fn decide(&self, ctx: &RequestContext, query: &ActionQuery) -> bool {
        let allowed = match self.rules.get(&query.action) {
            Some(rule) => self
                .evaluate(rule, ctx, &query.target, 0)
                .unwrap_or_else(|Unresolved(reason)| {
                    warn!(action = %query.action, %reason, "rule could not be evaluated, denying");
                    false
                }),
            None => false,
        };

        counter!(
            DECISIONS_TOTAL,
            "result" => if allowed { "allow" } else { "deny" }
        )
        .increment(1);
        debug!(
            subject = %ctx.log_id(),
            action = %query.action,
            allowed,
            "policy decision"
        );
        allowed
    }

    fn has_rule(&self, action: &str) -> bool {
        self.rules.get(action).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_core::fixtures;

    fn engine() -> PolicyEngine {
        let rules = RuleSet::new()
            .with_rule("context_is_admin", Rule::role("admin"))
            .with_rule("enforce_glance", Rule::reference("context_is_admin"))
            .with_rule(
                "get_image",
                Rule::any_of([Rule::reference("context_is_admin"), Rule::tenant_matches("owner")]),
            )
            .with_rule(
                "delete_image",
                Rule::all_of([
                    Rule::Authenticated,
                    Rule::negate(Rule::target_equals("protected", "true")),
                ]),
            )
            .with_rule("own_profile", Rule::subject_matches("user_id"))
            .with_rule("public", Rule::Allow)
            .with_rule("nobody", Rule::Deny)
            .with_rule("weekday", Rule::custom("is_weekday"));
        PolicyEngine::new(rules).with_custom("is_weekday", |_, target| {
            target.get("day") != Some("sunday")
        })
    }

    fn query(action: &str, target: Target) -> ActionQuery {
        ActionQuery::new(action).with_target(target)
    }

    #[test]
    fn test_role_rule_via_reference() {
        let engine = engine();
        let q = query("enforce_glance", Target::new().with("owner", "t1"));

        assert!(engine.decide(&fixtures::admin_context(), &q));
        assert!(!engine.decide(&fixtures::member_context(), &q));
    }

    #[test]
    fn test_unregistered_action_denies() {
        let engine = engine();
        assert!(!engine.has_rule("delete_everything"));
        assert!(!engine.decide(&fixtures::admin_context(), &ActionQuery::new("delete_everything")));
    }

    #[test]
    fn test_tenant_match() {
        let engine = engine();
        let member = fixtures::member_context();

        assert!(engine.decide(&member, &query("get_image", Target::new().with("owner", "t2"))));
        assert!(!engine.decide(&member, &query("get_image", Target::new().with("owner", "t1"))));
        assert!(!engine.decide(&member, &query("get_image", Target::new())));
    }

    #[test]
    fn test_empty_tenant_never_matches() {
        let engine = engine();
        let anon = RequestContext::anonymous();
        assert!(!engine.decide(&anon, &query("get_image", Target::new().with("owner", ""))));
    }

    #[test]
    fn test_subject_match() {
        let engine = engine();
        let ctx = fixtures::member_context();
        assert!(engine.decide(&ctx, &query("own_profile", Target::new().with("user_id", "u2"))));
        assert!(!engine.decide(&ctx, &query("own_profile", Target::new().with("user_id", "u1"))));
    }

    #[test]
    fn test_all_of_and_not() {
        let engine = engine();
        let ctx = fixtures::member_context();

        assert!(engine.decide(&ctx, &query("delete_image", Target::new().with("protected", "false"))));
        assert!(!engine.decide(&ctx, &query("delete_image", Target::new().with("protected", "true"))));
        assert!(!engine.decide(&RequestContext::anonymous(), &ActionQuery::new("delete_image")));
    }

    #[test]
    fn test_constant_rules() {
        let engine = engine();
        let anon = RequestContext::anonymous();
        assert!(engine.decide(&anon, &ActionQuery::new("public")));
        assert!(!engine.decide(&fixtures::admin_context(), &ActionQuery::new("nobody")));
    }

    #[test]
    fn test_empty_combinators_deny() {
        let engine = PolicyEngine::new(
            RuleSet::new()
                .with_rule("none_of", Rule::any_of([]))
                .with_rule("all_of_nothing", Rule::all_of([])),
        );
        let ctx = fixtures::admin_context();
        assert!(!engine.decide(&ctx, &ActionQuery::new("none_of")));
        assert!(!engine.decide(&ctx, &ActionQuery::new("all_of_nothing")));
    }

    #[test]
    fn test_custom_check() {
        let engine = engine();
        let ctx = fixtures::member_context();
        assert!(engine.decide(&ctx, &query("weekday", Target::new().with("day", "monday"))));
        assert!(!engine.decide(&ctx, &query("weekday", Target::new().with("day", "sunday"))));

        let without = PolicyEngine::new(RuleSet::new().with_rule("x", Rule::custom("missing")));
        assert!(!without.decide(&ctx, &ActionQuery::new("x")));
    }

    #[test]
    fn test_reference_cycles_deny() {
        let engine = PolicyEngine::new(
            RuleSet::new()
                .with_rule("a", Rule::reference("b"))
                .with_rule("b", Rule::reference("a"))
                .with_rule("loop_or_admin", Rule::any_of([Rule::reference("a"), Rule::role("admin")]))
                .with_rule("not_loop", Rule::negate(Rule::reference("a"))),
        );
        let admin = fixtures::admin_context();

        assert!(!engine.decide(&admin, &ActionQuery::new("a")));
        assert!(!engine.decide(&admin, &ActionQuery::new("loop_or_admin")));
        assert!(!engine.decide(&admin, &ActionQuery::new("not_loop")));
    }

    #[test]
    fn test_missing_reference_denies() {
        let engine = PolicyEngine::new(
            RuleSet::new()
                .with_rule("a", Rule::reference("ghost"))
                .with_rule("not_a", Rule::negate(Rule::reference("ghost"))),
        );
        assert!(!engine.decide(&fixtures::admin_context(), &ActionQuery::new("a")));
        assert!(!engine.decide(&fixtures::admin_context(), &ActionQuery::new("not_a")));
    }

    #[test]
    fn test_decide_all_preserves_order() {
        let engine = engine();
        let queries = vec![
            ActionQuery::new("nobody"),
            ActionQuery::new("public"),
            ActionQuery::new("unknown"),
            ActionQuery::new("enforce_glance"),
        ];

        let decisions = engine.decide_all(&fixtures::admin_context(), &queries);
        let summary: Vec<(&str, bool)> = decisions
            .iter()
            .map(|d| (d.action.as_str(), d.allowed))
            .collect();
        assert_eq!(
            summary,
            [
                ("nobody", false),
                ("public", true),
                ("unknown", false),
                ("enforce_glance", true)
            ]
        );
    }

    #[test]
    fn test_decide_is_idempotent() {
        let engine = engine();
        let ctx = fixtures::admin_context();
        let q = query("get_image", Target::new().with("owner", "t9"));
        let first = engine.decide(&ctx, &q);
        for _ in 0..10 {
            assert_eq!(engine.decide(&ctx, &q), first);
        }
    }

    #[test]
    fn test_debug_lists_rules() {
        let debug = format!("{:?}", engine());
        assert!(debug.contains("context_is_admin"));
        assert!(debug.contains("is_weekday"));
    }
}
