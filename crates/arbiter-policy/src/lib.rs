//! Arbiter Policy - rule-based decisions for the Arbiter policy decision point.
//!
//! A [`RuleSet`] maps action names to [`Rule`] expressions. The
//! [`PolicyEngine`] evaluates the rule for a query's action against the
//! request context and target and answers `true` or `false`.
//!
//! Decisions are fail-closed:
//!
//! - an action without a rule is denied
//! - a reference to an undefined rule denies the whole decision
//! - reference chains deeper than [`MAX_REFERENCE_DEPTH`] (including cycles)
//!   deny the whole decision
//!
//! Rules are loaded once at start from TOML or JSON (see
//! [`RuleSet::from_file`]) or built in code; checks that cannot be expressed
//! as rules can be registered as closures with [`PolicyEngine::with_custom`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod engine;
mod error;
mod rule;
mod ruleset;

pub use engine::{CustomCheck, PolicyDecider, PolicyEngine, MAX_REFERENCE_DEPTH};
pub use error::{PolicyError, PolicyResult};
pub use rule::Rule;
pub use ruleset::RuleSet;
