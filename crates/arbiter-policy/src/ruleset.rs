//! Named rule collections and rule file loading.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PolicyError, PolicyResult};
use crate::rule::Rule;

/// Rules keyed by action name (or helper rule name).
///
/// Rule files are TOML or JSON documents with a single `rules` table:
///
/// ```json
/// {"rules": {"context_is_admin": {"type": "role", "name": "admin"}}}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    rules: HashMap<String, Rule>,
}

impl RuleSet {
    /// Creates an empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule, replacing any rule with the same name.
    #[must_use]
    pub fn with_rule(mut self, name: impl Into<String>, rule: Rule) -> Self {
        self.insert(name, rule);
        self
    }

    /// Adds a rule, returning the one it replaced.
    pub fn insert(&mut self, name: impl Into<String>, rule: Rule) -> Option<Rule> {
        self.rules.insert(name.into(), rule)
    }

    /// Looks up a rule.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the rule names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Adds every rule of `other`; rules in `other` win on conflict.
    pub fn merge(&mut self, other: Self) {
        self.rules.extend(other.rules);
    }

    /// Parses a TOML rule document.
    pub fn from_toml_str(text: &str) -> PolicyResult<Self> {
        let set: Self = toml::from_str(text)?;
        set.validate()?;
        Ok(set)
    }

    /// Parses a JSON rule document.
    pub fn from_json_str(text: &str) -> PolicyResult<Self> {
        let set: Self = serde_json::from_str(text)?;
        set.validate()?;
        Ok(set)
    }

    /// Loads a rule file, choosing the format by extension.
    pub fn from_file(path: impl AsRef<Path>) -> PolicyResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| PolicyError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let set = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&text)?,
            Some("json") => Self::from_json_str(&text)?,
            _ => return Err(PolicyError::UnsupportedFormat(path.to_path_buf())),
        };

        let unresolved = set.unresolved_references();
        if !unresolved.is_empty() {
            warn!(?unresolved, "rules reference undefined rules, those references deny");
        }
        info!(path = %path.display(), rules = set.len(), "loaded policy rules");
        Ok(set)
    }

    /// Returns referenced rule names that are not defined, sorted.
    #[must_use]
    pub fn unresolved_references(&self) -> Vec<&str> {
        let mut missing = Vec::new();
        for rule in self.rules.values() {
            rule.visit_references(&mut |name| {
                if !self.rules.contains_key(name) {
                    missing.push(name);
                }
            });
        }
        missing.sort_unstable();
        missing.dedup();
        missing
    }

    /// Rejects rules with empty names or empty role/key fields.
    ///
    /// The parsers call this; rule sets built in code or taken from the
    /// service configuration should call it before use.
    pub fn validate(&self) -> PolicyResult<()> {
        for (name, rule) in &self.rules {
            if name.is_empty() {
                return Err(PolicyError::invalid_rule(name, "rule name is empty"));
            }
            check_fields(name, rule)?;
        }
        Ok(())
    }
}

fn check_fields(name: &str, rule: &Rule) -> PolicyResult<()> {
    match rule {
        Rule::Role { name: role } if role.is_empty() => {
            Err(PolicyError::invalid_rule(name, "role name is empty"))
        }
        Rule::TenantMatches { key } | Rule::SubjectMatches { key } | Rule::TargetEquals { key, .. }
            if key.is_empty() =>
        {
            Err(PolicyError::invalid_rule(name, "target key is empty"))
        }
        Rule::AnyOf { rules } | Rule::AllOf { rules } => {
            rules.iter().try_for_each(|r| check_fields(name, r))
        }
        Rule::Not { rule } => check_fields(name, rule),
        _ => Ok(()),
    }
}

impl FromIterator<(String, Rule)> for RuleSet {
    fn from_iter<I: IntoIterator<Item = (String, Rule)>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}
