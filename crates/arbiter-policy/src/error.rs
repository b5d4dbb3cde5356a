//! Error types for the policy crate.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors raised while loading rules.
///
/// Evaluation never fails: a rule that cannot be evaluated denies.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PolicyError {
    /// The rules file could not be read.
    #[error("failed to read rules from {path}: {source}")]
    Read {
        /// Path to the rules file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The rules file has an extension other than `.toml` or `.json`.
    #[error("unsupported rules file format: {0}")]
    UnsupportedFormat(PathBuf),

    /// TOML rules could not be parsed.
    #[error("invalid TOML rules: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON rules could not be parsed.
    #[error("invalid JSON rules: {0}")]
    Json(#[from] serde_json::Error),

    /// A rule set is internally inconsistent.
    #[error("invalid rule {name}: {message}")]
    InvalidRule {
        /// Rule name.
        name: String,
        /// What is wrong with it.
        message: String,
    },
}

impl PolicyError {
    /// Creates an invalid rule error.
    pub fn invalid_rule(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRule {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PolicyError::invalid_rule("admin_only", "empty role name");
        assert_eq!(err.to_string(), "invalid rule admin_only: empty role name");

        let err = PolicyError::UnsupportedFormat(PathBuf::from("rules.yaml"));
        assert!(err.to_string().contains("rules.yaml"));
    }
}
