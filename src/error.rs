//! Error types for the validation engine
//!
//! Two families live here:
//! - [`SchemaError`]: build-time configuration errors (bad paths, unknown rules,
//!   malformed rule arguments). These are raised only while a schema is built.
//! - [`ValidationError`] / [`ValidationErrors`]: expected, data-driven failures
//!   returned from `validate` and `parse`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result type for schema construction
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Outcome of a `validate` or `parse` call
pub type ValidationResult = std::result::Result<Value, ValidationErrors>;

/// Schema construction errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Invalid field path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Duplicate field path: {0}")]
    DuplicatePath(String),

    #[error("Unknown rule: {0}")]
    UnknownRule(String),

    #[error("Rule already registered: {0}")]
    DuplicateRule(String),

    #[error("Rule '{name}' is a {expected} rule and cannot be built as {actual}")]
    CategoryMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid arguments for rule '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("Strategy {strategy} cannot run field '{path}': {reason}")]
    StrategyNotApplicable {
        path: String,
        strategy: String,
        reason: String,
    },

    #[error("Cannot write through wildcard path: {0}")]
    WildcardSetter(String),

    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl SchemaError {
    pub(crate) fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_args(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Error codes produced by the engine itself and the built-in rules
pub mod codes {
    pub const REQUIRED: &str = "required";
    pub const INVALID_TYPE: &str = "invalid_type";
    pub const TOO_SHORT: &str = "too_short";
    pub const TOO_LONG: &str = "too_long";
    pub const INVALID_LENGTH: &str = "invalid_length";
    pub const TOO_SMALL: &str = "too_small";
    pub const TOO_BIG: &str = "too_big";
    pub const NOT_INTEGER: &str = "not_integer";
    pub const NOT_POSITIVE: &str = "not_positive";
    pub const INVALID_EMAIL: &str = "invalid_email";
    pub const INVALID_URL: &str = "invalid_url";
    pub const PATTERN_MISMATCH: &str = "pattern_mismatch";
    pub const INVALID_ENUM: &str = "invalid_enum";
    pub const DATE_TOO_LATE: &str = "date_too_late";
    pub const DATE_TOO_EARLY: &str = "date_too_early";
    pub const NOT_EQUAL: &str = "not_equal";
    pub const NOT_DIFFERENT: &str = "not_different";
    pub const CROSS_FIELD: &str = "cross_field";
    pub const TOO_FEW_ITEMS: &str = "too_few_items";
    pub const TOO_MANY_ITEMS: &str = "too_many_items";
    pub const NOT_UNIQUE: &str = "not_unique";
    pub const MISSING_ITEM: &str = "missing_item";
    pub const INVALID_ITEMS: &str = "invalid_items";
    pub const CONTEXT_MISMATCH: &str = "context_mismatch";
    pub const MISSING_CONTEXT: &str = "missing_context";
    pub const OUT_OF_RANGE: &str = "out_of_range";
}

/// A single data validation failure
///
/// The path is always concrete: wildcards are replaced by element indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub path: String,
    pub code: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    /// The synthesized error for an absent, non-optional field
    pub fn required(path: impl Into<String>) -> Self {
        Self::new(path, codes::REQUIRED, "Required")
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} ({})", self.message, self.code)
        } else {
            write!(f, "{}: {} ({})", self.path, self.message, self.code)
        }
    }
}

/// Ordered list of validation failures returned by a failed call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation error(s)", self.0.len())?;
        if let Some(first) = self.0.first() {
            write!(f, ", first: {}", first)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl ValidationErrors {
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Codes in reporting order
    pub fn codes(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.code.as_str()).collect()
    }

    /// Paths in reporting order
    pub fn paths(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.path.as_str()).collect()
    }

    pub fn into_inner(self) -> Vec<ValidationError> {
        self.0
    }
}

impl IntoIterator for ValidationErrors {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_path_and_code() {
        let err = ValidationError::new("orders[0].sku", codes::REQUIRED, "Required");
        assert_eq!(err.to_string(), "orders[0].sku: Required (required)");

        let root = ValidationError::required("");
        assert_eq!(root.to_string(), "Required (required)");
    }

    #[test]
    fn test_errors_summary() {
        let errors = ValidationErrors(vec![
            ValidationError::new("a", codes::TOO_SHORT, "Too short"),
            ValidationError::new("b", codes::REQUIRED, "Required"),
        ]);
        assert_eq!(errors.codes(), vec!["too_short", "required"]);
        assert_eq!(errors.paths(), vec!["a", "b"]);
        assert!(errors.to_string().starts_with("2 validation error(s)"));
    }

    #[test]
    fn test_error_serializes_flat() {
        let err = ValidationError::new("name", codes::REQUIRED, "Required");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["path"], "name");
        assert_eq!(json["code"], "required");
    }
}
