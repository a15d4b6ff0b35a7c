//! Composable rule builder
//!
//! A [`RuleComposer`] is an owned accumulator: repeated calls of the same
//! composable method (say, two independent `range` checks on one field) are
//! collected first, and [`RuleComposer::finish`] turns them into immutable
//! rules in one step.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::Rule;
use crate::error::{Result, SchemaError};

/// Finalizer: `(name, accumulated calls) -> rules`
pub type ComposeFn = Arc<dyn Fn(&str, &[Vec<Value>]) -> Result<Vec<Rule>> + Send + Sync>;

/// Accumulates calls for one composable rule
#[derive(Clone)]
pub struct RuleComposer {
    name: String,
    calls: Vec<Vec<Value>>,
    finalize: ComposeFn,
}

impl RuleComposer {
    pub fn new(name: impl Into<String>, finalize: ComposeFn) -> Self {
        Self {
            name: name.into(),
            calls: Vec::new(),
            finalize,
        }
    }

    /// Record one call, consuming and returning the builder
    pub fn push(mut self, args: Vec<Value>) -> Self {
        self.calls.push(args);
        self
    }

    /// Record one call in place
    pub fn add(&mut self, args: Vec<Value>) {
        self.calls.push(args);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Turn the accumulated calls into rules
    pub fn finish(self) -> Result<Vec<Rule>> {
        if self.calls.is_empty() {
            return Err(SchemaError::invalid_args(&self.name, "composer finished without any calls"));
        }
        (self.finalize)(&self.name, &self.calls)
    }
}

impl fmt::Debug for RuleComposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleComposer")
            .field("name", &self.name)
            .field("calls", &self.calls)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleInput, RuleOutcome, RuleRegistry};
    use serde_json::json;

    #[test]
    fn test_composer_accumulates_independent_checks() {
        let registry = RuleRegistry::with_builtins();
        let rules = registry
            .composer("range")
            .unwrap()
            .push(vec![json!(0), json!(100)])
            .push(vec![json!(10), json!(20)])
            .finish()
            .unwrap();
        assert_eq!(rules.len(), 2);

        let record = json!({});
        let value = json!(50);
        let input = RuleInput {
            value: Some(&value),
            record: &record,
            context: None,
            path: "n",
        };
        assert_eq!(rules[0].evaluate(&input), Some(RuleOutcome::Valid));
        assert_eq!(rules[1].evaluate(&input), Some(RuleOutcome::Invalid));
    }

    #[test]
    fn test_empty_composer_is_an_error() {
        let registry = RuleRegistry::with_builtins();
        let composer = registry.composer("length_range").unwrap();
        assert!(composer.is_empty());
        assert!(composer.finish().is_err());
    }

    #[test]
    fn test_malformed_call_fails_at_finish() {
        let registry = RuleRegistry::with_builtins();
        let result = registry
            .composer("range")
            .unwrap()
            .push(vec![json!("low")])
            .finish();
        assert!(matches!(result, Err(SchemaError::InvalidArguments { .. })));
    }
}
