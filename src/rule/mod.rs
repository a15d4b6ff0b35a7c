//! Rules and Transforms
//!
//! A [`Rule`] is an immutable predicate over one field value (plus the whole
//! record and optional external context). A [`Transform`] rewrites a value and
//! only runs in parse mode, after every rule of the field has passed.
//!
//! Rules are produced by category-tagged factories held in the
//! [`RuleRegistry`](registry::RuleRegistry).

pub mod builtin;
pub mod composer;
pub mod registry;

pub use composer::{ComposeFn, RuleComposer};
pub use registry::{
    ArrayExpectation, Built, ContextRuleSpec, RuleArgs, RuleFactory, RuleRegistry, TransformArgs,
};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::recursive::RecursiveSpec;

/// Check function of a rule
pub type CheckFn = Arc<dyn Fn(&RuleInput<'_>) -> RuleOutcome + Send + Sync>;
/// Produces the error message for a failed rule
pub type MessageFn = Arc<dyn Fn(&RuleInput<'_>) -> String + Send + Sync>;
/// Predicate over a single value (a record, or an array element)
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
/// Value rewrite applied in parse mode
pub type TransformFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;
/// Cross-field check: `(field_values, current_value, record)`
pub type MultiFieldCheck =
    Arc<dyn Fn(&[Option<&Value>], Option<&Value>, &Value) -> bool + Send + Sync>;

/// Rule categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    /// `check(value) -> bool`
    Standard,
    /// Gated by a predicate over the record; may skip the rest of the chain
    Conditional,
    /// Compares the value with the value at another path
    FieldReference,
    /// Cross-field check over several named fields
    MultiFieldReference,
    /// Value rewrite, parse only
    Transform,
    /// Checks over a whole array value
    ArrayElement,
    /// Checks against externally resolved context data
    Context,
    /// Accumulates repeated calls before yielding rules
    Composable,
}

impl RuleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCategory::Standard => "standard",
            RuleCategory::Conditional => "conditional",
            RuleCategory::FieldReference => "field_reference",
            RuleCategory::MultiFieldReference => "multi_field_reference",
            RuleCategory::Transform => "transform",
            RuleCategory::ArrayElement => "array_element",
            RuleCategory::Context => "context",
            RuleCategory::Composable => "composable",
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    Valid,
    /// Failed with the rule's own code
    Invalid,
    /// Failed with a more specific code than the rule's default
    InvalidAs(&'static str),
    /// Field is valid; later rules of the chain do not run
    SkipRemaining,
    /// Field is valid; later rules and all transforms are skipped
    SkipAll,
}

/// Everything a rule can look at
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    /// `None` when the field is absent
    pub value: Option<&'a Value>,
    /// The whole record being validated
    pub record: &'a Value,
    /// Externally resolved context data, if supplied
    pub context: Option<&'a Value>,
    /// Concrete path of the field
    pub path: &'a str,
}

impl<'a> RuleInput<'a> {
    /// Absent, null, or the empty string
    pub fn is_empty(&self) -> bool {
        is_empty_value(self.value)
    }
}

pub(crate) fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// An immutable validation rule
#[derive(Clone)]
pub struct Rule {
    name: String,
    category: RuleCategory,
    code: String,
    check: CheckFn,
    message: MessageFn,
    skip_for_null: bool,
    skip_for_undefined: bool,
    short_circuit: bool,
    requirement: bool,
    recursive: Option<RecursiveSpec>,
}

impl Rule {
    /// A rule with a boolean check
    ///
    /// Skips absent and null values by default and never short-circuits.
    pub fn predicate<F>(
        name: impl Into<String>,
        category: RuleCategory,
        code: impl Into<String>,
        check: F,
    ) -> Self
    where
        F: Fn(&RuleInput<'_>) -> bool + Send + Sync + 'static,
    {
        let check: CheckFn = Arc::new(move |input| {
            if check(input) {
                RuleOutcome::Valid
            } else {
                RuleOutcome::Invalid
            }
        });
        Self::build(name.into(), category, code.into(), check, false)
    }

    /// A non-short-circuiting rule that can fail with more than one code
    ///
    /// Skip outcomes returned by `check` are treated as valid.
    pub fn outcome<F>(
        name: impl Into<String>,
        category: RuleCategory,
        code: impl Into<String>,
        check: F,
    ) -> Self
    where
        F: Fn(&RuleInput<'_>) -> RuleOutcome + Send + Sync + 'static,
    {
        let check: CheckFn = Arc::new(move |input| match check(input) {
            RuleOutcome::SkipRemaining | RuleOutcome::SkipAll => RuleOutcome::Valid,
            outcome => outcome,
        });
        Self::build(name.into(), category, code.into(), check, false)
    }

    /// A rule that may skip the remainder of the chain
    ///
    /// Runs for absent and null values, and marks the field as handling its
    /// own presence requirement.
    pub fn conditional<F>(name: impl Into<String>, code: impl Into<String>, check: F) -> Self
    where
        F: Fn(&RuleInput<'_>) -> RuleOutcome + Send + Sync + 'static,
    {
        let mut rule = Self::build(name.into(), RuleCategory::Conditional, code.into(), Arc::new(check), true);
        rule.skip_for_null = false;
        rule.skip_for_undefined = false;
        rule.requirement = true;
        rule
    }

    fn build(name: String, category: RuleCategory, code: String, check: CheckFn, short_circuit: bool) -> Self {
        let default_message = format!("Failed {} validation", name);
        Self {
            name,
            category,
            code,
            check,
            message: Arc::new(move |_| default_message.clone()),
            skip_for_null: true,
            skip_for_undefined: true,
            short_circuit,
            requirement: false,
            recursive: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.message = Arc::new(move |_| message.clone());
        self
    }

    pub fn with_message_fn<F>(mut self, message: F) -> Self
    where
        F: Fn(&RuleInput<'_>) -> String + Send + Sync + 'static,
    {
        self.message = Arc::new(message);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn skip_for_null(mut self, skip: bool) -> Self {
        self.skip_for_null = skip;
        self
    }

    pub fn skip_for_undefined(mut self, skip: bool) -> Self {
        self.skip_for_undefined = skip;
        self
    }

    /// Mark this rule as the field's explicit presence requirement
    pub fn as_requirement(mut self) -> Self {
        self.requirement = true;
        self
    }

    pub fn with_recursive(mut self, spec: RecursiveSpec) -> Self {
        self.recursive = Some(spec);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> RuleCategory {
        self.category
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn can_short_circuit(&self) -> bool {
        self.short_circuit
    }

    pub fn is_requirement(&self) -> bool {
        self.requirement
    }

    pub fn recursive(&self) -> Option<&RecursiveSpec> {
        self.recursive.as_ref()
    }

    /// Run the check; `None` when the rule skips this value
    pub fn evaluate(&self, input: &RuleInput<'_>) -> Option<RuleOutcome> {
        match input.value {
            None if self.skip_for_undefined => None,
            Some(Value::Null) if self.skip_for_null => None,
            _ => Some((self.check)(input)),
        }
    }

    pub fn message(&self, input: &RuleInput<'_>) -> String {
        (self.message)(input)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("code", &self.code)
            .field("short_circuit", &self.short_circuit)
            .field("requirement", &self.requirement)
            .field("recursive", &self.recursive)
            .finish()
    }
}

/// A named value rewrite
#[derive(Clone)]
pub struct Transform {
    name: String,
    apply: TransformFn,
}

impl Transform {
    pub fn new<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            apply: Arc::new(apply),
        }
    }

    pub fn from_fn(name: impl Into<String>, apply: TransformFn) -> Self {
        Self {
            name: name.into(),
            apply,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, value: Value) -> Value {
        (self.apply)(value)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input<'a>(value: Option<&'a Value>, record: &'a Value) -> RuleInput<'a> {
        RuleInput {
            value,
            record,
            context: None,
            path: "field",
        }
    }

    #[test]
    fn test_predicate_rule_skips_absent_and_null() {
        let rule = Rule::predicate("never", RuleCategory::Standard, "never", |_| false);
        let record = json!({});
        assert_eq!(rule.evaluate(&input(None, &record)), None);
        assert_eq!(rule.evaluate(&input(Some(&Value::Null), &record)), None);
        assert_eq!(
            rule.evaluate(&input(Some(&json!(1)), &record)),
            Some(RuleOutcome::Invalid)
        );
        assert!(!rule.can_short_circuit());
    }

    #[test]
    fn test_conditional_rule_sees_absent_values() {
        let rule = Rule::conditional("skip", "required", |_| RuleOutcome::SkipAll);
        let record = json!({});
        assert_eq!(rule.evaluate(&input(None, &record)), Some(RuleOutcome::SkipAll));
        assert!(rule.can_short_circuit());
        assert!(rule.is_requirement());
    }

    #[test]
    fn test_custom_message() {
        let rule = Rule::predicate("min", RuleCategory::Standard, "too_small", |_| false)
            .with_message_fn(|input| format!("{} is too small", input.path));
        let record = json!({});
        assert_eq!(rule.message(&input(None, &record)), "field is too small");
    }

    #[test]
    fn test_empty_values() {
        assert!(is_empty_value(None));
        assert!(is_empty_value(Some(&Value::Null)));
        assert!(is_empty_value(Some(&json!(""))));
        assert!(!is_empty_value(Some(&json!(0))));
        assert!(!is_empty_value(Some(&json!([]))));
    }
}
