//! Field definitions
//!
//! A [`FieldDefinition`] is one entry of the flat list a schema is built from:
//! a path, the declared value kind, an ordered rule chain, the transforms to
//! run in parse mode, and presence options.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::path::FieldPath;
use crate::recursive::RecursiveSpec;
use crate::rule::builtin::{is_integer, parse_date};
use crate::rule::{Rule, Transform};

/// Declared kind of a field value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    /// RFC 3339 timestamp or `YYYY-MM-DD` string
    Date,
    #[default]
    Any,
    Union,
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
            FieldKind::Date => "date",
            FieldKind::Any => "any",
            FieldKind::Union => "union",
        }
    }

    /// Whether compilation injects a primitive type check for this kind
    pub fn is_checked(&self) -> bool {
        !matches!(self, FieldKind::Any | FieldKind::Union)
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Integer => value.as_number().is_some_and(is_integer),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
            FieldKind::Date => value.as_str().and_then(parse_date).is_some(),
            FieldKind::Any | FieldKind::Union => true,
        }
    }
}

/// Name of a value's JSON type, for messages
pub(crate) fn describe(value: Option<&Value>) -> &'static str {
    match value {
        None => "undefined",
        Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Number(_)) => "number",
        Some(Value::String(_)) => "string",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
    }
}

/// One field of a schema
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    path: FieldPath,
    kind: FieldKind,
    rules: Vec<Rule>,
    transforms: Vec<Transform>,
    optional: bool,
    nullable: bool,
    default: Option<Value>,
}

impl FieldDefinition {
    /// Parse `path` and start a definition of the given kind
    pub fn new(path: &str, kind: FieldKind) -> Result<Self> {
        Ok(Self::at(FieldPath::parse(path)?, kind))
    }

    pub fn at(path: FieldPath, kind: FieldKind) -> Self {
        Self {
            path,
            kind,
            rules: Vec::new(),
            transforms: Vec::new(),
            optional: false,
            nullable: false,
            default: None,
        }
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Absent values are skipped instead of reported
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// `null` passes the type check
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Value used when the field is absent
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn rule_chain(&self) -> &[Rule] {
        &self.rules
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// An explicit requirement rule is part of the chain
    pub fn is_required(&self) -> bool {
        self.rules.iter().any(Rule::is_requirement)
    }

    /// Recursive specification of the first rule carrying one
    pub fn recursive(&self) -> Option<&RecursiveSpec> {
        self.rules.iter().find_map(Rule::recursive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleInput, RuleOutcome, RuleRegistry};
    use serde_json::json;

    #[test]
    fn test_kind_matching() {
        assert!(FieldKind::String.matches(&json!("x")));
        assert!(!FieldKind::String.matches(&json!(1)));
        assert!(FieldKind::Integer.matches(&json!(3)));
        assert!(!FieldKind::Integer.matches(&json!(3.5)));
        assert!(!FieldKind::Integer.matches(&json!("3")));
        assert!(FieldKind::Date.matches(&json!("2024-02-29")));
        assert!(FieldKind::Date.matches(&json!("2024-02-29T12:00:00+02:00")));
        assert!(!FieldKind::Date.matches(&json!("yesterday")));
        assert!(FieldKind::Any.matches(&Value::Null));
        assert!(!FieldKind::Union.is_checked());
    }

    #[test]
    fn test_integer_kind_agrees_with_integer_rule() {
        let rule = RuleRegistry::with_builtins().standard("integer", vec![]).unwrap();
        for value in [json!(2), json!(2.0), json!(-7), json!(2.5), json!(1e300)] {
            let input = RuleInput {
                value: Some(&value),
                record: &Value::Null,
                context: None,
                path: "n",
            };
            let by_rule = matches!(rule.evaluate(&input), Some(RuleOutcome::Valid));
            assert_eq!(FieldKind::Integer.matches(&value), by_rule, "{}", value);
        }
        assert!(FieldKind::Integer.matches(&json!(2.0)));
    }

    #[test]
    fn test_definition_flags() {
        let registry = RuleRegistry::with_builtins();
        let def = FieldDefinition::new("user.name", FieldKind::String)
            .unwrap()
            .rule(registry.standard("required", vec![]).unwrap())
            .rule(registry.standard("min_length", vec![json!(2)]).unwrap())
            .with_default(json!("anon"));

        assert!(def.is_required());
        assert!(!def.is_optional());
        assert_eq!(def.rule_chain().len(), 2);
        assert_eq!(def.default_value(), Some(&json!("anon")));
        assert_eq!(def.path().to_string(), "user.name");
        assert!(def.recursive().is_none());
    }

    #[test]
    fn test_empty_path_is_rejected() {
        assert!(FieldDefinition::new("", FieldKind::Any).is_err());
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(None), "undefined");
        assert_eq!(describe(Some(&json!([]))), "array");
    }
}
