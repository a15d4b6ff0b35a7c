//! Whole-record validation
//!
//! [`Schema`] is the entry point: it is built once from a flat list of
//! [`FieldDefinition`]s and then validates or parses any number of records.
//!
//! ## Order of work for one call
//!
//! 1. A null input fails with a single root `required` error
//! 2. Defaults are applied to a working copy of the input
//! 3. Array batches run first, then plain fields in declaration order
//! 4. With `abort_early`, the first field-level error ends the call
//!
//! `validate` returns the input unchanged on success; `parse` returns a new
//! value with defaults filled in and transforms applied.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::batch::{self, ArrayBatchDescriptor};
use crate::compile::{CallContext, CompiledValidator, Mode, Strategy};
use crate::config::EngineConfig;
use crate::error::{Result, SchemaError, ValidationError, ValidationErrors, ValidationResult};
use crate::field::FieldDefinition;
use crate::level::{FieldEntry, FieldSet, LevelOrder};
use crate::path::FieldPath;
use crate::recursive::RecursionState;

/// Per-call options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidateOptions {
    /// Stop at the first field-level error
    pub abort_early: bool,
    /// Stop at the first failing rule within one field
    pub abort_early_on_each_field: bool,
    /// External data handed to context rules, resolved by the caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            abort_early: true,
            abort_early_on_each_field: true,
            context: None,
        }
    }
}

impl ValidateOptions {
    /// Collect every error of every field
    pub fn collect_all() -> Self {
        Self::default().abort_early(false).abort_early_on_each_field(false)
    }

    pub fn abort_early(mut self, abort: bool) -> Self {
        self.abort_early = abort;
        self
    }

    pub fn abort_early_on_each_field(mut self, abort: bool) -> Self {
        self.abort_early_on_each_field = abort;
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    fn call<'a>(&'a self, record: &'a Value, mode: Mode) -> CallContext<'a> {
        CallContext {
            record,
            context: self.context.as_ref(),
            abort_early: self.abort_early,
            abort_early_on_each_field: self.abort_early_on_each_field,
            mode,
        }
    }
}

// =============================================================================
// Schema
// =============================================================================

/// A compiled set of field definitions
#[derive(Debug)]
pub struct Schema {
    root: FieldSet,
    definitions: Vec<Arc<FieldDefinition>>,
    max_depth: usize,
    options: ValidateOptions,
}

impl Schema {
    /// Build with the default configuration
    pub fn new(definitions: Vec<FieldDefinition>) -> Result<Self> {
        Self::with_config(definitions, &EngineConfig::default())
    }

    /// Build a schema; fails on malformed definitions, never on data
    pub fn with_config(definitions: Vec<FieldDefinition>, config: &EngineConfig) -> Result<Self> {
        let compile = config.compile_options();
        let definitions: Vec<Arc<FieldDefinition>> = definitions.into_iter().map(Arc::new).collect();

        let mut seen = HashSet::new();
        for definition in &definitions {
            let key = definition.path().to_string();
            if !seen.insert(key.clone()) {
                return Err(SchemaError::DuplicatePath(key));
            }
        }

        let mut fields = Vec::new();
        for definition in definitions.iter().filter(|d| !d.path().has_wildcard()) {
            fields.push(FieldEntry::new(definition.clone(), definition.path().clone(), &compile)?);
        }
        let arrays = batch::build_hierarchy(&definitions, &compile)?;

        tracing::debug!(
            definitions = definitions.len(),
            plain_fields = fields.len(),
            array_batches = arrays.len(),
            strategy = ?compile.strategy,
            "built schema"
        );

        Ok(Self {
            root: FieldSet::new(fields, arrays, LevelOrder::ArraysFirst),
            definitions,
            max_depth: config.recursion.max_depth,
            options: config.validate_options(),
        })
    }

    /// Check a record; returns the input unchanged on success
    pub fn validate(&self, input: &Value, options: &ValidateOptions) -> ValidationResult {
        self.run(input, options, Mode::Validate)
    }

    /// Check a record and return it with defaults and transforms applied
    pub fn parse(&self, input: &Value, options: &ValidateOptions) -> ValidationResult {
        self.run(input, options, Mode::Parse)
    }

    /// Validator for a single field
    pub fn pick(&self, path: &str) -> Result<FieldValidator> {
        let path = FieldPath::parse(path)?;
        find_entry(&self.root, &path)
            .map(|entry| FieldValidator {
                path: path.to_string(),
                validator: entry.validator(),
            })
            .ok_or_else(|| SchemaError::FieldNotFound(path.to_string()))
    }

    /// Per-call options taken from the configuration this schema was built with
    pub fn default_options(&self) -> &ValidateOptions {
        &self.options
    }

    pub fn definitions(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.definitions.iter().map(Arc::as_ref)
    }

    /// Root array batches
    pub fn arrays(&self) -> &[ArrayBatchDescriptor] {
        self.root.arrays()
    }

    fn run(&self, input: &Value, options: &ValidateOptions, mode: Mode) -> ValidationResult {
        if input.is_null() {
            return Err(ValidationErrors(vec![ValidationError::required("")]));
        }

        let record: Cow<'_, Value> = if self.root.needs_defaults(input) {
            let mut shadow = input.clone();
            self.root.apply_defaults(&mut shadow);
            Cow::Owned(shadow)
        } else {
            Cow::Borrowed(input)
        };

        let call = options.call(&record, mode);
        let mut state = RecursionState::new(self.max_depth);
        let outcome = self.root.run(&record, "", &call, &mut state);

        tracing::debug!(mode = ?mode, errors = outcome.errors.len(), "record processed");
        if !outcome.errors.is_empty() {
            return Err(ValidationErrors(outcome.errors));
        }
        Ok(match mode {
            Mode::Validate => input.clone(),
            Mode::Parse => outcome.value.unwrap_or_else(|| record.into_owned()),
        })
    }
}

fn find_entry<'s>(level: &'s FieldSet, path: &FieldPath) -> Option<&'s FieldEntry> {
    level
        .fields()
        .iter()
        .find(|entry| entry.definition().path() == path)
        .or_else(|| {
            level
                .arrays()
                .iter()
                .find_map(|array| find_entry(array.element_level(), path))
        })
}

// =============================================================================
// Single-field projection
// =============================================================================

/// One field's compiled validator, detached from its schema
///
/// Runs the field's own chain only: no defaults, batches or recursion.
#[derive(Debug, Clone)]
pub struct FieldValidator {
    path: String,
    validator: Arc<CompiledValidator>,
}

impl FieldValidator {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn strategy(&self) -> Strategy {
        self.validator.strategy()
    }

    /// Check a value on its own
    pub fn validate(&self, value: &Value, options: &ValidateOptions) -> ValidationResult {
        self.validate_in(Some(value), &Value::Object(Default::default()), options)
    }

    /// Check a possibly absent value against a surrounding record
    pub fn validate_in(&self, value: Option<&Value>, record: &Value, options: &ValidateOptions) -> ValidationResult {
        self.run(value, record, options, Mode::Validate)
            .map(|_| value.cloned().unwrap_or(Value::Null))
    }

    /// Check a value and apply the field's transforms
    pub fn parse(&self, value: &Value, options: &ValidateOptions) -> ValidationResult {
        self.parse_in(Some(value), &Value::Object(Default::default()), options)
    }

    pub fn parse_in(&self, value: Option<&Value>, record: &Value, options: &ValidateOptions) -> ValidationResult {
        self.run(value, record, options, Mode::Parse)
            .map(|parsed| parsed.or_else(|| value.cloned()).unwrap_or(Value::Null))
    }

    fn run(
        &self,
        value: Option<&Value>,
        record: &Value,
        options: &ValidateOptions,
        mode: Mode,
    ) -> std::result::Result<Option<Value>, ValidationErrors> {
        let outcome = self.validator.run(value, &self.path, &options.call(record, mode));
        if outcome.errors.is_empty() {
            Ok(outcome.value)
        } else {
            Err(ValidationErrors(outcome.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;
    use crate::field::FieldKind;
    use crate::rule::{RuleRegistry, TransformArgs};
    use serde_json::json;

    fn registry() -> RuleRegistry {
        RuleRegistry::with_builtins()
    }

    fn user_schema() -> Schema {
        let r = registry();
        Schema::new(vec![
            FieldDefinition::new("name", FieldKind::String)
                .unwrap()
                .rule(r.standard("min_length", vec![json!(2)]).unwrap())
                .transform(r.transform("trim", TransformArgs::Values(vec![])).unwrap()),
            FieldDefinition::new("age", FieldKind::Integer)
                .unwrap()
                .optional()
                .rule(r.standard("min", vec![json!(0)]).unwrap()),
            FieldDefinition::new("role", FieldKind::String)
                .unwrap()
                .with_default(json!("member")),
        ])
        .unwrap()
    }

    #[test]
    fn test_null_input_is_root_required() {
        let err = user_schema().validate(&Value::Null, &ValidateOptions::default()).unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err.errors()[0].path, "");
        assert_eq!(err.errors()[0].code, codes::REQUIRED);
    }

    #[test]
    fn test_validate_returns_input_unchanged() {
        let input = json!({"name": "  ada  "});
        let output = user_schema().validate(&input, &ValidateOptions::default()).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_parse_applies_defaults_and_transforms() {
        let input = json!({"name": "  ada  "});
        let output = user_schema().parse(&input, &ValidateOptions::default()).unwrap();
        assert_eq!(output, json!({"name": "ada", "role": "member"}));
        assert_eq!(input, json!({"name": "  ada  "}));
    }

    #[test]
    fn test_abort_early_controls_aggregation() {
        let input = json!({"age": -1});
        let schema = user_schema();

        let first = schema.validate(&input, &ValidateOptions::default()).unwrap_err();
        assert_eq!(first.len(), 1);
        assert_eq!(first.errors()[0].path, "name");

        let all = schema.validate(&input, &ValidateOptions::collect_all()).unwrap_err();
        assert_eq!(all.paths(), vec!["name", "age"]);
    }

    #[test]
    fn test_duplicate_paths_rejected() {
        let result = Schema::new(vec![
            FieldDefinition::new("items[*].a", FieldKind::Any).unwrap(),
            FieldDefinition::new("items.*.a", FieldKind::Any).unwrap(),
        ]);
        assert!(matches!(result, Err(SchemaError::DuplicatePath(_))));
    }

    #[test]
    fn test_pick_single_field() {
        let schema = user_schema();
        let name = schema.pick("name").unwrap();
        assert!(name.validate(&json!("x"), &ValidateOptions::default()).is_err());
        assert_eq!(
            name.parse(&json!("  bob "), &ValidateOptions::default()).unwrap(),
            json!("bob")
        );
        assert!(matches!(schema.pick("missing"), Err(SchemaError::FieldNotFound(_))));
    }

    #[test]
    fn test_pick_finds_array_fields() {
        let schema = Schema::new(vec![FieldDefinition::new("items[*].sku", FieldKind::String).unwrap()]).unwrap();
        let sku = schema.pick("items.*.sku").unwrap();
        assert_eq!(sku.path(), "items[*].sku");
        assert!(sku.validate(&json!(3), &ValidateOptions::default()).is_err());
    }

    #[test]
    fn test_schema_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Schema>();
        assert_send_sync::<FieldValidator>();
    }
}
