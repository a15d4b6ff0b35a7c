//! Validation levels
//!
//! A [`FieldSet`] is everything that runs against one container value: the
//! record root, or a single array element. It holds plain fields (paths
//! relative to the container, no wildcards) and the array batches rooted in
//! that container.
//!
//! At the root, batch errors are reported before plain-field errors; inside
//! an element, the element's own fields run before its child arrays. Defaults
//! never replace a present value of the wrong shape.

use std::borrow::Cow;
use std::sync::{Arc, OnceLock};

use serde_json::Value;

use crate::batch::ArrayBatchDescriptor;
use crate::compile::{CallContext, CompileOptions, CompiledValidator, Mode, Strategy};
use crate::error::{Result, ValidationError};
use crate::field::FieldDefinition;
use crate::path::FieldPath;
use crate::recursive::{self, RecursionState};

/// One field at a level, compiled on first use
#[derive(Debug)]
pub(crate) struct FieldEntry {
    definition: Arc<FieldDefinition>,
    relative: FieldPath,
    strategy: Strategy,
    compiled: OnceLock<Arc<CompiledValidator>>,
}

impl FieldEntry {
    /// Strategy applicability is checked here so a bad schema fails at construction
    pub(crate) fn new(
        definition: Arc<FieldDefinition>,
        relative: FieldPath,
        options: &CompileOptions,
    ) -> Result<Self> {
        let strategy = CompiledValidator::check(&definition, options)?;
        relative.ensure_settable()?;
        Ok(Self {
            definition,
            relative,
            strategy,
            compiled: OnceLock::new(),
        })
    }

    pub(crate) fn definition(&self) -> &FieldDefinition {
        &self.definition
    }

    pub(crate) fn validator(&self) -> Arc<CompiledValidator> {
        self.compiled
            .get_or_init(|| Arc::new(CompiledValidator::build(&self.definition, self.strategy)))
            .clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LevelOrder {
    ArraysFirst,
    FieldsFirst,
}

/// Errors of one level plus, in parse mode, the rewritten container
#[derive(Debug, Default)]
pub(crate) struct LevelOutcome {
    pub(crate) errors: Vec<ValidationError>,
    pub(crate) value: Option<Value>,
}

#[derive(Debug)]
pub(crate) struct FieldSet {
    fields: Vec<FieldEntry>,
    arrays: Vec<ArrayBatchDescriptor>,
    order: LevelOrder,
}

impl FieldSet {
    pub(crate) fn new(fields: Vec<FieldEntry>, arrays: Vec<ArrayBatchDescriptor>, order: LevelOrder) -> Self {
        Self { fields, arrays, order }
    }

    pub(crate) fn fields(&self) -> &[FieldEntry] {
        &self.fields
    }

    pub(crate) fn arrays(&self) -> &[ArrayBatchDescriptor] {
        &self.arrays
    }

    /// Fill absent fields that declare a default
    ///
    /// A default is only written where nothing is present: a container of
    /// the wrong shape on the way to the field is left for the field to
    /// report.
    pub(crate) fn apply_defaults(&self, container: &mut Value) {
        for entry in &self.fields {
            let Some(default) = entry.definition.default_value() else {
                continue;
            };
            if !entry.relative.is_vacant(container) {
                continue;
            }
            if let Err(err) = entry.relative.set(container, default.clone()) {
                tracing::warn!(path = %entry.definition.path(), error = %err, "could not apply default");
            }
        }
    }

    pub(crate) fn needs_defaults(&self, container: &Value) -> bool {
        self.fields
            .iter()
            .any(|entry| entry.definition.default_value().is_some() && entry.relative.is_vacant(container))
    }

    /// Validate one container; `prefix` is its concrete path
    ///
    /// In parse mode plain fields always run before the batches so that a
    /// batch walks the array its covering field produced. Errors are still
    /// reported in the level's order.
    pub(crate) fn run(
        &self,
        container: &Value,
        prefix: &str,
        call: &CallContext<'_>,
        state: &mut RecursionState,
    ) -> LevelOutcome {
        let container: Cow<'_, Value> = if self.needs_defaults(container) {
            let mut filled = container.clone();
            self.apply_defaults(&mut filled);
            Cow::Owned(filled)
        } else {
            Cow::Borrowed(container)
        };
        let mut output = match call.mode {
            Mode::Parse => Some(Value::clone(&container)),
            Mode::Validate => None,
        };
        let mut errors = Vec::new();

        match (self.order, call.mode) {
            (LevelOrder::ArraysFirst, Mode::Validate) => {
                if !self.run_arrays(&container, prefix, call, state, &mut errors, None) {
                    self.run_fields(&container, prefix, call, state, &mut errors, None);
                }
            }
            (LevelOrder::ArraysFirst, Mode::Parse) => {
                let mut field_errors = Vec::new();
                self.run_fields(&container, prefix, call, state, &mut field_errors, output.as_mut());
                self.run_arrays(&container, prefix, call, state, &mut errors, output.as_mut());
                if !(call.abort_early && !errors.is_empty()) {
                    errors.extend(field_errors);
                }
            }
            (LevelOrder::FieldsFirst, _) => {
                if !self.run_fields(&container, prefix, call, state, &mut errors, output.as_mut()) {
                    self.run_arrays(&container, prefix, call, state, &mut errors, output.as_mut());
                }
            }
        }

        LevelOutcome { errors, value: output }
    }

    /// Returns true when the run was aborted
    ///
    /// Batches read their array from `output` when there is one, so values
    /// already rewritten at this level are carried through.
    fn run_arrays(
        &self,
        container: &Value,
        prefix: &str,
        call: &CallContext<'_>,
        state: &mut RecursionState,
        errors: &mut Vec<ValidationError>,
        mut output: Option<&mut Value>,
    ) -> bool {
        for batch in &self.arrays {
            let source = output.as_deref().unwrap_or(container);
            let Some(outcome) = batch.process(source, prefix, call, state) else {
                continue;
            };
            errors.extend(outcome.errors);
            if call.abort_early && !errors.is_empty() {
                return true;
            }
            if let (Some(out), Some(value)) = (output.as_deref_mut(), outcome.value) {
                write_back(out, batch.relative(), value);
            }
        }
        false
    }

    /// Returns true when the run was aborted
    fn run_fields(
        &self,
        container: &Value,
        prefix: &str,
        call: &CallContext<'_>,
        state: &mut RecursionState,
        errors: &mut Vec<ValidationError>,
        mut output: Option<&mut Value>,
    ) -> bool {
        for entry in &self.fields {
            let value = entry.relative.get(container);
            let path = entry.relative.under(prefix);
            let outcome = entry.validator().run(value, &path, call);
            let passed = outcome.is_valid();
            errors.extend(outcome.errors);
            let mut produced = outcome.value;

            if passed {
                if let (Some(spec), Some(current)) = (entry.definition.recursive(), value) {
                    let node = produced.as_ref().unwrap_or(current);
                    let nested = recursive::descend(self, spec, node, &path, call, state);
                    errors.extend(nested.errors);
                    if nested.value.is_some() {
                        produced = nested.value;
                    }
                }
            }

            if call.abort_early && !errors.is_empty() {
                return true;
            }
            if let (Some(out), Some(value)) = (output.as_deref_mut(), produced) {
                write_back(out, &entry.relative, value);
            }
        }
        false
    }
}

fn write_back(output: &mut Value, path: &FieldPath, value: Value) {
    if let Err(err) = path.set(output, value) {
        tracing::warn!(path = %path, error = %err, "could not write parsed value");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::Mode;
    use crate::field::FieldKind;
    use crate::recursive::DEFAULT_MAX_DEPTH;
    use crate::rule::RuleRegistry;
    use serde_json::json;

    fn entry(def: FieldDefinition) -> FieldEntry {
        let relative = def.path().clone();
        FieldEntry::new(Arc::new(def), relative, &CompileOptions::default()).unwrap()
    }

    fn call(record: &Value, mode: Mode, abort_early: bool) -> CallContext<'_> {
        CallContext {
            record,
            context: None,
            abort_early,
            abort_early_on_each_field: true,
            mode,
        }
    }

    #[test]
    fn test_collects_errors_in_declaration_order() {
        let set = FieldSet::new(
            vec![
                entry(FieldDefinition::new("a", FieldKind::String).unwrap()),
                entry(FieldDefinition::new("b.c", FieldKind::Number).unwrap()),
            ],
            vec![],
            LevelOrder::ArraysFirst,
        );
        let record = json!({"b": {"c": "x"}});
        let mut state = RecursionState::new(DEFAULT_MAX_DEPTH);

        let outcome = set.run(&record, "", &call(&record, Mode::Validate, false), &mut state);
        let paths: Vec<&str> = outcome.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a", "b.c"]);

        let outcome = set.run(&record, "", &call(&record, Mode::Validate, true), &mut state);
        assert_eq!(outcome.errors.len(), 1);
    }

    #[test]
    fn test_prefix_is_applied_to_error_paths() {
        let set = FieldSet::new(
            vec![entry(FieldDefinition::new("sku", FieldKind::String).unwrap())],
            vec![],
            LevelOrder::FieldsFirst,
        );
        let element = json!({});
        let mut state = RecursionState::new(DEFAULT_MAX_DEPTH);
        let outcome = set.run(&element, "items[2]", &call(&element, Mode::Validate, true), &mut state);
        assert_eq!(outcome.errors[0].path, "items[2].sku");
    }

    #[test]
    fn test_defaults_and_parse_output() {
        let registry = RuleRegistry::with_builtins();
        let set = FieldSet::new(
            vec![
                entry(FieldDefinition::new("role", FieldKind::String).unwrap().with_default(json!("user"))),
                entry(
                    FieldDefinition::new("name", FieldKind::String)
                        .unwrap()
                        .transform(registry.transform("uppercase", crate::rule::TransformArgs::Values(vec![])).unwrap()),
                ),
            ],
            vec![],
            LevelOrder::ArraysFirst,
        );
        let record = json!({"name": "ada", "extra": 1});
        let mut state = RecursionState::new(DEFAULT_MAX_DEPTH);
        let outcome = set.run(&record, "", &call(&record, Mode::Parse, true), &mut state);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.value, Some(json!({"name": "ADA", "role": "user", "extra": 1})));
    }

    #[test]
    fn test_defaults_skip_containers_of_the_wrong_shape() {
        let set = FieldSet::new(
            vec![entry(FieldDefinition::new("qty", FieldKind::Integer).unwrap().with_default(json!(1)))],
            vec![],
            LevelOrder::FieldsFirst,
        );
        let mut element = json!("garbage");
        assert!(!set.needs_defaults(&element));
        set.apply_defaults(&mut element);
        assert_eq!(element, json!("garbage"));

        let mut state = RecursionState::new(DEFAULT_MAX_DEPTH);
        let outcome = set.run(&element, "items[0]", &call(&element, Mode::Parse, true), &mut state);
        assert_eq!(outcome.errors[0].path, "items[0].qty");
        assert_eq!(outcome.errors[0].code, crate::error::codes::REQUIRED);
    }

    #[test]
    fn test_validator_is_compiled_once() {
        let e = entry(FieldDefinition::new("a", FieldKind::String).unwrap());
        let first = e.validator();
        let second = e.validator();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
