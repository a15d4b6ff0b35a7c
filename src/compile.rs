//! Validator compilation
//!
//! Turns one [`FieldDefinition`] into a [`CompiledValidator`]: the implicit
//! type check is prepended to the declared chain and an execution strategy is
//! chosen once, up front.
//!
//! ## Strategies
//!
//! - `Empty`: nothing to run
//! - `Single`: exactly one non-short-circuiting rule
//! - `FastSeparated`: a flat loop, usable when no rule can short-circuit
//! - `SkipAware`: honors `SkipRemaining` / `SkipAll` outcomes
//!
//! Both loop strategies report the same errors for chains they both accept.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{codes, Result, SchemaError, ValidationError};
use crate::field::{describe, FieldDefinition, FieldKind};
use crate::rule::{Rule, RuleCategory, RuleInput, RuleOutcome, Transform};

// =============================================================================
// Strategy selection
// =============================================================================

/// Requested strategy, from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyMode {
    #[default]
    Auto,
    SkipAware,
    FastSeparated,
}

/// Strategy a compiled validator runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Empty,
    Single,
    FastSeparated,
    SkipAware,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Empty => "empty",
            Strategy::Single => "single",
            Strategy::FastSeparated => "fast_separated",
            Strategy::SkipAware => "skip_aware",
        }
    }

    /// Pick the strategy for a full chain (type check included)
    ///
    /// `specialize` enables the `Empty` and `Single` shortcuts in `Auto` mode.
    pub fn select(path: &str, rules: &[Rule], options: &CompileOptions) -> Result<Strategy> {
        let short_circuits = rules.iter().any(Rule::can_short_circuit);
        match options.strategy {
            StrategyMode::SkipAware => Ok(Strategy::SkipAware),
            StrategyMode::FastSeparated if short_circuits => Err(SchemaError::StrategyNotApplicable {
                path: path.to_string(),
                strategy: Strategy::FastSeparated.as_str().to_string(),
                reason: "chain contains a short-circuiting rule".to_string(),
            }),
            StrategyMode::FastSeparated => Ok(Strategy::FastSeparated),
            StrategyMode::Auto => Ok(match (rules.len(), short_circuits) {
                (0, _) if options.specialize => Strategy::Empty,
                (1, false) if options.specialize => Strategy::Single,
                (_, false) => Strategy::FastSeparated,
                (_, true) => Strategy::SkipAware,
            }),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Knobs that affect compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    pub strategy: StrategyMode,
    pub specialize: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            strategy: StrategyMode::Auto,
            specialize: true,
        }
    }
}

// =============================================================================
// Execution context
// =============================================================================

/// Validate only, or validate and rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Validate,
    Parse,
}

/// Per-call state shared by every validator of one run
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    /// Whole record (with defaults applied)
    pub record: &'a Value,
    pub context: Option<&'a Value>,
    pub abort_early: bool,
    pub abort_early_on_each_field: bool,
    pub mode: Mode,
}

/// Errors of one field plus, in parse mode, its output value
#[derive(Debug, Default)]
pub struct FieldOutcome {
    pub errors: Vec<ValidationError>,
    /// Parse output; `None` in validate mode or when the field is absent
    pub value: Option<Value>,
}

impl FieldOutcome {
    fn failed(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
            value: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

// =============================================================================
// Compiled validator
// =============================================================================

/// An executable rule chain for one field
#[derive(Debug)]
pub struct CompiledValidator {
    path: String,
    rules: Vec<Rule>,
    transforms: Vec<Transform>,
    strategy: Strategy,
    optional: bool,
    requirement: bool,
}

impl CompiledValidator {
    /// Compile with strategy selection; fails only for inapplicable forced strategies
    pub fn compile(definition: &FieldDefinition, options: &CompileOptions) -> Result<Self> {
        let strategy = Self::check(definition, options)?;
        Ok(Self::build(definition, strategy))
    }

    /// Check strategy applicability without building the validator
    pub fn check(definition: &FieldDefinition, options: &CompileOptions) -> Result<Strategy> {
        Strategy::select(&definition.path().to_string(), &full_chain(definition), options)
    }

    /// Build with a strategy already selected for this definition
    pub(crate) fn build(definition: &FieldDefinition, strategy: Strategy) -> Self {
        let rules = full_chain(definition);
        let path = definition.path().to_string();
        tracing::debug!(
            path = %path,
            strategy = %strategy,
            rules = rules.len(),
            "compiled field validator"
        );
        Self {
            path,
            rules,
            transforms: definition.transforms().to_vec(),
            strategy,
            optional: definition.is_optional(),
            requirement: definition.is_required(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Rules in execution order, type check first
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Presence handling, then the chain
    ///
    /// Absent optional fields produce nothing. Absent fields without an
    /// explicit requirement rule fail with `required`; fields that carry one
    /// leave presence to the chain.
    pub fn run(&self, value: Option<&Value>, path: &str, call: &CallContext<'_>) -> FieldOutcome {
        match value {
            None if self.optional => FieldOutcome::default(),
            None if !self.requirement => FieldOutcome::failed(ValidationError::required(path)),
            _ => self.execute(value, path, call),
        }
    }

    /// Run the chain without presence handling
    pub fn execute(&self, value: Option<&Value>, path: &str, call: &CallContext<'_>) -> FieldOutcome {
        let input = RuleInput {
            value,
            record: call.record,
            context: call.context,
            path,
        };
        let (errors, skip_transforms) = match self.strategy {
            Strategy::Empty => (Vec::new(), false),
            Strategy::Single => (self.run_single(&input), false),
            Strategy::FastSeparated => (self.run_separated(&input, call.abort_early_on_each_field), false),
            Strategy::SkipAware => self.run_skip_aware(&input, call.abort_early_on_each_field),
        };

        if !errors.is_empty() {
            return FieldOutcome { errors, value: None };
        }
        let value = match call.mode {
            Mode::Validate => None,
            Mode::Parse => value.cloned().map(|v| {
                if skip_transforms {
                    v
                } else {
                    self.apply_transforms(v)
                }
            }),
        };
        FieldOutcome { errors, value }
    }

    /// Transforms never see absent or null values
    fn apply_transforms(&self, value: Value) -> Value {
        if value.is_null() {
            return value;
        }
        self.transforms
            .iter()
            .fold(value, |acc, transform| transform.apply(acc))
    }

    fn run_single(&self, input: &RuleInput<'_>) -> Vec<ValidationError> {
        self.rules
            .first()
            .and_then(|rule| {
                let outcome = rule.evaluate(input)?;
                failure(rule, outcome, input)
            })
            .into_iter()
            .collect()
    }

    fn run_separated(&self, input: &RuleInput<'_>, abort_each: bool) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for rule in &self.rules {
            let Some(outcome) = rule.evaluate(input) else {
                continue;
            };
            if let Some(error) = failure(rule, outcome, input) {
                errors.push(error);
                if abort_each {
                    break;
                }
            }
        }
        errors
    }

    fn run_skip_aware(&self, input: &RuleInput<'_>, abort_each: bool) -> (Vec<ValidationError>, bool) {
        let mut errors = Vec::new();
        for rule in &self.rules {
            let Some(outcome) = rule.evaluate(input) else {
                continue;
            };
            match outcome {
                RuleOutcome::SkipRemaining => return (errors, false),
                RuleOutcome::SkipAll => return (errors, true),
                _ => {}
            }
            if let Some(error) = failure(rule, outcome, input) {
                errors.push(error);
                if abort_each {
                    break;
                }
            }
        }
        (errors, false)
    }
}

fn failure(rule: &Rule, outcome: RuleOutcome, input: &RuleInput<'_>) -> Option<ValidationError> {
    let code = match outcome {
        RuleOutcome::Invalid => rule.code(),
        RuleOutcome::InvalidAs(code) => code,
        RuleOutcome::Valid | RuleOutcome::SkipRemaining | RuleOutcome::SkipAll => return None,
    };
    Some(ValidationError::new(input.path, code, rule.message(input)))
}

fn full_chain(definition: &FieldDefinition) -> Vec<Rule> {
    let mut rules = Vec::with_capacity(definition.rule_chain().len() + 1);
    if definition.kind().is_checked() {
        rules.push(type_check(definition.kind(), definition.is_nullable()));
    }
    rules.extend(definition.rule_chain().iter().cloned());
    rules
}

/// Implicit primitive type check; skips absent values, and null when nullable
fn type_check(kind: FieldKind, nullable: bool) -> Rule {
    Rule::predicate("type", RuleCategory::Standard, codes::INVALID_TYPE, move |input: &RuleInput<'_>| {
        input.value.map_or(true, |value| kind.matches(value))
    })
    .skip_for_null(nullable)
    .with_message_fn(move |input: &RuleInput<'_>| {
        format!("Expected {}, received {}", kind.name(), describe(input.value))
    })
}
