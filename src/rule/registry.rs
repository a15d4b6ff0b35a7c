//! Rule Registry & Dispatcher
//!
//! Holds named, category-tagged factories and builds immutable rules and
//! transforms on demand. Every category has exactly one factory shape
//! ([`RuleFactory`]) and one argument shape ([`RuleArgs`]); [`RuleRegistry::build`]
//! pairs them with an exhaustive match, so a name registered as one category
//! can never be built with another category's arguments.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::builtin;
use super::composer::RuleComposer;
use super::{MultiFieldCheck, Predicate, Rule, RuleCategory, Transform, TransformFn};
use crate::error::{Result, SchemaError};
use crate::path::FieldPath;

pub type StandardFactory = Arc<dyn Fn(&[Value]) -> Result<Rule> + Send + Sync>;
pub type ConditionalFactory = Arc<dyn Fn(Predicate) -> Result<Rule> + Send + Sync>;
pub type FieldReferenceFactory = Arc<dyn Fn(FieldPath) -> Result<Rule> + Send + Sync>;
pub type MultiFieldFactory =
    Arc<dyn Fn(Vec<FieldPath>, MultiFieldCheck) -> Result<Rule> + Send + Sync>;
pub type TransformFactory = Arc<dyn Fn(TransformArgs) -> Result<Transform> + Send + Sync>;
pub type ArrayElementFactory = Arc<dyn Fn(ArrayExpectation) -> Result<Rule> + Send + Sync>;
pub type ContextFactory = Arc<dyn Fn(ContextRuleSpec) -> Result<Rule> + Send + Sync>;
pub type ComposableFactory = Arc<dyn Fn() -> RuleComposer + Send + Sync>;

/// A factory, tagged by the category it produces
#[derive(Clone)]
pub enum RuleFactory {
    Standard(StandardFactory),
    Conditional(ConditionalFactory),
    FieldReference(FieldReferenceFactory),
    MultiFieldReference(MultiFieldFactory),
    Transform(TransformFactory),
    ArrayElement(ArrayElementFactory),
    Context(ContextFactory),
    Composable(ComposableFactory),
}

impl RuleFactory {
    pub fn category(&self) -> RuleCategory {
        match self {
            RuleFactory::Standard(_) => RuleCategory::Standard,
            RuleFactory::Conditional(_) => RuleCategory::Conditional,
            RuleFactory::FieldReference(_) => RuleCategory::FieldReference,
            RuleFactory::MultiFieldReference(_) => RuleCategory::MultiFieldReference,
            RuleFactory::Transform(_) => RuleCategory::Transform,
            RuleFactory::ArrayElement(_) => RuleCategory::ArrayElement,
            RuleFactory::Context(_) => RuleCategory::Context,
            RuleFactory::Composable(_) => RuleCategory::Composable,
        }
    }
}

/// Arguments of an array-element factory
#[derive(Clone)]
pub enum ArrayExpectation {
    /// Literal expectations (a count, values that must be included, ...)
    Values(Vec<Value>),
    /// A predicate applied to each element
    Element(Predicate),
}

/// Arguments of a transform factory
#[derive(Clone)]
pub enum TransformArgs {
    Values(Vec<Value>),
    Function(TransformFn),
}

/// Arguments of a context factory
#[derive(Clone)]
pub struct ContextRuleSpec {
    /// `(value, context, record) -> bool`
    pub check: Arc<dyn Fn(Option<&Value>, &Value, &Value) -> bool + Send + Sync>,
    /// The context must be present
    pub required: bool,
    /// Treat a missing context as valid even when required
    pub fallback_to_valid: bool,
}

impl ContextRuleSpec {
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(Option<&Value>, &Value, &Value) -> bool + Send + Sync + 'static,
    {
        Self {
            check: Arc::new(check),
            required: true,
            fallback_to_valid: false,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn fallback_to_valid(mut self, fallback: bool) -> Self {
        self.fallback_to_valid = fallback;
        self
    }
}

/// Arguments for building a rule, one shape per category
#[derive(Clone)]
pub enum RuleArgs {
    Values(Vec<Value>),
    Predicate(Predicate),
    Field(FieldPath),
    Fields(Vec<FieldPath>, MultiFieldCheck),
    Transform(TransformArgs),
    Array(ArrayExpectation),
    Context(ContextRuleSpec),
}

impl RuleArgs {
    /// Category these arguments are shaped for
    pub fn category(&self) -> RuleCategory {
        match self {
            RuleArgs::Values(_) => RuleCategory::Standard,
            RuleArgs::Predicate(_) => RuleCategory::Conditional,
            RuleArgs::Field(_) => RuleCategory::FieldReference,
            RuleArgs::Fields(..) => RuleCategory::MultiFieldReference,
            RuleArgs::Transform(_) => RuleCategory::Transform,
            RuleArgs::Array(_) => RuleCategory::ArrayElement,
            RuleArgs::Context(_) => RuleCategory::Context,
        }
    }
}

/// What a factory produced
#[derive(Debug, Clone)]
pub enum Built {
    Rule(Rule),
    Rules(Vec<Rule>),
    Transform(Transform),
}

/// Named rule and transform factories
#[derive(Clone, Default)]
pub struct RuleRegistry {
    factories: HashMap<String, RuleFactory>,
}

impl RuleRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in catalogue
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    /// Register a factory; names are unique
    pub fn register(&mut self, name: impl Into<String>, factory: RuleFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(SchemaError::DuplicateRule(name));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    pub(crate) fn insert(&mut self, name: &str, factory: RuleFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn category_of(&self, name: &str) -> Option<RuleCategory> {
        self.factories.get(name).map(RuleFactory::category)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn factory(&self, name: &str) -> Result<&RuleFactory> {
        self.factories
            .get(name)
            .ok_or_else(|| SchemaError::UnknownRule(name.to_string()))
    }

    /// Build a rule or transform by name
    pub fn build(&self, name: &str, args: RuleArgs) -> Result<Built> {
        let factory = self.factory(name)?;
        match (factory, args) {
            (RuleFactory::Standard(f), RuleArgs::Values(values)) => f(&values).map(Built::Rule),
            (RuleFactory::Conditional(f), RuleArgs::Predicate(predicate)) => f(predicate).map(Built::Rule),
            (RuleFactory::Conditional(f), RuleArgs::Values(values)) => {
                f(builtin::record_predicate(name, &values)?).map(Built::Rule)
            }
            (RuleFactory::FieldReference(f), RuleArgs::Field(path)) => f(path).map(Built::Rule),
            (RuleFactory::MultiFieldReference(f), RuleArgs::Fields(paths, check)) => {
                if paths.is_empty() {
                    return Err(SchemaError::invalid_args(name, "at least one field path is required"));
                }
                f(paths, check).map(Built::Rule)
            }
            (RuleFactory::Transform(f), RuleArgs::Transform(args)) => f(args).map(Built::Transform),
            (RuleFactory::Transform(f), RuleArgs::Values(values)) => {
                f(TransformArgs::Values(values)).map(Built::Transform)
            }
            (RuleFactory::ArrayElement(f), RuleArgs::Array(expectation)) => f(expectation).map(Built::Rule),
            (RuleFactory::ArrayElement(f), RuleArgs::Values(values)) => {
                f(ArrayExpectation::Values(values)).map(Built::Rule)
            }
            (RuleFactory::Context(f), RuleArgs::Context(spec)) => f(spec).map(Built::Rule),
            (RuleFactory::Composable(f), RuleArgs::Values(values)) => {
                let mut composer = f();
                composer.add(values);
                composer.finish().map(Built::Rules)
            }
            (factory, args) => Err(SchemaError::CategoryMismatch {
                name: name.to_string(),
                expected: factory.category().to_string(),
                actual: args.category().to_string(),
            }),
        }
    }

    /// Build a single rule by name
    pub fn rule(&self, name: &str, args: RuleArgs) -> Result<Rule> {
        match self.build(name, args)? {
            Built::Rule(rule) => Ok(rule),
            Built::Rules(mut rules) if rules.len() == 1 => Ok(rules.remove(0)),
            Built::Rules(_) => Err(SchemaError::invalid_args(name, "produced more than one rule")),
            Built::Transform(_) => Err(SchemaError::CategoryMismatch {
                name: name.to_string(),
                expected: RuleCategory::Transform.to_string(),
                actual: "rule".to_string(),
            }),
        }
    }

    /// Build a standard rule from literal arguments
    pub fn standard(&self, name: &str, args: Vec<Value>) -> Result<Rule> {
        self.rule(name, RuleArgs::Values(args))
    }

    /// Build a transform by name
    pub fn transform(&self, name: &str, args: TransformArgs) -> Result<Transform> {
        match self.build(name, RuleArgs::Transform(args))? {
            Built::Transform(transform) => Ok(transform),
            _ => Err(SchemaError::CategoryMismatch {
                name: name.to_string(),
                expected: RuleCategory::Transform.to_string(),
                actual: "rule".to_string(),
            }),
        }
    }

    /// Start a composer for a composable rule
    pub fn composer(&self, name: &str) -> Result<RuleComposer> {
        match self.factory(name)? {
            RuleFactory::Composable(f) => Ok(f()),
            other => Err(SchemaError::CategoryMismatch {
                name: name.to_string(),
                expected: other.category().to_string(),
                actual: RuleCategory::Composable.to_string(),
            }),
        }
    }
}
