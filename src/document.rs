//! Declarative schema documents
//!
//! A [`SchemaDocument`] is the serde form of a schema: field specs whose rules
//! and transforms are named by registry key with literal JSON arguments.
//!
//! ## Example
//! ```json
//! {
//!   "fields": [
//!     {"path": "email", "kind": "string",
//!      "rules": [{"name": "email"}],
//!      "transforms": [{"name": "trim"}, {"name": "lowercase"}]},
//!     {"path": "items[*].qty", "kind": "integer",
//!      "rules": [{"name": "range", "args": [1, 99]}]}
//!   ]
//! }
//! ```
//!
//! Rules that need code (multi-field checks, context checks, element
//! predicates) cannot be expressed here; build those definitions directly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::engine::Schema;
use crate::error::{Result, SchemaError};
use crate::field::{FieldDefinition, FieldKind};
use crate::path::FieldPath;
use crate::rule::{Rule, RuleArgs, RuleCategory, RuleComposer, RuleRegistry, TransformArgs};

/// A whole schema in declarative form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

/// One field in declarative form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub path: String,

    #[serde(default)]
    pub kind: FieldKind,

    #[serde(default)]
    pub optional: bool,

    #[serde(default)]
    pub nullable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default)]
    pub rules: Vec<RuleSpec>,

    #[serde(default)]
    pub transforms: Vec<TransformSpec>,
}

/// A rule by registry name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,

    #[serde(default)]
    pub args: Vec<Value>,

    /// Replaces the rule's default message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A transform by registry name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSpec {
    pub name: String,

    #[serde(default)]
    pub args: Vec<Value>,
}

enum Slot {
    Rule(Rule),
    Composed(String),
}

impl SchemaDocument {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Resolve every spec against `registry`
    pub fn definitions(&self, registry: &RuleRegistry) -> Result<Vec<FieldDefinition>> {
        self.fields.iter().map(|spec| spec.definition(registry)).collect()
    }

    pub fn compile(&self, registry: &RuleRegistry, config: &EngineConfig) -> Result<Schema> {
        Schema::with_config(self.definitions(registry)?, config)
    }
}

impl FieldSpec {
    pub fn definition(&self, registry: &RuleRegistry) -> Result<FieldDefinition> {
        let mut definition = FieldDefinition::new(&self.path, self.kind)?;
        if self.optional {
            definition = definition.optional();
        }
        if self.nullable {
            definition = definition.nullable();
        }
        if let Some(default) = &self.default {
            definition = definition.with_default(default.clone());
        }

        // Composable calls with one name share a composer, placed at the first call
        let mut slots = Vec::with_capacity(self.rules.len());
        let mut composers: HashMap<String, (RuleComposer, Option<String>)> = HashMap::new();
        for spec in &self.rules {
            if registry.category_of(&spec.name) == Some(RuleCategory::Composable) {
                if let Some((composer, _)) = composers.get_mut(&spec.name) {
                    composer.add(spec.args.clone());
                } else {
                    let composer = registry.composer(&spec.name)?.push(spec.args.clone());
                    composers.insert(spec.name.clone(), (composer, spec.message.clone()));
                    slots.push(Slot::Composed(spec.name.clone()));
                }
                continue;
            }
            let rule = registry.rule(&spec.name, rule_args(registry, spec)?)?;
            slots.push(Slot::Rule(match &spec.message {
                Some(message) => rule.with_message(message.clone()),
                None => rule,
            }));
        }

        for slot in slots {
            match slot {
                Slot::Rule(rule) => definition = definition.rule(rule),
                Slot::Composed(name) => {
                    let Some((composer, message)) = composers.remove(&name) else {
                        continue;
                    };
                    let rules = composer.finish()?;
                    definition = definition.rules(rules.into_iter().map(|rule| match &message {
                        Some(message) => rule.with_message(message.clone()),
                        None => rule,
                    }));
                }
            }
        }

        for spec in &self.transforms {
            definition = definition.transform(registry.transform(&spec.name, TransformArgs::Values(spec.args.clone()))?);
        }
        Ok(definition)
    }
}

fn rule_args(registry: &RuleRegistry, spec: &RuleSpec) -> Result<RuleArgs> {
    match registry.category_of(&spec.name) {
        Some(RuleCategory::FieldReference) => {
            let [Value::String(path)] = spec.args.as_slice() else {
                return Err(SchemaError::invalid_args(&spec.name, "expected one field path"));
            };
            Ok(RuleArgs::Field(FieldPath::parse(path)?))
        }
        Some(RuleCategory::MultiFieldReference) | Some(RuleCategory::Context) => Err(SchemaError::invalid_args(
            &spec.name,
            "needs a check function and cannot be declared in a document",
        )),
        _ => Ok(RuleArgs::Values(spec.args.clone())),
    }
}
