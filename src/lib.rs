//! Familiar Validation Engine
//!
//! Validates and optionally transforms JSON records against a declarative,
//! extensible set of field rules, producing either the (possibly rewritten)
//! value or an ordered list of errors with index-resolved paths.
//!
//! ## Features
//!
//! - **Field Paths**: dot, `[n]`, `[*]` and legacy `.*` segments, any depth
//! - **Rule Registry**: category-tagged factories with a built-in catalogue
//! - **Compiled Validators**: one strategy chosen per field, all equivalent
//! - **Array Batches**: every wildcard array walked once, nested arrays included
//! - **Recursive Fields**: self-similar structures with depth and cycle guards
//! - **Schema Documents**: the same schema in serde form
//!
//! ## Architecture
//!
//! ```text
//! Schema
//! ├── plain fields        (FieldEntry → CompiledValidator)
//! └── array batches       (ArrayBatchDescriptor)
//!     └── element level
//!         ├── element fields
//!         └── child batches
//! ```
//!
//! ## Example
//!
//! ```
//! use familiar_validation::{FieldDefinition, FieldKind, RuleRegistry, Schema, ValidateOptions};
//! use serde_json::json;
//!
//! let rules = RuleRegistry::with_builtins();
//! let schema = Schema::new(vec![
//!     FieldDefinition::new("orders[*].items[*].sku", FieldKind::String)?
//!         .rule(rules.standard("required", vec![])?),
//! ])?;
//!
//! let err = schema
//!     .validate(&json!({"orders": [{"items": [{"sku": ""}]}]}), &ValidateOptions::default())
//!     .unwrap_err();
//! assert_eq!(err.paths(), vec!["orders[0].items[0].sku"]);
//! # Ok::<(), familiar_validation::SchemaError>(())
//! ```

pub mod batch;
pub mod compile;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod field;
mod level;
pub mod path;
pub mod recursive;
pub mod rule;

pub use batch::ArrayBatchDescriptor;
pub use compile::{CompileOptions, CompiledValidator, Strategy, StrategyMode};
pub use config::EngineConfig;
pub use document::{FieldSpec, RuleSpec, SchemaDocument, TransformSpec};
pub use engine::{FieldValidator, Schema, ValidateOptions};
pub use error::{codes, Result, SchemaError, ValidationError, ValidationErrors, ValidationResult};
pub use field::{FieldDefinition, FieldKind};
pub use path::FieldPath;
pub use recursive::{RecursiveSpec, RecursiveTarget};
pub use rule::{
    ArrayExpectation, ContextRuleSpec, Rule, RuleArgs, RuleCategory, RuleComposer, RuleInput, RuleOutcome,
    RuleRegistry, Transform, TransformArgs,
};
