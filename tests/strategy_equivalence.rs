//! Property tests: every applicable strategy reports the same result

use familiar_validation::config::CompilerConfig;
use familiar_validation::{
    EngineConfig, FieldDefinition, FieldKind, Rule, RuleRegistry, Schema, SchemaError, StrategyMode, TransformArgs,
    ValidateOptions,
};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn plain_rule(registry: &RuleRegistry, index: usize) -> Rule {
    let (name, args) = match index {
        0 => ("min_length", vec![json!(3)]),
        1 => ("max_length", vec![json!(5)]),
        2 => ("min", vec![json!(0)]),
        3 => ("max", vec![json!(10)]),
        4 => ("integer", vec![]),
        5 => ("pattern", vec![json!("^[a-z]+$")]),
        6 => ("one_of", vec![json!("a"), json!("abc"), json!(3)]),
        7 => ("required", vec![]),
        _ => ("positive", vec![]),
    };
    registry.standard(name, args).unwrap()
}

fn conditional_rule(registry: &RuleRegistry, index: usize) -> Rule {
    let name = match index {
        0 => "skip_if",
        1 => "required_if",
        _ => "optional_if",
    };
    registry.standard(name, vec![json!("flag")]).unwrap()
}

fn config(strategy: StrategyMode, specialize: bool) -> EngineConfig {
    EngineConfig {
        compiler: CompilerConfig { strategy, specialize },
        ..EngineConfig::default()
    }
}

fn any_kind() -> impl Strategy<Value = FieldKind> {
    prop_oneof![
        Just(FieldKind::Any),
        Just(FieldKind::String),
        Just(FieldKind::Number),
        Just(FieldKind::Union),
    ]
}

/// `None` leaves the field absent
fn any_field_value() -> impl Strategy<Value = Option<Value>> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-20i64..20).prop_map(|n| json!(n)),
        "[a-z0-9 ]{0,8}".prop_map(Value::String),
    ];
    prop::option::of(leaf)
}

struct Case {
    definition: FieldDefinition,
    record: Value,
}

fn case(
    rules: Vec<Rule>,
    kind: FieldKind,
    optional: bool,
    transform: bool,
    value: Option<Value>,
    flag: bool,
) -> Case {
    let registry = RuleRegistry::with_builtins();
    let mut definition = FieldDefinition::new("v", kind).unwrap().rules(rules);
    if optional {
        definition = definition.optional();
    }
    if transform {
        definition = definition
            .transform(registry.transform("trim", TransformArgs::Values(vec![])).unwrap())
            .transform(registry.transform("uppercase", TransformArgs::Values(vec![])).unwrap());
    }

    let mut record = Map::new();
    record.insert("flag".to_string(), Value::Bool(flag));
    if let Some(value) = value {
        record.insert("v".to_string(), value);
    }
    Case {
        definition,
        record: Value::Object(record),
    }
}

fn outcomes(case: &Case, config: &EngineConfig, options: &ValidateOptions) -> (Value, Value) {
    let schema = Schema::with_config(vec![case.definition.clone()], config).unwrap();
    let validated = schema.validate(&case.record, options);
    let parsed = schema.parse(&case.record, options);
    (
        serde_json::to_value(validated.map_err(|e| e.into_inner())).unwrap(),
        serde_json::to_value(parsed.map_err(|e| e.into_inner())).unwrap(),
    )
}

proptest! {
    /// Chains without short-circuiting rules: all strategies agree
    #[test]
    fn test_plain_chains_agree_across_strategies(
        chain in prop::collection::vec(0usize..9, 0..5),
        kind in any_kind(),
        optional in any::<bool>(),
        transform in any::<bool>(),
        value in any_field_value(),
        flag in any::<bool>(),
        abort_each in any::<bool>(),
    ) {
        let registry = RuleRegistry::with_builtins();
        let rules = chain.iter().map(|&i| plain_rule(&registry, i)).collect();
        let case = case(rules, kind, optional, transform, value, flag);
        let options = ValidateOptions::default().abort_early_on_each_field(abort_each);

        let reference = outcomes(&case, &config(StrategyMode::SkipAware, true), &options);
        for (mode, specialize) in [
            (StrategyMode::FastSeparated, true),
            (StrategyMode::Auto, true),
            (StrategyMode::Auto, false),
        ] {
            prop_assert_eq!(&outcomes(&case, &config(mode, specialize), &options), &reference);
        }
    }

    /// Chains with a conditional: skip-aware and auto agree, forced fast path is refused
    #[test]
    fn test_short_circuit_chains_agree(
        before in prop::collection::vec(0usize..9, 0..3),
        conditional in 0usize..3,
        after in prop::collection::vec(0usize..9, 0..3),
        kind in any_kind(),
        transform in any::<bool>(),
        value in any_field_value(),
        flag in any::<bool>(),
        abort_each in any::<bool>(),
    ) {
        let registry = RuleRegistry::with_builtins();
        let mut rules: Vec<Rule> = before.iter().map(|&i| plain_rule(&registry, i)).collect();
        rules.push(conditional_rule(&registry, conditional));
        rules.extend(after.iter().map(|&i| plain_rule(&registry, i)));
        let case = case(rules, kind, false, transform, value, flag);
        let options = ValidateOptions::default().abort_early_on_each_field(abort_each);

        let reference = outcomes(&case, &config(StrategyMode::SkipAware, true), &options);
        prop_assert_eq!(&outcomes(&case, &config(StrategyMode::Auto, true), &options), &reference);
        prop_assert_eq!(&outcomes(&case, &config(StrategyMode::Auto, false), &options), &reference);

        let forced = Schema::with_config(
            vec![case.definition.clone()],
            &config(StrategyMode::FastSeparated, true),
        );
        prop_assert!(
            matches!(forced, Err(SchemaError::StrategyNotApplicable { .. })),
            "expected StrategyNotApplicable, got {:?}",
            forced
        );
    }
}
