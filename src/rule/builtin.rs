//! Built-in rule catalogue
//!
//! Registered by [`RuleRegistry::with_builtins`](super::RuleRegistry::with_builtins).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate};
use regex::Regex;
use serde_json::{Number, Value};

use super::composer::RuleComposer;
use super::registry::{ArrayExpectation, ContextRuleSpec, RuleFactory, RuleRegistry, TransformArgs};
use super::{MultiFieldCheck, Predicate, Rule, RuleCategory, RuleInput, RuleOutcome, Transform};
use crate::error::{codes, Result, SchemaError};
use crate::path::FieldPath;
use crate::recursive::RecursiveSpec;

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";
const URL_PATTERN: &str = r"^https?://[^\s/$.?#][^\s]*$";

/// Register every built-in factory
pub fn register_all(registry: &mut RuleRegistry) {
    let entries: Vec<(&str, RuleFactory)> = vec![
        // Standard
        ("required", RuleFactory::Standard(Arc::new(required))),
        ("min_length", RuleFactory::Standard(Arc::new(|args: &[Value]| length_rule("min_length", args)))),
        ("max_length", RuleFactory::Standard(Arc::new(|args: &[Value]| length_rule("max_length", args)))),
        ("length", RuleFactory::Standard(Arc::new(|args: &[Value]| length_rule("length", args)))),
        ("min", RuleFactory::Standard(Arc::new(|args: &[Value]| bound_rule("min", args)))),
        ("max", RuleFactory::Standard(Arc::new(|args: &[Value]| bound_rule("max", args)))),
        ("integer", RuleFactory::Standard(Arc::new(integer))),
        ("positive", RuleFactory::Standard(Arc::new(positive))),
        ("email", RuleFactory::Standard(Arc::new(|args: &[Value]| regex_rule("email", args, EMAIL_PATTERN, codes::INVALID_EMAIL)))),
        ("url", RuleFactory::Standard(Arc::new(|args: &[Value]| regex_rule("url", args, URL_PATTERN, codes::INVALID_URL)))),
        ("pattern", RuleFactory::Standard(Arc::new(pattern))),
        ("one_of", RuleFactory::Standard(Arc::new(one_of))),
        ("before", RuleFactory::Standard(Arc::new(|args: &[Value]| date_rule("before", args)))),
        ("after", RuleFactory::Standard(Arc::new(|args: &[Value]| date_rule("after", args)))),
        ("recursive", RuleFactory::Standard(Arc::new(recursive))),
        // Conditional
        ("required_if", RuleFactory::Conditional(Arc::new(required_if))),
        ("optional_if", RuleFactory::Conditional(Arc::new(optional_if))),
        ("skip_if", RuleFactory::Conditional(Arc::new(skip_if))),
        // Field references
        ("same_as", RuleFactory::FieldReference(Arc::new(|path: FieldPath| field_compare("same_as", path, true)))),
        ("different_from", RuleFactory::FieldReference(Arc::new(|path: FieldPath| field_compare("different_from", path, false)))),
        (
            "fields",
            RuleFactory::MultiFieldReference(Arc::new(|paths: Vec<FieldPath>, check: MultiFieldCheck| {
                Ok(Rule::predicate("fields", RuleCategory::MultiFieldReference, codes::CROSS_FIELD, move |input| {
                    let values: Vec<Option<&Value>> = paths.iter().map(|p| p.get(input.record)).collect();
                    check(&values, input.value, input.record)
                })
                .skip_for_undefined(false)
                .with_message("Cross-field validation failed"))
            })),
        ),
        // Arrays
        ("min_items", RuleFactory::ArrayElement(Arc::new(|e: ArrayExpectation| item_count("min_items", e)))),
        ("max_items", RuleFactory::ArrayElement(Arc::new(|e: ArrayExpectation| item_count("max_items", e)))),
        ("unique", RuleFactory::ArrayElement(Arc::new(unique))),
        ("includes", RuleFactory::ArrayElement(Arc::new(includes))),
        ("every", RuleFactory::ArrayElement(Arc::new(|e: ArrayExpectation| element_predicate("every", e)))),
        ("some", RuleFactory::ArrayElement(Arc::new(|e: ArrayExpectation| element_predicate("some", e)))),
        // Context
        ("context", RuleFactory::Context(Arc::new(context))),
        // Composable
        ("range", RuleFactory::Composable(Arc::new(|| RuleComposer::new("range", Arc::new(compose_range))))),
        ("length_range", RuleFactory::Composable(Arc::new(|| RuleComposer::new("length_range", Arc::new(compose_range))))),
        // Transforms
        ("trim", RuleFactory::Transform(Arc::new(|args: TransformArgs| string_transform("trim", args, |s| s.trim().to_string())))),
        ("lowercase", RuleFactory::Transform(Arc::new(|args: TransformArgs| string_transform("lowercase", args, |s| s.to_lowercase())))),
        ("uppercase", RuleFactory::Transform(Arc::new(|args: TransformArgs| string_transform("uppercase", args, |s| s.to_uppercase())))),
        ("to_number", RuleFactory::Transform(Arc::new(to_number))),
        ("transform", RuleFactory::Transform(Arc::new(custom_transform))),
    ];

    for (name, factory) in entries {
        registry.insert(name, factory);
    }
}

// =============================================================================
// Argument helpers
// =============================================================================

fn expect_len(name: &str, args: &[Value], len: usize) -> Result<()> {
    if args.len() != len {
        return Err(SchemaError::invalid_args(
            name,
            format!("expected {} argument(s), got {}", len, args.len()),
        ));
    }
    Ok(())
}

fn arg_usize(name: &str, args: &[Value], index: usize) -> Result<usize> {
    args.get(index)
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .ok_or_else(|| SchemaError::invalid_args(name, format!("argument {} must be a non-negative integer", index)))
}

fn arg_f64(name: &str, args: &[Value], index: usize) -> Result<f64> {
    args.get(index)
        .and_then(Value::as_f64)
        .ok_or_else(|| SchemaError::invalid_args(name, format!("argument {} must be a number", index)))
}

fn arg_str<'a>(name: &str, args: &'a [Value], index: usize) -> Result<&'a str> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| SchemaError::invalid_args(name, format!("argument {} must be a string", index)))
}

fn value_len(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

/// Record predicate from literal arguments
///
/// `[path]` tests the value at `path` for truthiness, `[path, value]` for equality.
pub(crate) fn record_predicate(name: &str, args: &[Value]) -> Result<Predicate> {
    if args.is_empty() || args.len() > 2 {
        return Err(SchemaError::invalid_args(name, "expected a field path and an optional value"));
    }
    let path = FieldPath::parse(arg_str(name, args, 0)?)?;
    let predicate: Predicate = match args.get(1).cloned() {
        Some(expected) => Arc::new(move |record: &Value| path.get(record) == Some(&expected)),
        None => Arc::new(move |record: &Value| is_truthy(path.get(record))),
    };
    Ok(predicate)
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::Number(n)) => n.as_f64().map_or(true, |n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Whole numbers, including floats with no fractional part such as `2.0`
pub fn is_integer(n: &Number) -> bool {
    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0)
}

/// Parse an RFC 3339 timestamp or a plain `YYYY-MM-DD` date
pub fn parse_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().fixed_offset())
}

// =============================================================================
// Standard rules
// =============================================================================

fn required(args: &[Value]) -> Result<Rule> {
    expect_len("required", args, 0)?;
    Ok(Rule::predicate("required", RuleCategory::Standard, codes::REQUIRED, |input| !input.is_empty())
        .skip_for_null(false)
        .skip_for_undefined(false)
        .as_requirement()
        .with_message("Required"))
}

fn length_rule(name: &'static str, args: &[Value]) -> Result<Rule> {
    expect_len(name, args, 1)?;
    let limit = arg_usize(name, args, 0)?;
    let (code, message) = match name {
        "min_length" => (codes::TOO_SHORT, format!("Must be at least {} characters", limit)),
        "max_length" => (codes::TOO_LONG, format!("Must be at most {} characters", limit)),
        _ => (codes::INVALID_LENGTH, format!("Must be exactly {} characters", limit)),
    };
    Ok(Rule::predicate(name, RuleCategory::Standard, code, move |input| {
        match input.value.and_then(value_len) {
            Some(len) => match name {
                "min_length" => len >= limit,
                "max_length" => len <= limit,
                _ => len == limit,
            },
            None => true,
        }
    })
    .with_message(message))
}

fn bound_rule(name: &'static str, args: &[Value]) -> Result<Rule> {
    expect_len(name, args, 1)?;
    let bound = arg_f64(name, args, 0)?;
    let is_min = name == "min";
    let (code, message) = if is_min {
        (codes::TOO_SMALL, format!("Must be greater than or equal to {}", bound))
    } else {
        (codes::TOO_BIG, format!("Must be less than or equal to {}", bound))
    };
    Ok(Rule::predicate(name, RuleCategory::Standard, code, move |input| {
        match input.value.and_then(Value::as_f64) {
            Some(n) if is_min => n >= bound,
            Some(n) => n <= bound,
            None => true,
        }
    })
    .with_message(message))
}

fn integer(args: &[Value]) -> Result<Rule> {
    expect_len("integer", args, 0)?;
    Ok(Rule::predicate("integer", RuleCategory::Standard, codes::NOT_INTEGER, |input| {
        match input.value {
            Some(Value::Number(n)) => is_integer(n),
            _ => true,
        }
    })
    .with_message("Must be an integer"))
}

fn positive(args: &[Value]) -> Result<Rule> {
    expect_len("positive", args, 0)?;
    Ok(Rule::predicate("positive", RuleCategory::Standard, codes::NOT_POSITIVE, |input| {
        input.value.and_then(Value::as_f64).map_or(true, |n| n > 0.0)
    })
    .with_message("Must be positive"))
}

fn regex_rule(name: &'static str, args: &[Value], pattern: &str, code: &'static str) -> Result<Rule> {
    expect_len(name, args, 0)?;
    let regex = Regex::new(pattern).map_err(|e| SchemaError::invalid_args(name, e.to_string()))?;
    Ok(string_match(name, regex, code))
}

fn pattern(args: &[Value]) -> Result<Rule> {
    expect_len("pattern", args, 1)?;
    let raw = arg_str("pattern", args, 0)?;
    let regex = Regex::new(raw).map_err(|e| SchemaError::invalid_args("pattern", e.to_string()))?;
    Ok(string_match("pattern", regex, codes::PATTERN_MISMATCH))
}

fn string_match(name: &'static str, regex: Regex, code: &'static str) -> Rule {
    let message = match name {
        "email" => "Invalid email address".to_string(),
        "url" => "Invalid URL".to_string(),
        _ => format!("Must match pattern {}", regex.as_str()),
    };
    Rule::predicate(name, RuleCategory::Standard, code, move |input| match input.value {
        Some(Value::String(s)) => regex.is_match(s),
        _ => true,
    })
    .with_message(message)
}

fn one_of(args: &[Value]) -> Result<Rule> {
    if args.is_empty() {
        return Err(SchemaError::invalid_args("one_of", "at least one allowed value is required"));
    }
    let allowed = args.to_vec();
    let message = format!(
        "Must be one of: {}",
        allowed.iter().map(Value::to_string).collect::<Vec<_>>().join(", ")
    );
    Ok(Rule::predicate("one_of", RuleCategory::Standard, codes::INVALID_ENUM, move |input| {
        input.value.map_or(true, |v| allowed.contains(v))
    })
    .with_message(message))
}

fn date_rule(name: &'static str, args: &[Value]) -> Result<Rule> {
    expect_len(name, args, 1)?;
    let raw = arg_str(name, args, 0)?;
    let limit = parse_date(raw).ok_or_else(|| SchemaError::invalid_args(name, format!("'{}' is not a date", raw)))?;
    let is_before = name == "before";
    let (code, message) = if is_before {
        (codes::DATE_TOO_LATE, format!("Must be before {}", raw))
    } else {
        (codes::DATE_TOO_EARLY, format!("Must be after {}", raw))
    };
    Ok(Rule::predicate(name, RuleCategory::Standard, code, move |input| {
        match input.value.and_then(Value::as_str).and_then(parse_date) {
            Some(date) if is_before => date < limit,
            Some(date) => date > limit,
            None => true,
        }
    })
    .with_message(message))
}

fn recursive(args: &[Value]) -> Result<Rule> {
    if args.is_empty() || args.len() > 2 {
        return Err(SchemaError::invalid_args("recursive", "expected a target and an optional max depth"));
    }
    let target = RecursiveSpec::parse_target(arg_str("recursive", args, 0)?)?;
    let mut spec = RecursiveSpec::new(target);
    if args.len() == 2 {
        spec = spec.with_max_depth(arg_usize("recursive", args, 1)?);
    }
    Ok(Rule::predicate("recursive", RuleCategory::Standard, "recursive", |_| true).with_recursive(spec))
}

// =============================================================================
// Conditional rules
// =============================================================================

fn required_if(predicate: Predicate) -> Result<Rule> {
    Ok(Rule::conditional("required_if", codes::REQUIRED, move |input| {
        if predicate(input.record) {
            if input.is_empty() {
                RuleOutcome::Invalid
            } else {
                RuleOutcome::Valid
            }
        } else if input.value.is_none() {
            RuleOutcome::SkipRemaining
        } else {
            RuleOutcome::Valid
        }
    })
    .with_message("Required"))
}

fn optional_if(predicate: Predicate) -> Result<Rule> {
    Ok(Rule::conditional("optional_if", codes::REQUIRED, move |input| {
        if !input.is_empty() {
            RuleOutcome::Valid
        } else if predicate(input.record) {
            RuleOutcome::SkipRemaining
        } else {
            RuleOutcome::Invalid
        }
    })
    .with_message("Required"))
}

fn skip_if(predicate: Predicate) -> Result<Rule> {
    Ok(Rule::conditional("skip_if", codes::REQUIRED, move |input| {
        if predicate(input.record) {
            RuleOutcome::SkipAll
        } else if input.value.is_none() {
            RuleOutcome::Invalid
        } else {
            RuleOutcome::Valid
        }
    })
    .with_message("Required"))
}

// =============================================================================
// Field references
// =============================================================================

fn field_compare(name: &'static str, other: FieldPath, equal: bool) -> Result<Rule> {
    let (code, message) = if equal {
        (codes::NOT_EQUAL, format!("Must match {}", other))
    } else {
        (codes::NOT_DIFFERENT, format!("Must differ from {}", other))
    };
    Ok(Rule::predicate(name, RuleCategory::FieldReference, code, move |input| {
        (input.value == other.get(input.record)) == equal
    })
    .with_message(message))
}

// =============================================================================
// Array rules
// =============================================================================

fn expect_values(name: &str, expectation: ArrayExpectation) -> Result<Vec<Value>> {
    match expectation {
        ArrayExpectation::Values(values) => Ok(values),
        ArrayExpectation::Element(_) => Err(SchemaError::invalid_args(name, "expected literal values, got a predicate")),
    }
}

fn item_count(name: &'static str, expectation: ArrayExpectation) -> Result<Rule> {
    let values = expect_values(name, expectation)?;
    expect_len(name, &values, 1)?;
    let limit = arg_usize(name, &values, 0)?;
    let is_min = name == "min_items";
    let (code, message) = if is_min {
        (codes::TOO_FEW_ITEMS, format!("Must contain at least {} item(s)", limit))
    } else {
        (codes::TOO_MANY_ITEMS, format!("Must contain at most {} item(s)", limit))
    };
    Ok(Rule::predicate(name, RuleCategory::ArrayElement, code, move |input| {
        match input.value.and_then(Value::as_array) {
            Some(items) if is_min => items.len() >= limit,
            Some(items) => items.len() <= limit,
            None => true,
        }
    })
    .with_message(message))
}

fn unique(expectation: ArrayExpectation) -> Result<Rule> {
    let values = expect_values("unique", expectation)?;
    expect_len("unique", &values, 0)?;
    Ok(Rule::predicate("unique", RuleCategory::ArrayElement, codes::NOT_UNIQUE, |input| {
        match input.value.and_then(Value::as_array) {
            Some(items) => {
                let mut seen = HashSet::with_capacity(items.len());
                items.iter().all(|item| seen.insert(item.to_string()))
            }
            None => true,
        }
    })
    .with_message("Items must be unique"))
}

fn includes(expectation: ArrayExpectation) -> Result<Rule> {
    let expected = expect_values("includes", expectation)?;
    if expected.is_empty() {
        return Err(SchemaError::invalid_args("includes", "at least one expected item is required"));
    }
    let message = format!(
        "Must include: {}",
        expected.iter().map(Value::to_string).collect::<Vec<_>>().join(", ")
    );
    Ok(Rule::predicate("includes", RuleCategory::ArrayElement, codes::MISSING_ITEM, move |input| {
        match input.value.and_then(Value::as_array) {
            Some(items) => expected.iter().all(|e| items.contains(e)),
            None => true,
        }
    })
    .with_message(message))
}

fn element_predicate(name: &'static str, expectation: ArrayExpectation) -> Result<Rule> {
    let predicate = match expectation {
        ArrayExpectation::Element(predicate) => predicate,
        ArrayExpectation::Values(_) => {
            return Err(SchemaError::invalid_args(name, "expected an element predicate"));
        }
    };
    let every = name == "every";
    Ok(Rule::predicate(name, RuleCategory::ArrayElement, codes::INVALID_ITEMS, move |input| {
        match input.value.and_then(Value::as_array) {
            Some(items) if every => items.iter().all(|item| predicate(item)),
            Some(items) => items.iter().any(|item| predicate(item)),
            None => true,
        }
    })
    .with_message(if every {
        "Every item must satisfy the condition"
    } else {
        "At least one item must satisfy the condition"
    }))
}

// =============================================================================
// Context
// =============================================================================

fn context(spec: ContextRuleSpec) -> Result<Rule> {
    let missing_is_valid = !spec.required || spec.fallback_to_valid;
    let check = spec.check.clone();
    Ok(Rule::outcome("context", RuleCategory::Context, codes::CONTEXT_MISMATCH, move |input: &RuleInput<'_>| {
        match input.context {
            None if missing_is_valid => RuleOutcome::Valid,
            None => RuleOutcome::InvalidAs(codes::MISSING_CONTEXT),
            Some(ctx) if check(input.value, ctx, input.record) => RuleOutcome::Valid,
            Some(_) => RuleOutcome::Invalid,
        }
    })
    .with_message_fn(|input| {
        if input.context.is_none() {
            "Validation context is missing".to_string()
        } else {
            "Context validation failed".to_string()
        }
    })
    .skip_for_undefined(false))
}

// =============================================================================
// Composable
// =============================================================================

fn compose_range(name: &str, calls: &[Vec<Value>]) -> Result<Vec<Rule>> {
    let by_length = name == "length_range";
    calls
        .iter()
        .map(|args| {
            expect_len(name, args, 2)?;
            let low = arg_f64(name, args, 0)?;
            let high = arg_f64(name, args, 1)?;
            if low > high {
                return Err(SchemaError::invalid_args(name, format!("empty range {}..={}", low, high)));
            }
            Ok(Rule::predicate(name.to_string(), RuleCategory::Composable, codes::OUT_OF_RANGE, move |input| {
                let measured = if by_length {
                    input.value.and_then(value_len).map(|n| n as f64)
                } else {
                    input.value.and_then(Value::as_f64)
                };
                measured.map_or(true, |n| n >= low && n <= high)
            })
            .with_message(format!("Must be between {} and {}", low, high)))
        })
        .collect()
}

// =============================================================================
// Transforms
// =============================================================================

fn no_args(name: &str, args: TransformArgs) -> Result<()> {
    match args {
        TransformArgs::Values(values) if values.is_empty() => Ok(()),
        TransformArgs::Values(_) => Err(SchemaError::invalid_args(name, "takes no arguments")),
        TransformArgs::Function(_) => Err(SchemaError::invalid_args(name, "does not accept a function")),
    }
}

fn string_transform(name: &'static str, args: TransformArgs, f: fn(&str) -> String) -> Result<Transform> {
    no_args(name, args)?;
    Ok(Transform::new(name, move |value| match value {
        Value::String(s) => Value::String(f(&s)),
        other => other,
    }))
}

fn to_number(args: TransformArgs) -> Result<Transform> {
    no_args("to_number", args)?;
    Ok(Transform::new("to_number", |value| {
        let parsed = value.as_str().map(str::trim).and_then(|s| {
            s.parse::<i64>().map(Value::from).ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
            })
        });
        parsed.unwrap_or(value)
    }))
}

fn custom_transform(args: TransformArgs) -> Result<Transform> {
    match args {
        TransformArgs::Function(f) => Ok(Transform::from_fn("transform", f)),
        TransformArgs::Values(_) => Err(SchemaError::invalid_args("transform", "expected a function")),
    }
}
