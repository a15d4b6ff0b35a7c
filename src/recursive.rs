//! Recursive validation
//!
//! A field whose chain carries a `recursive` rule re-applies the validators of
//! its own level to nested nodes found inside its value:
//!
//! - `self`: the field value is itself a node of the same shape
//! - `each-element`: every element of the array value is a node
//! - any other string: a path inside the value leading to a node, or to an
//!   array of nodes
//!
//! Descent is bounded by a depth limit (per field, or the engine default) and
//! guarded against revisiting a node already on the current descent. Nodes
//! past the limit are treated as valid.

use std::collections::HashSet;

use serde_json::Value;

use crate::compile::{CallContext, Mode};
use crate::error::Result;
use crate::level::{FieldSet, LevelOutcome};
use crate::path::{join_index, join_path, FieldPath};

/// Depth limit used when neither the field nor the configuration sets one
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Where nested nodes live relative to the field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecursiveTarget {
    SelfRef,
    EachElement,
    Field(FieldPath),
}

/// Recursive validation attached to a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecursiveSpec {
    pub target: RecursiveTarget,
    /// Overrides the engine-wide limit when set
    pub max_depth: Option<usize>,
}

impl RecursiveSpec {
    pub fn new(target: RecursiveTarget) -> Self {
        Self {
            target,
            max_depth: None,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// `self`, `each-element` (or `each_element`), or a field path
    pub fn parse_target(raw: &str) -> Result<RecursiveTarget> {
        Ok(match raw {
            "self" => RecursiveTarget::SelfRef,
            "each-element" | "each_element" => RecursiveTarget::EachElement,
            path => RecursiveTarget::Field(FieldPath::parse(path)?),
        })
    }

    pub fn depth_limit(&self, engine_default: usize) -> usize {
        self.max_depth.unwrap_or(engine_default)
    }
}

// =============================================================================
// Descent state
// =============================================================================

/// Depth counter and visiting set threaded through one validation call
///
/// The visiting set guards inputs that share a node by identity. An owned
/// `serde_json::Value` cannot hold a reference cycle, so on ordinary input
/// the depth limit is what bounds the descent.
#[derive(Debug)]
pub(crate) struct RecursionState {
    depth: usize,
    max_depth: usize,
    visiting: HashSet<usize>,
}

impl RecursionState {
    pub(crate) fn new(max_depth: usize) -> Self {
        Self {
            depth: 0,
            max_depth,
            visiting: HashSet::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    /// Mark a node as being visited; false when it already is
    fn enter(&mut self, node: &Value) -> bool {
        self.visiting.insert(node_id(node))
    }

    fn leave(&mut self, node: &Value) {
        self.visiting.remove(&node_id(node));
    }
}

fn node_id(node: &Value) -> usize {
    node as *const Value as usize
}

/// Apply `level` to the nodes `spec` finds inside `value`
///
/// `path` is the concrete path of the field holding `value`. In parse mode the
/// returned outcome carries `value` with every visited node rewritten.
pub(crate) fn descend(
    level: &FieldSet,
    spec: &RecursiveSpec,
    value: &Value,
    path: &str,
    call: &CallContext<'_>,
    state: &mut RecursionState,
) -> LevelOutcome {
    let limit = spec.depth_limit(state.max_depth);
    if state.depth >= limit {
        tracing::debug!(path = %path, depth = state.depth, limit, "recursion depth limit reached");
        return LevelOutcome::default();
    }

    match &spec.target {
        RecursiveTarget::SelfRef => visit(level, value, path, call, state),
        RecursiveTarget::EachElement => visit_all(level, value, path, call, state),
        RecursiveTarget::Field(inner) => {
            let Some(nested) = inner.get(value) else {
                return LevelOutcome::default();
            };
            let nested_path = join_path(path, &inner.to_string());
            let mut outcome = if nested.is_array() {
                visit_all(level, nested, &nested_path, call, state)
            } else {
                visit(level, nested, &nested_path, call, state)
            };
            outcome.value = outcome.value.map(|rewritten| {
                let mut copy = value.clone();
                if let Err(err) = inner.set(&mut copy, rewritten) {
                    tracing::warn!(path = %nested_path, error = %err, "could not write recursive output");
                }
                copy
            });
            outcome
        }
    }
}

fn visit_all(
    level: &FieldSet,
    value: &Value,
    path: &str,
    call: &CallContext<'_>,
    state: &mut RecursionState,
) -> LevelOutcome {
    let Some(items) = value.as_array() else {
        return LevelOutcome::default();
    };
    let mut errors = Vec::new();
    let mut rewritten = match call.mode {
        Mode::Parse => Some(Vec::with_capacity(items.len())),
        Mode::Validate => None,
    };
    for (index, item) in items.iter().enumerate() {
        let outcome = visit(level, item, &join_index(path, index), call, state);
        errors.extend(outcome.errors);
        if let Some(out) = rewritten.as_mut() {
            out.push(outcome.value.unwrap_or_else(|| item.clone()));
        }
        if call.abort_early && !errors.is_empty() {
            break;
        }
    }
    LevelOutcome {
        errors,
        value: rewritten.map(Value::Array),
    }
}

/// Run the level on one node, one level deeper
fn visit(
    level: &FieldSet,
    node: &Value,
    path: &str,
    call: &CallContext<'_>,
    state: &mut RecursionState,
) -> LevelOutcome {
    if !node.is_object() {
        return LevelOutcome::default();
    }
    if !state.enter(node) {
        tracing::debug!(path = %path, "node already on the current descent");
        return LevelOutcome::default();
    }
    tracing::trace!(path = %path, depth = state.depth + 1, "descending into nested node");
    state.depth += 1;
    let outcome = level.run(node, path, call, state);
    state.depth -= 1;
    state.leave(node);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_target() {
        assert_eq!(RecursiveSpec::parse_target("self").unwrap(), RecursiveTarget::SelfRef);
        assert_eq!(
            RecursiveSpec::parse_target("each-element").unwrap(),
            RecursiveTarget::EachElement
        );
        assert_eq!(
            RecursiveSpec::parse_target("each_element").unwrap(),
            RecursiveTarget::EachElement
        );
        assert_eq!(
            RecursiveSpec::parse_target("tree.children").unwrap(),
            RecursiveTarget::Field(FieldPath::parse("tree.children").unwrap())
        );
        assert!(RecursiveSpec::parse_target("").is_err());
    }

    #[test]
    fn test_depth_limit() {
        let spec = RecursiveSpec::new(RecursiveTarget::SelfRef);
        assert_eq!(spec.depth_limit(DEFAULT_MAX_DEPTH), 10);
        assert_eq!(spec.with_max_depth(2).depth_limit(DEFAULT_MAX_DEPTH), 2);
    }

    #[test]
    fn test_visiting_guard_rejects_reentry() {
        let node = json!({"a": 1});
        let other = json!({"a": 1});
        let mut state = RecursionState::new(DEFAULT_MAX_DEPTH);

        assert!(state.enter(&node));
        assert!(!state.enter(&node));
        assert!(state.enter(&other));
        state.leave(&node);
        assert!(state.enter(&node));
        assert_eq!(state.depth(), 0);
    }
}
