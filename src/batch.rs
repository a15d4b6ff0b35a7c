//! Array batching
//!
//! Definitions with wildcard paths are grouped by the array they iterate, so
//! each array is walked once no matter how many of its element fields are
//! declared. Nested wildcards form a hierarchy: `orders[*].items[*].sku`
//! yields an `orders` batch whose element level owns an `orders[*].items`
//! child batch, whose element level owns `sku`.
//!
//! ## Construction
//!
//! 1. Every wildcard position of a definition names an array path (the
//!    segments before that wildcard).
//! 2. Array paths are ordered by depth (wildcards in the path, plus one).
//! 3. Each array's parent is the array of the previous wildcard.
//! 4. A definition belongs to the array of its last wildcard; the rest of its
//!    path is relative to the element.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::compile::{CallContext, CompileOptions, Mode};
use crate::error::Result;
use crate::field::FieldDefinition;
use crate::level::{FieldEntry, FieldSet, LevelOrder, LevelOutcome};
use crate::path::{join_index, FieldPath};
use crate::recursive::RecursionState;

/// One array walked in a single pass
#[derive(Debug)]
pub struct ArrayBatchDescriptor {
    array_path: FieldPath,
    relative: FieldPath,
    depth: usize,
    parent: Option<FieldPath>,
    element: FieldSet,
}

impl ArrayBatchDescriptor {
    /// Path pattern of the array, e.g. `orders[*].items`
    pub fn array_path(&self) -> &FieldPath {
        &self.array_path
    }

    /// Number of wildcards needed to reach an element (1 for a root array)
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn parent_path(&self) -> Option<&FieldPath> {
        self.parent.as_ref()
    }

    /// Definitions validated directly on each element
    pub fn direct_fields(&self) -> Vec<&FieldPath> {
        self.element
            .fields()
            .iter()
            .map(|entry| entry.definition().path())
            .collect()
    }

    pub fn children(&self) -> &[ArrayBatchDescriptor] {
        self.element.arrays()
    }

    /// Every definition covered by this batch and its descendants
    pub fn covered_paths(&self) -> Vec<&FieldPath> {
        let mut paths = self.direct_fields();
        for child in self.children() {
            paths.extend(child.covered_paths());
        }
        paths
    }

    pub(crate) fn relative(&self) -> &FieldPath {
        &self.relative
    }

    pub(crate) fn element_level(&self) -> &FieldSet {
        &self.element
    }

    /// Walk the array inside `container`; `None` when it holds no array there
    pub(crate) fn process(
        &self,
        container: &Value,
        prefix: &str,
        call: &CallContext<'_>,
        state: &mut RecursionState,
    ) -> Option<LevelOutcome> {
        let items = self.relative.get(container)?.as_array()?;
        let array_path = self.relative.under(prefix);
        Some(self.process_items(items, &array_path, call, state))
    }

    fn process_items(
        &self,
        items: &[Value],
        array_path: &str,
        call: &CallContext<'_>,
        state: &mut RecursionState,
    ) -> LevelOutcome {
        tracing::trace!(
            array = %self.array_path,
            path = %array_path,
            len = items.len(),
            "processing array batch"
        );
        let mut errors = Vec::new();
        let mut rewritten = match call.mode {
            Mode::Parse => Some(Vec::with_capacity(items.len())),
            Mode::Validate => None,
        };

        for (index, item) in items.iter().enumerate() {
            let outcome = self.element.run(item, &join_index(array_path, index), call, state);
            errors.extend(outcome.errors);
            if call.abort_early && !errors.is_empty() {
                return LevelOutcome { errors, value: None };
            }
            if let Some(out) = rewritten.as_mut() {
                out.push(outcome.value.unwrap_or_else(|| item.clone()));
            }
        }

        LevelOutcome {
            errors,
            value: rewritten.map(Value::Array),
        }
    }
}

// =============================================================================
// Hierarchy construction
// =============================================================================

struct PendingArray {
    array_path: FieldPath,
    depth: usize,
    parent: Option<FieldPath>,
    fields: Vec<FieldEntry>,
}

/// Group wildcard definitions into root batches, in first-seen order within each depth
pub(crate) fn build_hierarchy(
    definitions: &[Arc<FieldDefinition>],
    options: &CompileOptions,
) -> Result<Vec<ArrayBatchDescriptor>> {
    let mut order: Vec<String> = Vec::new();
    let mut pending: HashMap<String, PendingArray> = HashMap::new();

    for definition in definitions {
        let path = definition.path();
        let positions = path.wildcard_positions();
        let Some(&last) = positions.last() else {
            continue;
        };

        for (n, &position) in positions.iter().enumerate() {
            let array_path = path.prefix(position);
            let key = array_path.to_string();
            if !pending.contains_key(&key) {
                let parent = n.checked_sub(1).map(|previous| path.prefix(positions[previous]));
                order.push(key.clone());
                pending.insert(
                    key,
                    PendingArray {
                        array_path,
                        depth: n + 1,
                        parent,
                        fields: Vec::new(),
                    },
                );
            }
        }

        let owner = path.prefix(last).to_string();
        let entry = FieldEntry::new(definition.clone(), path.suffix(last + 1), options)?;
        if let Some(array) = pending.get_mut(&owner) {
            array.fields.push(entry);
        }
    }

    // Stable sort keeps first-seen order among arrays of equal depth
    order.sort_by_key(|key| pending.get(key).map_or(0, |array| array.depth));

    let mut children: HashMap<String, Vec<String>> = HashMap::new();
    let mut roots = Vec::new();
    for key in &order {
        match pending.get(key).and_then(|array| array.parent.as_ref()) {
            Some(parent) => children.entry(parent.to_string()).or_default().push(key.clone()),
            None => roots.push(key.clone()),
        }
    }

    let descriptors: Vec<ArrayBatchDescriptor> = roots
        .iter()
        .filter_map(|key| assemble(key, &mut pending, &children))
        .collect();
    tracing::debug!(
        arrays = order.len(),
        roots = descriptors.len(),
        "built array batch hierarchy"
    );
    Ok(descriptors)
}

fn assemble(
    key: &str,
    pending: &mut HashMap<String, PendingArray>,
    children: &HashMap<String, Vec<String>>,
) -> Option<ArrayBatchDescriptor> {
    let array = pending.remove(key)?;
    let nested: Vec<ArrayBatchDescriptor> = children
        .get(key)
        .map(|keys| keys.iter().filter_map(|child| assemble(child, pending, children)).collect())
        .unwrap_or_default();

    // Relative to the parent element, skipping the parent's wildcard
    let relative = match &array.parent {
        Some(parent) => array.array_path.suffix(parent.segments().len() + 1),
        None => array.array_path.clone(),
    };

    Some(ArrayBatchDescriptor {
        array_path: array.array_path,
        relative,
        depth: array.depth,
        parent: array.parent,
        element: FieldSet::new(array.fields, nested, LevelOrder::FieldsFirst),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldKind;
    use crate::recursive::DEFAULT_MAX_DEPTH;
    use serde_json::json;

    fn defs(paths: &[&str]) -> Vec<Arc<FieldDefinition>> {
        paths
            .iter()
            .map(|p| Arc::new(FieldDefinition::new(p, FieldKind::Any).unwrap()))
            .collect()
    }

    fn strings(paths: Vec<&FieldPath>) -> Vec<String> {
        paths.into_iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_siblings_share_one_batch() {
        let batches = build_hierarchy(
            &defs(&["items[*].sku", "items[*].qty", "name"]),
            &CompileOptions::default(),
        )
        .unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].array_path().to_string(), "items");
        assert_eq!(batches[0].depth(), 1);
        assert_eq!(
            strings(batches[0].direct_fields()),
            vec!["items[*].sku", "items[*].qty"]
        );
    }

    #[test]
    fn test_nested_hierarchy() {
        let batches = build_hierarchy(
            &defs(&["orders[*].items[*].sku", "orders[*].id", "orders[*].items[*].tags[*]"]),
            &CompileOptions::default(),
        )
        .unwrap();
        assert_eq!(batches.len(), 1);
        let orders = &batches[0];
        assert_eq!(strings(orders.direct_fields()), vec!["orders[*].id"]);

        let items = &orders.children()[0];
        assert_eq!(items.array_path().to_string(), "orders[*].items");
        assert_eq!(items.parent_path().map(ToString::to_string), Some("orders".to_string()));
        assert_eq!(items.depth(), 2);
        assert_eq!(items.relative().to_string(), "items");

        let tags = &items.children()[0];
        assert_eq!(tags.depth(), 3);
        assert_eq!(strings(tags.direct_fields()), vec!["orders[*].items[*].tags[*]"]);

        assert_eq!(
            strings(orders.covered_paths()),
            vec!["orders[*].id", "orders[*].items[*].sku", "orders[*].items[*].tags[*]"]
        );
    }

    #[test]
    fn test_matrix_inner_array_is_the_element() {
        let batches = build_hierarchy(&defs(&["matrix[*][*]"]), &CompileOptions::default()).unwrap();
        let inner = &batches[0].children()[0];
        assert!(inner.relative().is_root());
        assert_eq!(inner.array_path().to_string(), "matrix[*]");
    }

    #[test]
    fn test_process_reports_concrete_paths() {
        let batches = build_hierarchy(
            &[Arc::new(FieldDefinition::new("orders[*].items[*].sku", FieldKind::String).unwrap())],
            &CompileOptions::default(),
        )
        .unwrap();
        let record = json!({"orders": [{"items": [{"sku": "a"}, {"sku": 7}]}]});
        let call = CallContext {
            record: &record,
            context: None,
            abort_early: false,
            abort_early_on_each_field: true,
            mode: Mode::Validate,
        };
        let mut state = RecursionState::new(DEFAULT_MAX_DEPTH);
        let outcome = batches[0].process(&record, "", &call, &mut state).unwrap();
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].path, "orders[0].items[1].sku");
    }

    #[test]
    fn test_empty_and_missing_arrays() {
        let batches = build_hierarchy(
            &[Arc::new(FieldDefinition::new("items[*].sku", FieldKind::String).unwrap())],
            &CompileOptions::default(),
        )
        .unwrap();
        let call_for = |record: &Value| -> usize {
            let call = CallContext {
                record,
                context: None,
                abort_early: false,
                abort_early_on_each_field: true,
                mode: Mode::Validate,
            };
            let mut state = RecursionState::new(DEFAULT_MAX_DEPTH);
            batches[0]
                .process(record, "", &call, &mut state)
                .map_or(0, |outcome| outcome.errors.len())
        };
        assert_eq!(call_for(&json!({"items": []})), 0);
        assert_eq!(call_for(&json!({})), 0);
        assert_eq!(call_for(&json!({"items": [{}]})), 1);
    }
}
