//! Field Path Resolution
//!
//! Parses field path strings into segment lists and resolves them against
//! `serde_json::Value` trees.
//!
//! ## Syntax
//!
//! ```text
//! name                    plain key
//! address.city            nested key
//! items[*].name           wildcard over every element of `items`
//! items.*.name            legacy dot-star wildcard (same as above)
//! matrix[*][*]            multi-dimensional wildcard
//! orders[2].id            concrete index
//! ```
//!
//! Wildcards are only expanded by the batch processor; [`FieldPath::get`] on a
//! wildcard path stops at the first wildcard and returns the array itself.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SchemaError};

/// One component of a field path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Object key
    Key(String),
    /// Concrete array index
    Index(usize),
    /// Every element of the array at this position
    Wildcard,
}

/// A parsed field path
///
/// A path with no segments is the root: it addresses the container itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    /// Parse a path string, rejecting empty or malformed paths
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(SchemaError::invalid_path(raw, "path is empty"));
        }

        let mut segments = Vec::new();
        for part in raw.split('.') {
            if part.is_empty() {
                return Err(SchemaError::invalid_path(raw, "empty segment"));
            }
            if part == "*" {
                if segments.is_empty() {
                    return Err(SchemaError::invalid_path(raw, "wildcard without an array field"));
                }
                segments.push(Segment::Wildcard);
                continue;
            }

            let (name, mut rest) = match part.find('[') {
                Some(i) => (&part[..i], &part[i..]),
                None => (part, ""),
            };

            if name.contains(']') || name.contains('*') {
                return Err(SchemaError::invalid_path(raw, format!("invalid key '{}'", name)));
            }
            if name.is_empty() {
                if segments.is_empty() {
                    return Err(SchemaError::invalid_path(raw, "bracket without a field name"));
                }
            } else {
                segments.push(Segment::Key(name.to_string()));
            }

            while !rest.is_empty() {
                let close = match (rest.starts_with('['), rest.find(']')) {
                    (true, Some(close)) => close,
                    _ => return Err(SchemaError::invalid_path(raw, "unterminated bracket")),
                };
                let content = &rest[1..close];
                let segment = if content == "*" {
                    Segment::Wildcard
                } else {
                    content
                        .parse::<usize>()
                        .map(Segment::Index)
                        .map_err(|_| SchemaError::invalid_path(raw, format!("invalid index '{}'", content)))?
                };
                segments.push(segment);
                rest = &rest[close + 1..];
            }
        }

        Ok(Self { segments })
    }

    /// The empty path, addressing the container itself
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn has_wildcard(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Wildcard))
    }

    /// Number of wildcard segments (array nesting depth)
    pub fn wildcard_count(&self) -> usize {
        self.segments.iter().filter(|s| matches!(s, Segment::Wildcard)).count()
    }

    /// Indices of the wildcard segments, in order
    pub fn wildcard_positions(&self) -> Vec<usize> {
        self.segments
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, Segment::Wildcard))
            .map(|(i, _)| i)
            .collect()
    }

    /// The first `end` segments
    pub fn prefix(&self, end: usize) -> FieldPath {
        Self::from_segments(self.segments[..end.min(self.segments.len())].to_vec())
    }

    /// Segments from `start` onwards
    pub fn suffix(&self, start: usize) -> FieldPath {
        Self::from_segments(self.segments[start.min(self.segments.len())..].to_vec())
    }

    /// Path relative to `base`, if `base` is a leading part of this path
    pub fn strip_prefix(&self, base: &FieldPath) -> Option<FieldPath> {
        self.segments
            .starts_with(&base.segments)
            .then(|| self.suffix(base.segments.len()))
    }

    /// Last segment is an object key
    pub fn last_key(&self) -> Option<&str> {
        match self.segments.last() {
            Some(Segment::Key(k)) => Some(k),
            _ => None,
        }
    }

    /// Resolve the value at this path (the accessor)
    ///
    /// Returns `None` when any intermediate container is missing or has the
    /// wrong shape. Stops at the first wildcard.
    pub fn get<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        let mut current = root;
        for segment in &self.segments {
            current = match segment {
                Segment::Key(key) => current.as_object()?.get(key)?,
                Segment::Index(index) => current.as_array()?.get(*index)?,
                Segment::Wildcard => return Some(current),
            };
        }
        Some(current)
    }

    /// Whether the final key is present (the existence check)
    ///
    /// A present `null` counts as existing. For wildcard paths this checks the
    /// array reached by [`FieldPath::get`].
    pub fn exists(&self, root: &Value) -> bool {
        let end = self
            .segments
            .iter()
            .position(|s| matches!(s, Segment::Wildcard))
            .unwrap_or(self.segments.len());

        let Some((last, parents)) = self.segments[..end].split_last() else {
            return true;
        };
        let Some(parent) = Self::from_segments(parents.to_vec()).get(root) else {
            return false;
        };
        match last {
            Segment::Key(key) => parent.as_object().is_some_and(|m| m.contains_key(key)),
            Segment::Index(index) => parent.as_array().is_some_and(|a| *index < a.len()),
            Segment::Wildcard => false,
        }
    }

    /// Whether a value can be written here without replacing present data
    ///
    /// True when nothing is present at the path and every intermediate on
    /// the way is either missing or a container of the matching shape.
    pub fn is_vacant(&self, root: &Value) -> bool {
        if self.has_wildcard() {
            return false;
        }
        let mut current = Some(root);
        for segment in &self.segments {
            let Some(node) = current else {
                return true;
            };
            current = match (segment, node) {
                (Segment::Key(key), Value::Object(map)) => map.get(key),
                (Segment::Index(index), Value::Array(items)) => items.get(*index),
                _ => return false,
            };
        }
        current.is_none()
    }

    /// Fail if this path cannot be written through
    pub fn ensure_settable(&self) -> Result<()> {
        if self.has_wildcard() {
            return Err(SchemaError::WildcardSetter(self.to_string()));
        }
        Ok(())
    }

    /// Write `value` at this path (the setter)
    ///
    /// Missing or non-container intermediates are replaced with empty objects
    /// (or arrays, for index segments). Wildcard paths are rejected.
    pub fn set(&self, root: &mut Value, value: Value) -> Result<()> {
        self.ensure_settable()?;

        let mut current = root;
        for segment in &self.segments {
            current = match segment {
                Segment::Key(key) => {
                    if !current.is_object() {
                        *current = Value::Object(Map::new());
                    }
                    &mut current[key.as_str()]
                }
                Segment::Index(index) => {
                    if !current.is_array() {
                        *current = Value::Array(Vec::new());
                    }
                    if let Value::Array(items) = current {
                        if items.len() <= *index {
                            items.resize(index + 1, Value::Null);
                        }
                    }
                    &mut current[*index]
                }
                Segment::Wildcard => return Err(SchemaError::WildcardSetter(self.to_string())),
            };
        }
        *current = value;
        Ok(())
    }

    /// Append another path to this one
    pub fn join(&self, other: &FieldPath) -> FieldPath {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self::from_segments(segments)
    }

    /// Render this (concrete) path underneath an already-resolved prefix
    pub fn under(&self, prefix: &str) -> String {
        join_path(prefix, &self.to_string())
    }
}

/// Join a resolved prefix and a rendered relative path
pub fn join_path(prefix: &str, relative: &str) -> String {
    if prefix.is_empty() {
        relative.to_string()
    } else if relative.is_empty() {
        prefix.to_string()
    } else if relative.starts_with('[') {
        format!("{}{}", prefix, relative)
    } else {
        format!("{}.{}", prefix, relative)
    }
}

/// Render an element path, e.g. `orders[2]`
pub fn join_index(prefix: &str, index: usize) -> String {
    format!("{}[{}]", prefix, index)
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{}", key)?,
                Segment::Key(key) => write!(f, ".{}", key)?,
                Segment::Index(index) => write!(f, "[{}]", index)?,
                Segment::Wildcard => write!(f, "[*]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = SchemaError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_forms() {
        let path = FieldPath::parse("address.city").unwrap();
        assert_eq!(
            path.segments(),
            &[Segment::Key("address".into()), Segment::Key("city".into())]
        );

        let matrix = FieldPath::parse("matrix[*][*]").unwrap();
        assert_eq!(matrix.wildcard_count(), 2);
        assert_eq!(matrix.to_string(), "matrix[*][*]");

        let indexed = FieldPath::parse("orders[2].id").unwrap();
        assert_eq!(indexed.segments()[1], Segment::Index(2));
    }

    #[test]
    fn test_legacy_wildcard_matches_bracket_form() {
        let legacy = FieldPath::parse("orders.*.items.*.sku").unwrap();
        let bracket = FieldPath::parse("orders[*].items[*].sku").unwrap();
        assert_eq!(legacy, bracket);
        assert_eq!(legacy.to_string(), "orders[*].items[*].sku");
    }

    #[test]
    fn test_rejects_malformed_paths() {
        for raw in ["", "   ", "a..b", ".a", "a.", "items[", "items[x]", "[*].a", "*", "a]b"] {
            assert!(FieldPath::parse(raw).is_err(), "expected '{}' to be rejected", raw);
        }
    }

    #[test]
    fn test_get_missing_never_panics() {
        let value = json!({"a": {"b": 1}, "s": "text"});
        assert_eq!(FieldPath::parse("a.b").unwrap().get(&value), Some(&json!(1)));
        assert_eq!(FieldPath::parse("a.c").unwrap().get(&value), None);
        assert_eq!(FieldPath::parse("x.y.z").unwrap().get(&value), None);
        assert_eq!(FieldPath::parse("s.inner").unwrap().get(&value), None);
        assert_eq!(FieldPath::parse("a[0]").unwrap().get(&value), None);
    }

    #[test]
    fn test_get_wildcard_reaches_array() {
        let value = json!({"items": [{"name": "a"}]});
        let path = FieldPath::parse("items[*].name").unwrap();
        assert_eq!(path.get(&value), Some(&json!([{"name": "a"}])));
    }

    #[test]
    fn test_exists_distinguishes_null_from_absent() {
        let value = json!({"a": null, "list": [1]});
        assert!(FieldPath::parse("a").unwrap().exists(&value));
        assert!(!FieldPath::parse("b").unwrap().exists(&value));
        assert!(!FieldPath::parse("a.b").unwrap().exists(&value));
        assert!(FieldPath::parse("list[0]").unwrap().exists(&value));
        assert!(!FieldPath::parse("list[1]").unwrap().exists(&value));
        assert!(FieldPath::root().exists(&value));
    }

    #[test]
    fn test_is_vacant_never_crosses_present_values() {
        let value = json!({"a": null, "n": 5, "obj": {}, "list": [1]});
        assert!(FieldPath::parse("b").unwrap().is_vacant(&value));
        assert!(FieldPath::parse("missing.deep").unwrap().is_vacant(&value));
        assert!(FieldPath::parse("obj.x").unwrap().is_vacant(&value));
        assert!(FieldPath::parse("list[3]").unwrap().is_vacant(&value));

        assert!(!FieldPath::parse("a").unwrap().is_vacant(&value));
        assert!(!FieldPath::parse("a.b").unwrap().is_vacant(&value));
        assert!(!FieldPath::parse("n.x").unwrap().is_vacant(&value));
        assert!(!FieldPath::parse("list[0]").unwrap().is_vacant(&value));
        assert!(!FieldPath::parse("x").unwrap().is_vacant(&json!("hello")));
        assert!(!FieldPath::parse("list[*]").unwrap().is_vacant(&value));
    }

    #[test]
    fn test_set_creates_intermediates() {
        let mut value = json!({});
        FieldPath::parse("a.b.c").unwrap().set(&mut value, json!(5)).unwrap();
        assert_eq!(value, json!({"a": {"b": {"c": 5}}}));

        FieldPath::parse("a.list[2]").unwrap().set(&mut value, json!("x")).unwrap();
        assert_eq!(value["a"]["list"], json!([null, null, "x"]));

        let mut scalar = json!({"a": 3});
        FieldPath::parse("a.b").unwrap().set(&mut scalar, json!(true)).unwrap();
        assert_eq!(scalar, json!({"a": {"b": true}}));
    }

    #[test]
    fn test_set_rejects_wildcards() {
        let mut value = json!({"items": []});
        let err = FieldPath::parse("items[*].name").unwrap().set(&mut value, json!(1));
        assert!(matches!(err, Err(SchemaError::WildcardSetter(_))));
    }

    #[test]
    fn test_join_helpers() {
        assert_eq!(join_path("", "name"), "name");
        assert_eq!(join_path("orders[0]", "sku"), "orders[0].sku");
        assert_eq!(join_path("matrix[1]", "[2]"), "matrix[1][2]");
        assert_eq!(join_path("tags[3]", ""), "tags[3]");
        assert_eq!(join_index("orders", 2), "orders[2]");
        assert_eq!(FieldPath::parse("items").unwrap().under("orders[2]"), "orders[2].items");
    }

    #[test]
    fn test_serde_as_string() {
        let path: FieldPath = serde_json::from_value(json!("items.*.name")).unwrap();
        assert_eq!(serde_json::to_value(&path).unwrap(), json!("items[*].name"));
        assert!(serde_json::from_value::<FieldPath>(json!("")).is_err());
    }
}
