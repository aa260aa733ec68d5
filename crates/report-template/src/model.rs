//! JSON model binding and path resolution

use crate::{ReportError, Result};
use serde_json::Value;
use std::borrow::Cow;

/// Parsed, read-only data model for one render
#[derive(Debug, Clone, PartialEq)]
pub struct BoundModel {
    root: Value,
}

impl BoundModel {
    /// Parse a JSON model
    ///
    /// An empty (or whitespace-only) string binds to an empty object.
    pub fn bind(json: &str) -> Result<Self> {
        if json.trim().is_empty() {
            return Ok(Self::from_value(Value::Object(Default::default())));
        }

        let root = serde_json::from_str(json).map_err(|e| ReportError::ModelParse {
            message: e.to_string(),
            line: e.line(),
            column: e.column(),
        })?;
        Ok(Self { root })
    }

    /// Wrap an already parsed value
    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// The model root
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Resolve a path against the model root
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        resolve_path(path, &self.root)
    }

    /// A fresh scope stack rooted at the model
    pub fn scope(&self) -> Scope<'_> {
        Scope::new(&self.root)
    }
}

/// Stack of binding frames used while expanding nested blocks
///
/// The root model is the outermost frame; each repeat iteration pushes its
/// element. Lookups try the innermost frame first and fall back outward.
#[derive(Debug, Clone)]
pub struct Scope<'a> {
    frames: Vec<&'a Value>,
}

impl<'a> Scope<'a> {
    /// Create a scope with a single root frame
    pub fn new(root: &'a Value) -> Self {
        Self { frames: vec![root] }
    }

    /// Enter a nested frame
    pub fn push(&mut self, value: &'a Value) {
        self.frames.push(value);
    }

    /// Leave the innermost frame (the root frame is never popped)
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Number of frames, including the root
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Resolve a path against the frames
    ///
    /// - `.` is the innermost frame itself
    /// - `$.a.b` always starts at the root
    /// - otherwise the first frame holding the leading segment wins
    pub fn resolve(&self, path: &str) -> Option<&'a Value> {
        let path = path.trim();
        let innermost = *self.frames.last()?;

        if path.is_empty() || path == "." {
            return Some(innermost);
        }
        if path == "$" || path.starts_with("$.") {
            return resolve_path(path, self.frames[0]);
        }

        let head = segments(path).next()?;
        self.frames
            .iter()
            .rev()
            .copied()
            .find(|frame| step(frame, &head).is_some())
            .and_then(|frame| resolve_path(path, frame))
    }
}

/// A single step of a path
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'p> {
    Key(&'p str),
    Index(usize),
}

/// Split `a.b[2].c` / `a.b.2.c` into steps
fn segments(path: &str) -> impl Iterator<Item = Segment<'_>> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .flat_map(|part| {
            let mut steps = Vec::new();
            let (key, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            if !key.is_empty() {
                steps.push(Segment::Key(key));
            }
            while let Some(inner) = rest.strip_prefix('[') {
                let Some(end) = inner.find(']') else {
                    break;
                };
                match inner[..end].trim().parse() {
                    Ok(index) => steps.push(Segment::Index(index)),
                    Err(_) => steps.push(Segment::Key(inner[..end].trim())),
                }
                rest = &inner[end + 1..];
            }
            steps
        })
}

fn step<'a>(value: &'a Value, segment: &Segment<'_>) -> Option<&'a Value> {
    match (segment, value) {
        (Segment::Index(index), Value::Array(items)) => items.get(*index),
        (Segment::Index(index), Value::Object(map)) => map.get(&index.to_string()),
        (Segment::Key(key), Value::Object(map)) => map.get(*key),
        (Segment::Key(key), Value::Array(items)) => {
            key.parse::<usize>().ok().and_then(|index| items.get(index))
        }
        _ => None,
    }
}

/// Resolve a path expression against data
///
/// Supports paths like:
/// - `field` or `$.field` - Root field
/// - `object.field` - Nested field
/// - `array[0]` or `array.0` - Array index
/// - `array[0].field` - Array element field
pub fn resolve_path<'a>(path: &str, data: &'a Value) -> Option<&'a Value> {
    let path = path.trim();
    let path = match path.strip_prefix('$') {
        Some(rest) => rest,
        None => path,
    };

    let mut current = data;
    for segment in segments(path) {
        current = step(current, &segment)?;
    }
    Some(current)
}

/// Text written for a field value; `null` renders as nothing and
/// containers as their compact JSON
pub fn field_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s),
        Value::Null => Cow::Borrowed(""),
        Value::Bool(true) => Cow::Borrowed("true"),
        Value::Bool(false) => Cow::Borrowed("false"),
        other => Cow::Owned(other.to_string()),
    }
}

/// Whether a `{{?path}}` section renders for the resolved value
///
/// Missing values, `null`, `false`, zero and empty strings, lists or objects
/// hide the section; an inverted section renders exactly when this is false.
pub fn section_shown(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(fields)) => !fields.is_empty(),
        Some(Value::Bool(true)) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_bind_empty_string() {
        let model = BoundModel::bind("").unwrap();
        assert_eq!(model.root(), &json!({}));

        let model = BoundModel::bind("   \n").unwrap();
        assert_eq!(model.root(), &json!({}));
    }

    #[test]
    fn test_bind_malformed_reports_position() {
        let err = BoundModel::bind("{\n  \"a\": }").unwrap_err();
        match err {
            ReportError::ModelParse { line, column, .. } => {
                assert_eq!(line, 2);
                assert!(column > 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_resolve_simple_and_nested() {
        let data = json!({ "customer": { "name": "Jane", "tags": ["a", "b"] } });
        assert_eq!(resolve_path("customer.name", &data), Some(&json!("Jane")));
        assert_eq!(resolve_path("$.customer.name", &data), Some(&json!("Jane")));
        assert_eq!(resolve_path("customer.tags[1]", &data), Some(&json!("b")));
        assert_eq!(resolve_path("customer.tags.0", &data), Some(&json!("a")));
        assert_eq!(resolve_path("customer.missing", &data), None);
        assert_eq!(resolve_path("customer.tags[7]", &data), None);
    }

    #[test]
    fn test_resolve_nested_indices() {
        let data = json!({ "grid": [[1, 2], [3, 4]] });
        assert_eq!(resolve_path("grid[1][0]", &data), Some(&json!(3)));
    }

    #[test]
    fn test_scope_falls_back_to_outer_frames() {
        let data = json!({
            "title": "Report",
            "items": [{ "name": "first" }, { "name": "second", "title": "Own" }]
        });
        let mut scope = Scope::new(&data);
        let items = scope.resolve("items").unwrap().as_array().unwrap();

        scope.push(&items[0]);
        assert_eq!(scope.resolve("name"), Some(&json!("first")));
        assert_eq!(scope.resolve("title"), Some(&json!("Report")));
        assert_eq!(scope.resolve("."), Some(&items[0]));
        scope.pop();

        scope.push(&items[1]);
        assert_eq!(scope.resolve("title"), Some(&json!("Own")));
        assert_eq!(scope.resolve("$.title"), Some(&json!("Report")));
        scope.pop();

        assert_eq!(scope.depth(), 1);
        scope.pop();
        assert_eq!(scope.depth(), 1);
    }

    #[test]
    fn test_field_text() {
        let invoice = json!({
            "customer": "Acme & Sons",
            "total": 1250.75,
            "lines": 3,
            "paid": false,
            "note": null,
            "tags": ["rush", "export"]
        });
        let text = |path: &str| field_text(resolve_path(path, &invoice).unwrap()).into_owned();
        assert_eq!(text("customer"), "Acme & Sons");
        assert_eq!(text("total"), "1250.75");
        assert_eq!(text("lines"), "3");
        assert_eq!(text("paid"), "false");
        assert_eq!(text("note"), "");
        assert_eq!(text("tags"), r#"["rush","export"]"#);
        assert!(matches!(field_text(&invoice["customer"]), Cow::Borrowed(_)));
    }

    #[test]
    fn test_section_shown() {
        let report = json!({
            "discounts": [],
            "lines": [{ "sku": "A-1" }],
            "approved": true,
            "rejected": false,
            "balance": 0,
            "credit": 12,
            "remarks": "",
            "footer": "Thanks",
            "address": {},
            "contact": { "email": "a@b.c" },
            "fax": null
        });
        let shown = |path: &str| section_shown(resolve_path(path, &report));
        assert!(!shown("discounts"));
        assert!(shown("lines"));
        assert!(shown("approved"));
        assert!(!shown("rejected"));
        assert!(!shown("balance"));
        assert!(shown("credit"));
        assert!(!shown("remarks"));
        assert!(shown("footer"));
        assert!(!shown("address"));
        assert!(shown("contact"));
        assert!(!shown("fax"));
        assert!(!shown("missing.field"));
    }
}
