//! Queries over one `(namespace, kind)` with filters and cursor pagination.
//!
//! Results are ordered by key name. A cursor is the URL-safe base64 of the
//! last key name returned; resuming yields names strictly after it.

use crate::error::{JournalError, JournalResult};
use crate::key::Entity;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Map, Value};

/// Largest accepted page size.
pub const MAX_LIMIT: usize = 10_000;

/// Maximum cursor length accepted from callers.
const MAX_CURSOR_LEN: usize = 4096;

/// Comparison applied by a filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    /// Field equals the value.
    Eq,
    /// Array field holds the value (scalar fields compare equal).
    Contains,
    /// String field starts with the value.
    Prefix,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    /// Evaluate against an entity payload.
    pub fn matches(&self, data: &Value) -> bool {
        let Some(field) = data.get(&self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => field == &self.value,
            FilterOp::Contains => match field {
                Value::Array(items) => items.contains(&self.value),
                scalar => scalar == &self.value,
            },
            FilterOp::Prefix => match (field, &self.value) {
                (Value::String(s), Value::String(prefix)) => s.starts_with(prefix.as_str()),
                _ => false,
            },
        }
    }
}

/// A query over entities of one kind in one namespace.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub namespace: String,
    pub kind: String,
    pub filters: Vec<Filter>,
    pub start: Option<String>,
    pub limit: Option<usize>,
    pub select: Option<Vec<String>>,
}

impl Query {
    pub fn new(namespace: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            kind: kind.into(),
            filters: Vec::new(),
            start: None,
            limit: None,
            select: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// Resume after the position encoded in `cursor`.
    pub fn start(mut self, cursor: impl Into<String>) -> Self {
        self.start = Some(cursor.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Return only these top-level payload fields.
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Check field names, limit and cursor. Returns the decoded start position.
    pub fn validate(&self) -> JournalResult<Option<String>> {
        let fields = self
            .filters
            .iter()
            .map(|f| &f.field)
            .chain(self.select.iter().flatten());
        for field in fields {
            validate_field(field)?;
        }
        if let Some(limit) = self.limit
            && (limit == 0 || limit > MAX_LIMIT)
        {
            return Err(JournalError::InvalidQuery(format!(
                "limit must be between 1 and {MAX_LIMIT}, got {limit}"
            )));
        }
        for filter in &self.filters {
            if filter.op == FilterOp::Prefix && !filter.value.is_string() {
                return Err(JournalError::InvalidQuery(format!(
                    "prefix filter on '{}' needs a string value",
                    filter.field
                )));
            }
        }
        self.start.as_deref().map(decode_cursor).transpose()
    }
}

/// Filter and select fields are plain top-level names.
fn validate_field(field: &str) -> JournalResult<()> {
    if !field.is_empty()
        && field.len() <= 64
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Ok(())
    } else {
        Err(JournalError::InvalidQuery(format!(
            "'{field}' is not a valid field name"
        )))
    }
}

pub fn encode_cursor(last_name: &str) -> String {
    URL_SAFE_NO_PAD.encode(last_name.as_bytes())
}

pub fn decode_cursor(cursor: &str) -> JournalResult<String> {
    if cursor.len() > MAX_CURSOR_LEN {
        return Err(JournalError::InvalidCursor(format!(
            "cursor too long: {} bytes (max: {MAX_CURSOR_LEN})",
            cursor.len()
        )));
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|e| JournalError::InvalidCursor(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| JournalError::InvalidCursor(e.to_string()))
}

/// Keep only the selected top-level fields of `data`.
pub fn project(data: Value, select: Option<&[String]>) -> Value {
    let Some(fields) = select else {
        return data;
    };
    match data {
        Value::Object(mut map) => {
            let mut out = Map::new();
            for field in fields {
                if let Some(v) = map.remove(field) {
                    out.insert(field.clone(), v);
                }
            }
            Value::Object(out)
        }
        other => other,
    }
}

/// One page of query results.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryPage {
    pub entities: Vec<Entity>,
    /// Set when more results follow; pass to [`Query::start`].
    pub end_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_ops() {
        let data = json!({"name": "d1", "path": "/a/b/", "gtags": ["x", "y"], "size": 3});

        let eq = Filter { field: "name".into(), op: FilterOp::Eq, value: json!("d1") };
        assert!(eq.matches(&data));

        let contains = Filter { field: "gtags".into(), op: FilterOp::Contains, value: json!("y") };
        assert!(contains.matches(&data));
        let missing = Filter { field: "gtags".into(), op: FilterOp::Contains, value: json!("z") };
        assert!(!missing.matches(&data));

        let prefix = Filter { field: "path".into(), op: FilterOp::Prefix, value: json!("/a/") };
        assert!(prefix.matches(&data));
        let prefix_num = Filter { field: "size".into(), op: FilterOp::Prefix, value: json!("3") };
        assert!(!prefix_num.matches(&data));

        let absent = Filter { field: "nope".into(), op: FilterOp::Eq, value: json!(null) };
        assert!(!absent.matches(&data));
    }

    #[test]
    fn cursor_roundtrip() {
        let cursor = encode_cursor("/a/b/c.seg");
        assert!(!cursor.contains('/'));
        assert_eq!(decode_cursor(&cursor).unwrap(), "/a/b/c.seg");
        assert!(decode_cursor("***").is_err());
    }

    #[test]
    fn validate_rejects_bad_queries() {
        let q = Query::new("ns", "k").filter("a.b", FilterOp::Eq, "x");
        assert!(matches!(q.validate(), Err(JournalError::InvalidQuery(_))));

        let q = Query::new("ns", "k").limit(0);
        assert!(q.validate().is_err());

        let q = Query::new("ns", "k").filter("path", FilterOp::Prefix, 3);
        assert!(q.validate().is_err());

        let q = Query::new("ns", "k").start("!!");
        assert!(matches!(q.validate(), Err(JournalError::InvalidCursor(_))));

        let q = Query::new("ns", "k").start(encode_cursor("x")).limit(5);
        assert_eq!(q.validate().unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn project_keeps_selected_fields() {
        let data = json!({"name": "d", "path": "/", "gtags": []});
        let fields = vec!["name".to_string(), "missing".to_string()];
        assert_eq!(project(data.clone(), Some(&fields)), json!({"name": "d"}));
        assert_eq!(project(data.clone(), None), data);
    }
}
