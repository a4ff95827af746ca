//! The canonical, protocol-agnostic issue and the tables that produce it.
//!
//! Both protocols deliver issues as nested JSON. Before an issue leaves a
//! bridge it is flattened with an explicit per-protocol field table: users
//! become usernames, other references become ids, and multi-valued references
//! become `{id, name}` lists. Everything else passes through untouched.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A canonical issue: field name to value.
///
/// Always contains `key` and `type`. Issues are rebuilt on every fetch and
/// are never modified locally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Issue(Map<String, Value>);

impl Issue {
    /// Wrap an already canonical field map.
    pub fn from_fields(mut fields: Map<String, Value>) -> Self {
        for required in ["key", "type"] {
            fields
                .entry(required)
                .or_insert_with(|| Value::String(String::new()));
        }
        Self(fields)
    }

    /// The issue key, e.g. `TP-1`.
    pub fn key(&self) -> &str {
        self.str("key").unwrap_or_default()
    }

    /// The raw value of a field.
    ///
    /// Falls back to a case-insensitive match of the field name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field).or_else(|| {
            self.0
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(field))
                .map(|(_, v)| v)
        })
    }

    /// A field as a string slice, if it is a string.
    pub fn str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// A field rendered for display; empty when absent or null.
    ///
    /// Lists of named references render as their names joined with `, `.
    pub fn text(&self, field: &str) -> String {
        self.get(field).map(display_value).unwrap_or_default()
    }

    /// The issue labels.
    pub fn labels(&self) -> Vec<String> {
        self.get("labels")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A multi-valued reference field (`components`, `fixVersions`, `affectsVersions`).
    pub fn refs(&self, field: &str) -> Vec<NamedRef> {
        self.get(field)
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A numeric field, e.g. `aggregatetimespent`.
    pub fn number(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }

    /// Whether the issue has a parent (is a subtask).
    pub fn has_parent(&self) -> bool {
        self.get("parent").map(|v| !v.is_null()).unwrap_or(false)
    }

    /// All fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key(), self.text("summary"))
    }
}

/// A `{id, name}` reference inside a multi-valued field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A comment on an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub body: String,
    pub created: String,
}

/// A work-log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worklog {
    pub author: String,
    pub comment: String,
    pub created: String,
    pub time_spent: String,
}

/// Which version set of an issue an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionKind {
    /// `fixVersions`.
    Fix,
    /// `affectsVersions` (`versions` on the REST protocol).
    Affects,
}

impl VersionKind {
    /// The canonical issue field holding this version set.
    pub fn canonical_field(self) -> &'static str {
        match self {
            VersionKind::Fix => "fixVersions",
            VersionKind::Affects => "affectsVersions",
        }
    }

    /// The field name the remote service expects on writes.
    pub fn remote_field(self) -> &'static str {
        match self {
            VersionKind::Fix => "fixVersions",
            VersionKind::Affects => "versions",
        }
    }
}

/// One change in a partial issue update.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// Replace the field value.
    Set(String, Value),
    /// Add a value to a multi-valued field.
    Add(String, Value),
    /// Remove a value from a multi-valued field.
    Remove(String, Value),
}

impl FieldUpdate {
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FieldUpdate::Set(field.into(), value.into())
    }

    pub fn add(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FieldUpdate::Add(field.into(), value.into())
    }

    pub fn remove(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FieldUpdate::Remove(field.into(), value.into())
    }

    pub fn field(&self) -> &str {
        match self {
            FieldUpdate::Set(f, _) | FieldUpdate::Add(f, _) | FieldUpdate::Remove(f, _) => f,
        }
    }
}

/// Everything needed to create an issue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewIssue {
    /// Project key.
    pub project: String,
    /// Issue type name; a subtask type name when `parent` is set.
    pub issue_type: String,
    pub summary: String,
    pub description: String,
    /// Priority name.
    pub priority: String,
    /// Key of the parent issue.
    pub parent: Option<String>,
    pub assignee: Option<String>,
    pub reporter: Option<String>,
    pub labels: Vec<String>,
    /// Components as `(name, id)` pairs.
    pub components: Vec<(String, String)>,
    /// Additional raw fields.
    pub extras: Map<String, Value>,
}

/// Field holding the epic name, mirrored from the summary for epics.
pub const EPIC_NAME_FIELD: &str = "customfield_11401";

/// How a nested field is reduced to its canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// A user object reduced to its username.
    User,
    /// A reference object reduced to its id.
    Id,
    /// A reference object reduced to its key (projects, parent issues).
    Key,
    /// A list of references reduced to `{id, name}` objects.
    RefList,
}

/// One row of a canonicalization table: remote field, canonical field, shape.
pub type FieldRule = (&'static str, &'static str, Shape);

/// Field table for issues of the REST protocol (`fields` object).
pub const REST_FIELDS: &[FieldRule] = &[
    ("assignee", "assignee", Shape::User),
    ("reporter", "reporter", Shape::User),
    ("creator", "creator", Shape::User),
    ("status", "status", Shape::Id),
    ("priority", "priority", Shape::Id),
    ("issuetype", "issuetype", Shape::Id),
    ("resolution", "resolution", Shape::Id),
    ("project", "project", Shape::Key),
    ("parent", "parent", Shape::Key),
    ("components", "components", Shape::RefList),
    ("fixVersions", "fixVersions", Shape::RefList),
    ("versions", "affectsVersions", Shape::RefList),
];

/// Field table for issues of the legacy RPC protocol (`RemoteIssue`).
pub const RPC_FIELDS: &[FieldRule] = &[
    ("assignee", "assignee", Shape::User),
    ("reporter", "reporter", Shape::User),
    ("status", "status", Shape::Id),
    ("priority", "priority", Shape::Id),
    ("type", "type", Shape::Id),
    ("resolution", "resolution", Shape::Id),
    ("project", "project", Shape::Key),
    ("parent", "parent", Shape::Key),
    ("components", "components", Shape::RefList),
    ("fixVersions", "fixVersions", Shape::RefList),
    ("affectsVersions", "affectsVersions", Shape::RefList),
];

/// Reduce a value according to its shape. Never fails; unexpected shapes
/// collapse to `None` (dropped) or pass through when already scalar.
pub fn reduce(shape: Shape, value: &Value) -> Option<Value> {
    match (shape, value) {
        (_, Value::Null) => None,
        (Shape::RefList, Value::Array(items)) => Some(Value::Array(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::Object(obj) => {
                        let id = obj.get("id").and_then(scalar_string)?;
                        let name = obj
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        Some(serde_json::json!({ "id": id, "name": name }))
                    }
                    other => scalar_string(other).map(|id| serde_json::json!({ "id": id, "name": "" })),
                })
                .collect(),
        )),
        (Shape::RefList, other) => Some(other.clone()),
        (_, Value::Object(obj)) => {
            let candidates: &[&str] = match shape {
                Shape::User => &["name", "accountId", "displayName"],
                Shape::Id => &["id", "name"],
                Shape::Key => &["key", "id"],
                Shape::RefList => &[],
            };
            candidates
                .iter()
                .find_map(|k| obj.get(*k).and_then(scalar_string))
                .map(Value::String)
        }
        (_, other) => Some(other.clone()),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Apply a field table to a raw field map.
///
/// Fields named in the table are reduced by their shape and stored under
/// their canonical name; all other non-null fields are copied verbatim.
pub fn clean_fields(raw: &Map<String, Value>, rules: &[FieldRule]) -> Map<String, Value> {
    let mut out = Map::new();
    for (name, value) in raw {
        match rules.iter().find(|(remote, _, _)| remote == name) {
            Some((_, canonical, shape)) => {
                if let Some(reduced) = reduce(*shape, value) {
                    out.insert((*canonical).to_string(), reduced);
                }
            }
            None if !value.is_null() => {
                out.insert(name.clone(), value.clone());
            }
            None => {}
        }
    }
    out
}

/// Render a field value for display.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(obj) => obj
                    .get("name")
                    .or_else(|| obj.get("value"))
                    .map(display_value)
                    .unwrap_or_default(),
                other => display_value(other),
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(obj) => obj
            .get("name")
            .or_else(|| obj.get("value"))
            .map(display_value)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}
