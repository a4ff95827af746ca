//! Reference entities: statuses, priorities, issue types, resolutions,
//! components, versions, projects and filters.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A named, identified lookup value from the remote service.
///
/// `id` is the stable opaque identifier issues refer to; `name` is what people
/// see. Whatever else the service sends along is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity {
    /// Create an entity with no extra attributes.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            extra: Map::new(),
        }
    }

    /// Build an entity from a raw remote object, if it carries an id.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// A string attribute from `extra`, if present and non-empty.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.extra
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// The project key, for projects.
    pub fn key(&self) -> Option<&str> {
        self.attr("key")
    }

    pub fn description(&self) -> Option<&str> {
        self.attr("description")
    }

    /// Whether an issue type is a subtask type (`subtask` on REST, `subTask` on RPC).
    pub fn is_subtask(&self) -> bool {
        ["subtask", "subTask"]
            .iter()
            .any(|k| self.extra.get(*k).and_then(Value::as_bool).unwrap_or(false))
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Entities keyed by lower-cased name.
pub type EntityMap = BTreeMap<String, Entity>;

/// Index a list of entities by lower-cased name.
pub fn index_by_name(entities: impl IntoIterator<Item = Entity>) -> EntityMap {
    entities
        .into_iter()
        .map(|e| (e.name.to_lowercase(), e))
        .collect()
}

/// Parse a JSON array of remote objects into an [`EntityMap`].
///
/// Elements without an id are skipped.
pub fn entity_map_from(value: &Value) -> EntityMap {
    index_by_name(
        value
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Entity::from_value),
    )
}

/// Look up an entity by name, case-insensitively.
pub fn lookup<'a>(map: &'a EntityMap, name: &str) -> Option<&'a Entity> {
    map.get(&name.to_lowercase())
}

/// Find the entity whose id equals `value`.
///
/// Returns `None` when the issue's stored value and the service's reference
/// set have drifted apart.
pub fn object_from_key<'a>(value: &str, map: &'a EntityMap) -> Option<&'a Entity> {
    map.values().find(|entity| entity.id == value)
}

/// The display names of a map, comma separated, for error messages.
pub fn names(map: &EntityMap) -> String {
    map.keys().cloned().collect::<Vec<_>>().join(",")
}

/// The kinds of reference data the formatter resolves ids against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Status,
    Priority,
    IssueType,
    SubtaskIssueType,
    /// Issue types and subtask types together.
    AnyIssueType,
    Resolution,
}

impl RefKind {
    /// The reference kind a template token resolves through, if any.
    pub fn for_token(token: &str) -> Option<Self> {
        match token.to_lowercase().as_str() {
            "status" => Some(RefKind::Status),
            "priority" => Some(RefKind::Priority),
            "type" => Some(RefKind::AnyIssueType),
            _ => None,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}
