//! Keys and key-path access into JSON documents.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A primary key assigned to a record.
///
/// Keys are either integers (auto-increment collections) or strings.
/// The derived ordering sorts all integer keys before string keys,
/// which fixes the iteration order of a collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    /// Integer key.
    Int(i64),
    /// String key.
    Text(String),
}

impl Key {
    /// Extracts a key from a JSON value, if the value is a valid key type.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Key::Int),
            Value::String(s) => Some(Key::Text(s.clone())),
            _ => None,
        }
    }

    /// Converts the key back into a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Key::Int(n) => Value::from(*n),
            Key::Text(s) => Value::from(s.clone()),
        }
    }

    /// Returns the integer value, if this is an integer key.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Key::Int(n) => Some(*n),
            Key::Text(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{n}"),
            Key::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

/// Resolves a dotted key path within a document.
#[must_use]
pub fn value_at_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Extracts a key from a document at a dotted key path.
#[must_use]
pub fn key_at_path(doc: &Value, path: &str) -> Option<Key> {
    value_at_path(doc, path).and_then(Key::from_value)
}

/// Sets a value at a dotted key path, creating intermediate objects.
///
/// Returns `false` if an intermediate segment exists but is not an object.
pub fn set_at_path(doc: &mut Value, path: &str, value: Value) -> bool {
    let mut current = doc;
    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => return false,
    };

    for segment in parents {
        let Some(map) = current.as_object_mut() else {
            return false;
        };
        current = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }

    match current.as_object_mut() {
        Some(map) => {
            map.insert((*last).to_string(), value);
            true
        }
        None => false,
    }
}
