//! Entity records and the flat entity table.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A shaped entity record.
pub type Entity = Map<String, Value>;

/// Entities of one type keyed by id.
pub type EntityMap = BTreeMap<EntityId, Entity>;

/// Entity type name to the entities of that type.
pub type EntityTable = BTreeMap<String, EntityMap>;

/// Identity of an entity within its type.
///
/// APIs key records by either integers or strings; both shapes are kept as given so
/// that ids round-trip back to the server unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    /// Unsigned ids beyond the `i64` range
    UInt(u64),
    Str(String),
}

impl EntityId {
    /// Read an id from a JSON value. Only integers and strings qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(EntityId::Int)
                .or_else(|| n.as_u64().map(EntityId::UInt)),
            Value::String(s) => Some(EntityId::Str(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            EntityId::Int(i) => Value::from(*i),
            EntityId::UInt(u) => Value::from(*u),
            EntityId::Str(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(i) => write!(f, "{}", i),
            EntityId::UInt(u) => write!(f, "{}", u),
            EntityId::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId::Int(id)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        EntityId::Str(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        EntityId::Str(id)
    }
}
