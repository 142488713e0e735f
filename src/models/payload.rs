//! Normalized payloads and the API response envelope.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::{EntityId, EntityTable, Paginator};

/// Root references produced by normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NormalizedResult {
    One(EntityId),
    Many(Vec<EntityId>),
}

impl NormalizedResult {
    /// Root ids in response order.
    pub fn ids(&self) -> Vec<EntityId> {
        match self {
            NormalizedResult::One(id) => vec![id.clone()],
            NormalizedResult::Many(ids) => ids.clone(),
        }
    }
}

impl Default for NormalizedResult {
    fn default() -> Self {
        NormalizedResult::Many(Vec::new())
    }
}

/// Flat entity table plus root ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Normalized {
    pub entities: EntityTable,
    pub result: NormalizedResult,
}

/// Unit of transfer from a fetch operation into the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub normalized: Normalized,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paginator: Option<Paginator>,
    #[serde(default)]
    pub is_load_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_response_data: Option<Value>,
    /// Response envelope without its `data` member.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Map<String, Value>>,
}

/// Envelope every backend response is wrapped in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope {
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paginator: Option<Paginator>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    /// Backends send this as either a string or a number.
    #[serde(default)]
    pub status: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_data: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApiEnvelope {
    /// Wrap data in a successful envelope.
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            status: Value::String("200".to_string()),
            ..Default::default()
        }
    }

    /// The envelope as a JSON object with `data` removed.
    pub fn without_data(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => {
                map.remove("data");
                map
            }
            _ => Map::new(),
        }
    }
}

// Backends send `null` for fields they have nothing to say about.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
