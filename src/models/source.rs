//! Per-source state and the materialized view selectors produce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Entity, EntityId, Paginator};

/// State of one named source: an ordered id list plus pagination and request metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceState {
    pub all_ids: Vec<EntityId>,
    pub paginator: Paginator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_request_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loading: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err_code: Option<Value>,
    /// Extra payload fields forwarded verbatim from the last fetch.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A source joined against the entity table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceView {
    pub data: Vec<Entity>,
    pub paginator: Paginator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_request_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loading: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err_code: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
