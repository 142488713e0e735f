//! Parameters callers hand to a request operation.

use serde_json::{Map, Value};

use super::EntityId;

/// Arguments of one request.
///
/// `data` becomes the request body; everything in `params` is used for URL placeholders
/// and the query string. `source` binds the response to a named source and is never sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    pub source: Option<String>,
    pub data: Option<Value>,
    pub is_load_more: bool,
    pub params: Map<String, Value>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn load_more(mut self, is_load_more: bool) -> Self {
        self.is_load_more = is_load_more;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn id(self, id: &EntityId) -> Self {
        self.param("id", id.to_value())
    }

    pub fn page(self, page: u64) -> Self {
        self.param("page", page)
    }

    pub fn limit(self, limit: u64) -> Self {
        self.param("limit", limit)
    }
}
