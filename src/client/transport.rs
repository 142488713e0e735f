//! Transports: how a built request reaches a backend.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::Config;
use crate::errors::TransportError;
use crate::models::ApiEnvelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
            Method::Put => "put",
            Method::Delete => "delete",
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A fully resolved request: URL already templated, body already cased.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path plus query string, relative to the service base URL.
    pub url: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, request: ApiRequest) -> Result<ApiEnvelope, TransportError>;
}

/// JSON-over-HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        Self::new(&config.base_url, config.timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: ApiRequest) -> Result<ApiEnvelope, TransportError> {
        let url = format!("{}{}", self.base_url, request.url);
        tracing::debug!(method = request.method.as_str(), %url, "Sending request");

        let mut builder = self.client.request(request.method.into(), &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope = response.json::<ApiEnvelope>().await?;
        Ok(envelope)
    }
}

/// Answers requests from canned data shaped `{endpoint: {method: data}}`.
///
/// The endpoint is matched on the path without its query string.
#[derive(Debug, Clone, Default)]
pub struct DummyTransport {
    data: Value,
}

impl DummyTransport {
    pub fn new(data: Value) -> Self {
        Self { data }
    }
}

#[async_trait]
impl Transport for DummyTransport {
    async fn request(&self, request: ApiRequest) -> Result<ApiEnvelope, TransportError> {
        let endpoint = request.url.split('?').next().unwrap_or_default();
        match self
            .data
            .get(endpoint)
            .and_then(|methods| methods.get(request.method.as_str()))
        {
            Some(data) => Ok(ApiEnvelope::ok(data.clone())),
            None => Err(TransportError::DummyMissing {
                endpoint: endpoint.to_string(),
                method: request.method.as_str().to_string(),
            }),
        }
    }
}
