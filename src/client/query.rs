//! Query builders and the operations they produce.

use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::Instrument;
use uuid::Uuid;

use super::transport::{ApiRequest, Method, Transport};
use super::url::{fill_url, snake_case_keys};
use super::ServiceRegistry;
use crate::errors::{ConfigError, RejectErrorValue, RequestFailure, TransportError};
use crate::models::{ApiEnvelope, EntityId, NormalizedPayload, RequestParams};
use crate::normalize::Normalizer;
use crate::schema::Schema;
use crate::store::Store;

/// Defaults shared by every operation of a query.
#[derive(Debug, Clone, Default)]
pub struct QueryOption {
    pub service: Option<String>,
    pub is_snake_case: Option<bool>,
}

/// Per-operation settings. Anything set here overrides the query and service defaults.
#[derive(Debug, Clone, Default)]
pub struct ActionOption {
    /// Attach the response envelope (minus `data`) to the result.
    pub full_response: bool,
    /// Attach the raw response data to the payload.
    pub include_api_response_data: bool,
    pub is_snake_case: Option<bool>,
    /// Answer from the registry's dummy data instead of the service.
    pub dummy_data: bool,
    /// Merged over caller params; wins on conflicting keys.
    pub fixed_params: Map<String, Value>,
    /// Merged over the caller body; wins on conflicting keys.
    pub fixed_data: Map<String, Value>,
    pub service: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl ActionOption {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn full_response(mut self) -> Self {
        self.full_response = true;
        self
    }

    pub fn include_api_response_data(mut self) -> Self {
        self.include_api_response_data = true;
        self
    }

    pub fn snake_case(mut self, is_snake_case: bool) -> Self {
        self.is_snake_case = Some(is_snake_case);
        self
    }

    pub fn dummy_data(mut self) -> Self {
        self.dummy_data = true;
        self
    }

    pub fn fixed_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fixed_params.insert(key.into(), value.into());
        self
    }

    pub fn fixed_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fixed_data.insert(key.into(), value.into());
        self
    }

    pub fn service(mut self, name: impl Into<String>) -> Self {
        self.service = Some(name.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperationKind {
    FetchOne,
    FetchMany,
    Post,
    Put,
    Delete,
}

impl OperationKind {
    fn method(self) -> Method {
        match self {
            OperationKind::FetchOne | OperationKind::FetchMany => Method::Get,
            OperationKind::Post => Method::Post,
            OperationKind::Put => Method::Put,
            OperationKind::Delete => Method::Delete,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            OperationKind::FetchOne => "fetchOne",
            OperationKind::FetchMany => "fetchMany",
            OperationKind::Post => "post",
            OperationKind::Put => "put",
            OperationKind::Delete => "delete",
        }
    }
}

/// Builds operations for one namespace.
#[derive(Debug, Clone)]
pub struct Query {
    registry: ServiceRegistry,
    namespace: String,
    schema: Option<(Arc<Schema>, String)>,
    option: QueryOption,
}

impl Query {
    pub(crate) fn new(
        registry: ServiceRegistry,
        namespace: String,
        schema: Option<(Arc<Schema>, String)>,
        option: QueryOption,
    ) -> Result<Self, ConfigError> {
        registry.resolve(option.service.as_deref())?;
        Ok(Self {
            registry,
            namespace,
            schema,
            option,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn fetch_one(
        &self,
        endpoint: &str,
        prefix: Option<&str>,
        options: ActionOption,
    ) -> Result<Operation, ConfigError> {
        self.normalizing(OperationKind::FetchOne, endpoint, prefix, options)
    }

    pub fn fetch(
        &self,
        endpoint: &str,
        prefix: Option<&str>,
        options: ActionOption,
    ) -> Result<Operation, ConfigError> {
        self.normalizing(OperationKind::FetchMany, endpoint, prefix, options)
    }

    pub fn post(
        &self,
        endpoint: &str,
        prefix: Option<&str>,
        options: ActionOption,
    ) -> Result<Operation, ConfigError> {
        self.normalizing(OperationKind::Post, endpoint, prefix, options)
    }

    pub fn put(
        &self,
        endpoint: &str,
        prefix: Option<&str>,
        options: ActionOption,
    ) -> Result<Operation, ConfigError> {
        self.normalizing(OperationKind::Put, endpoint, prefix, options)
    }

    pub fn delete(
        &self,
        endpoint: &str,
        prefix: Option<&str>,
        options: ActionOption,
    ) -> Result<Operation, ConfigError> {
        self.normalizing(OperationKind::Delete, endpoint, prefix, options)
    }

    /// An operation that returns response data as-is, without normalizing.
    pub fn raw(
        &self,
        method: Method,
        endpoint: &str,
        prefix: Option<&str>,
        options: ActionOption,
    ) -> Result<RawOperation, ConfigError> {
        let template = self.template(method, method.as_str(), endpoint, prefix, options)?;
        Ok(RawOperation { template })
    }

    /// Run arbitrary async work under this namespace, mapping its failure like any
    /// other operation.
    pub async fn wrap<T, F>(&self, prefix: &str, work: F) -> Result<T, RejectErrorValue>
    where
        F: Future<Output = Result<T, RequestFailure>>,
    {
        let span = tracing::info_span!(
            "operation",
            type_prefix = %format!("{}/WRAP/{}", self.namespace, prefix),
            request_id = %Uuid::new_v4()
        );
        work.instrument(span)
            .await
            .map_err(|failure| self.registry.reject(&failure))
    }

    fn normalizing(
        &self,
        kind: OperationKind,
        endpoint: &str,
        prefix: Option<&str>,
        options: ActionOption,
    ) -> Result<Operation, ConfigError> {
        let Some((schema, root)) = &self.schema else {
            tracing::error!(namespace = %self.namespace, "Normalizing operation without schema");
            return Err(ConfigError::MissingSchema(self.namespace.clone()));
        };
        let template = self.template(kind.method(), kind.suffix(), endpoint, prefix, options)?;
        Ok(Operation {
            template,
            kind,
            schema: Arc::clone(schema),
            root: root.clone(),
        })
    }

    fn template(
        &self,
        method: Method,
        suffix: &str,
        endpoint: &str,
        prefix: Option<&str>,
        options: ActionOption,
    ) -> Result<RequestTemplate, ConfigError> {
        let service = self
            .registry
            .resolve(options.service.as_deref().or(self.option.service.as_deref()))?;
        let snake_case = options
            .is_snake_case
            .or(self.option.is_snake_case)
            .unwrap_or(service.is_snake_case);
        let type_prefix = match prefix {
            Some(prefix) => format!("{}/{}/{}", self.namespace, prefix, suffix),
            None => format!("{}/{}", self.namespace, suffix),
        };

        Ok(RequestTemplate {
            registry: self.registry.clone(),
            transport: Arc::clone(&service.transport),
            service: service.name.clone(),
            type_prefix,
            method,
            endpoint: endpoint.to_string(),
            snake_case,
            options,
        })
    }
}

/// Everything needed to turn caller params into a request and send it.
#[derive(Clone)]
struct RequestTemplate {
    registry: ServiceRegistry,
    transport: Arc<dyn Transport>,
    service: String,
    type_prefix: String,
    method: Method,
    endpoint: String,
    snake_case: bool,
    options: ActionOption,
}

impl std::fmt::Debug for RequestTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestTemplate")
            .field("service", &self.service)
            .field("type_prefix", &self.type_prefix)
            .field("method", &self.method)
            .field("endpoint", &self.endpoint)
            .field("snake_case", &self.snake_case)
            .field("options", &self.options)
            .finish()
    }
}

impl RequestTemplate {
    fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "operation",
            type_prefix = %self.type_prefix,
            service = %self.service,
            request_id = %Uuid::new_v4()
        )
    }

    fn build_request(&self, params: &RequestParams) -> ApiRequest {
        let mut url_params = params.params.clone();
        url_params.extend(self.options.fixed_params.clone());
        let url = fill_url(&self.endpoint, &url_params, self.snake_case);

        let body = match self.method {
            Method::Get => None,
            _ => Some(self.body(params)),
        };

        ApiRequest {
            method: self.method,
            url,
            body,
            headers: self.options.headers.clone(),
        }
    }

    // Non-object bodies (arrays of records) are sent unchanged.
    fn body(&self, params: &RequestParams) -> Value {
        let body = match &params.data {
            Some(Value::Object(data)) => {
                let mut merged = data.clone();
                merged.extend(self.options.fixed_data.clone());
                Value::Object(merged)
            }
            Some(other) => other.clone(),
            None => Value::Object(self.options.fixed_data.clone()),
        };
        if self.snake_case {
            snake_case_keys(&body)
        } else {
            body
        }
    }

    fn source(&self, params: &RequestParams) -> Option<String> {
        params.source.clone().or_else(|| {
            self.options
                .fixed_params
                .get("source")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
    }

    async fn call(&self, params: &RequestParams) -> Result<ApiEnvelope, TransportError> {
        let request = self.build_request(params);
        if !self.options.dummy_data {
            return self.transport.request(request).await;
        }
        match self.registry.dummy() {
            Some(dummy) => dummy.request(request).await,
            None => Err(TransportError::DummyMissing {
                endpoint: request.url,
                method: request.method.as_str().to_string(),
            }),
        }
    }

    async fn run_raw(&self, params: &RequestParams) -> Result<Value, RejectErrorValue> {
        self.fetch_raw(params)
            .instrument(self.span())
            .await
            .map_err(|failure| self.registry.reject(&failure))
    }

    async fn fetch_raw(&self, params: &RequestParams) -> Result<Value, RequestFailure> {
        let envelope = self.call(params).await?;
        if self.options.full_response {
            return Ok(serde_json::to_value(&envelope).map_err(TransportError::from)?);
        }
        Ok(match envelope.data {
            Value::Null => Value::Object(Map::new()),
            data => data,
        })
    }
}

/// A request whose response is normalized against the query schema.
#[derive(Debug, Clone)]
pub struct Operation {
    template: RequestTemplate,
    kind: OperationKind,
    schema: Arc<Schema>,
    root: String,
}

impl Operation {
    pub fn type_prefix(&self) -> &str {
        &self.template.type_prefix
    }

    pub fn root_entity(&self) -> &str {
        &self.root
    }

    /// Send the request and normalize the response data.
    pub async fn run(&self, params: RequestParams) -> Result<NormalizedPayload, RejectErrorValue> {
        self.execute(&params)
            .instrument(self.template.span())
            .await
            .map_err(|failure| self.template.registry.reject(&failure))
    }

    /// Send the request and return its data unnormalized (or the whole envelope when
    /// `full_response` is set).
    pub async fn run_raw(&self, params: RequestParams) -> Result<Value, RejectErrorValue> {
        self.template.run_raw(&params).await
    }

    /// Send the request and return the envelope. Failures are not classified.
    pub async fn call(&self, params: &RequestParams) -> Result<ApiEnvelope, TransportError> {
        self.template.call(params).await
    }

    /// Run against `store`: mark the source pending, then apply the outcome to the
    /// slice of the root entity type.
    ///
    /// Deletes skip source bookkeeping on success and drop `params.id` from the slice.
    pub async fn dispatch(
        &self,
        store: &mut Store,
        params: RequestParams,
    ) -> Result<NormalizedPayload, RejectErrorValue> {
        let source = self.template.source(&params);
        let deleted_id = match self.kind {
            OperationKind::Delete => params.params.get("id").and_then(EntityId::from_value),
            _ => None,
        };
        let is_delete = self.kind == OperationKind::Delete;

        if !is_delete {
            if let Some(source) = &source {
                store.pending(&self.root, source);
            }
        }

        match self.run(params).await {
            Ok(payload) => {
                if is_delete {
                    if let Some(id) = &deleted_id {
                        store.deleted(&self.root, id);
                    }
                } else {
                    store.fulfilled(&self.root, &payload);
                }
                Ok(payload)
            }
            Err(reject) => {
                if let Some(source) = &source {
                    store.rejected(&self.root, source, &reject);
                }
                Err(reject)
            }
        }
    }

    async fn execute(&self, params: &RequestParams) -> Result<NormalizedPayload, RequestFailure> {
        let envelope = self.template.call(params).await?;
        let data = match &envelope.data {
            Value::Null => Value::Array(Vec::new()),
            data => data.clone(),
        };
        let normalized = Normalizer::new(&self.schema).normalize(&data, &self.root)?;
        let source = self.template.source(params);

        tracing::info!(
            source = source.as_deref().unwrap_or("-"),
            roots = normalized.result.ids().len(),
            "Operation fulfilled"
        );

        let options = &self.template.options;
        Ok(NormalizedPayload {
            source,
            normalized,
            paginator: envelope.paginator.clone(),
            is_load_more: params.is_load_more,
            api_response_data: options.include_api_response_data.then_some(data),
            response: options.full_response.then(|| envelope.without_data()),
        })
    }
}

/// A request whose response data is returned without normalizing.
#[derive(Debug, Clone)]
pub struct RawOperation {
    template: RequestTemplate,
}

impl RawOperation {
    pub fn type_prefix(&self) -> &str {
        &self.template.type_prefix
    }

    pub async fn run(&self, params: RequestParams) -> Result<Value, RejectErrorValue> {
        self.template.run_raw(&params).await
    }

    pub async fn call(&self, params: &RequestParams) -> Result<ApiEnvelope, TransportError> {
        self.template.call(params).await
    }
}
