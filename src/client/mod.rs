//! Request layer: API services, query builders and the operations they produce.
//!
//! A [`ServiceRegistry`] owns the configured services. Queries are bound to a namespace
//! and optionally a schema; each operation they build sends one request through the
//! resolved service and, for normalizing operations, returns a [`NormalizedPayload`]
//! ready for the store.
//!
//! [`NormalizedPayload`]: crate::models::NormalizedPayload

mod query;
mod transport;
pub mod url;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::errors::{ConfigError, DefaultErrorMapper, ErrorMapper, RejectErrorValue, RequestFailure};
use crate::schema::Schema;

pub use query::{ActionOption, Operation, Query, QueryOption, RawOperation};
pub use transport::{ApiRequest, DummyTransport, HttpTransport, Method, Transport};

/// One backend the engine can talk to.
#[derive(Clone)]
pub struct ApiService {
    pub name: String,
    pub transport: Arc<dyn Transport>,
    pub is_default: bool,
    /// Convert outgoing body and query keys to snake_case.
    pub is_snake_case: bool,
}

impl ApiService {
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            transport,
            is_default: false,
            is_snake_case: false,
        }
    }

    pub fn default_service(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn snake_case(mut self, is_snake_case: bool) -> Self {
        self.is_snake_case = is_snake_case;
        self
    }
}

impl std::fmt::Debug for ApiService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiService")
            .field("name", &self.name)
            .field("is_default", &self.is_default)
            .field("is_snake_case", &self.is_snake_case)
            .finish()
    }
}

/// Input of [`ServiceRegistry::new`].
#[derive(Default)]
pub struct RegistryConfig {
    pub services: Vec<ApiService>,
    /// Canned responses shaped `{endpoint: {method: data}}`, served to operations that
    /// set [`ActionOption::dummy_data`].
    pub dummy_data: Option<Value>,
    /// Replaces the default failure classification.
    pub error_mapper: Option<Arc<dyn ErrorMapper>>,
}

impl RegistryConfig {
    pub fn new(services: Vec<ApiService>) -> Self {
        Self {
            services,
            ..Default::default()
        }
    }

    pub fn dummy_data(mut self, data: Value) -> Self {
        self.dummy_data = Some(data);
        self
    }

    pub fn error_mapper(mut self, mapper: Arc<dyn ErrorMapper>) -> Self {
        self.error_mapper = Some(mapper);
        self
    }
}

struct RegistryInner {
    services: BTreeMap<String, ApiService>,
    default_service: String,
    dummy: Option<Arc<DummyTransport>>,
    error_mapper: Arc<dyn ErrorMapper>,
}

/// Registered services plus the shared error mapper. Cheap to clone.
#[derive(Clone)]
pub struct ServiceRegistry {
    inner: Arc<RegistryInner>,
}

impl ServiceRegistry {
    /// Register services. A lone service becomes the default; otherwise the last one
    /// flagged `is_default` wins and having none is an error.
    pub fn new(config: RegistryConfig) -> Result<Self, ConfigError> {
        let single = config.services.len() == 1;
        let mut services = BTreeMap::new();
        let mut default_service = None;

        for mut service in config.services {
            if single {
                service.is_default = true;
            }
            if service.is_default {
                default_service = Some(service.name.clone());
            }
            services.insert(service.name.clone(), service);
        }

        let default_service = default_service.ok_or_else(|| {
            tracing::error!("No default API service registered");
            ConfigError::NoDefaultService
        })?;

        tracing::info!(
            services = services.len(),
            default = %default_service,
            "API services registered"
        );

        Ok(Self {
            inner: Arc::new(RegistryInner {
                services,
                default_service,
                dummy: config.dummy_data.map(|data| Arc::new(DummyTransport::new(data))),
                error_mapper: config
                    .error_mapper
                    .unwrap_or_else(|| Arc::new(DefaultErrorMapper)),
            }),
        })
    }

    pub fn service(&self, name: &str) -> Option<&ApiService> {
        self.inner.services.get(name)
    }

    pub fn default_service(&self) -> &ApiService {
        &self.inner.services[&self.inner.default_service]
    }

    /// Service `name`, or the default when `None`.
    pub fn resolve(&self, name: Option<&str>) -> Result<&ApiService, ConfigError> {
        match name {
            Some(name) => self
                .service(name)
                .ok_or_else(|| ConfigError::UnknownService(name.to_string())),
            None => Ok(self.default_service()),
        }
    }

    /// A query whose normalizing operations produce records of type `root_entity`.
    pub fn query(
        &self,
        namespace: impl Into<String>,
        schema: Arc<Schema>,
        root_entity: &str,
        option: QueryOption,
    ) -> Result<Query, ConfigError> {
        if !schema.contains(root_entity) {
            return Err(ConfigError::UnknownEntity(root_entity.to_string()));
        }
        Query::new(
            self.clone(),
            namespace.into(),
            Some((schema, root_entity.to_string())),
            option,
        )
    }

    /// A query without a schema; only raw operations can be built from it.
    pub fn raw_query(
        &self,
        namespace: impl Into<String>,
        option: QueryOption,
    ) -> Result<Query, ConfigError> {
        Query::new(self.clone(), namespace.into(), None, option)
    }

    pub(crate) fn dummy(&self) -> Option<Arc<DummyTransport>> {
        self.inner.dummy.clone()
    }

    pub(crate) fn reject(&self, failure: &RequestFailure) -> RejectErrorValue {
        self.inner.error_mapper.map_failure(failure)
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.inner.services)
            .field("default_service", &self.inner.default_service)
            .field("dummy", &self.inner.dummy.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dummy(name: &str) -> ApiService {
        ApiService::new(name, Arc::new(DummyTransport::new(json!({}))))
    }

    #[test]
    fn test_single_service_becomes_default() {
        let registry = ServiceRegistry::new(RegistryConfig::new(vec![dummy("main")])).unwrap();
        assert_eq!(registry.default_service().name, "main");
        assert!(registry.default_service().is_default);
    }

    #[test]
    fn test_default_required_with_many_services() {
        let err = ServiceRegistry::new(RegistryConfig::new(vec![dummy("a"), dummy("b")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::NoDefaultService);

        let registry = ServiceRegistry::new(RegistryConfig::new(vec![
            dummy("a"),
            dummy("b").default_service(),
        ]))
        .unwrap();
        assert_eq!(registry.default_service().name, "b");
    }

    #[test]
    fn test_resolve_service() {
        let registry = ServiceRegistry::new(RegistryConfig::new(vec![
            dummy("a").default_service(),
            dummy("b"),
        ]))
        .unwrap();

        assert_eq!(registry.resolve(None).unwrap().name, "a");
        assert_eq!(registry.resolve(Some("b")).unwrap().name, "b");
        assert_eq!(
            registry.resolve(Some("c")).unwrap_err(),
            ConfigError::UnknownService("c".to_string())
        );
    }

    #[test]
    fn test_query_rejects_unknown_root() {
        let registry = ServiceRegistry::new(RegistryConfig::new(vec![dummy("a")])).unwrap();
        let schema = Arc::new(Schema::builder().build().unwrap());

        let err = registry
            .query("users", schema, "user", QueryOption::default())
            .unwrap_err();
        assert_eq!(err, ConfigError::UnknownEntity("user".to_string()));
    }
}
