//! Error handling module for the synchronization engine.
//!
//! Configuration errors are returned from builders and constructors. Request-time
//! failures are classified into a uniform [`RejectErrorValue`] that travels back to
//! callers as the `Err` side of every operation result.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error codes as constants to avoid stringly-typed errors.
#[allow(dead_code)]
pub mod codes {
    pub const UNDECLARED_ASSOCIATE: &str = "UNDECLARED_ASSOCIATE";
    pub const UNKNOWN_ENTITY: &str = "UNKNOWN_ENTITY";
    pub const DUPLICATE_ENTITY: &str = "DUPLICATE_ENTITY";
    pub const NO_DEFAULT_SERVICE: &str = "NO_DEFAULT_SERVICE";
    pub const UNKNOWN_SERVICE: &str = "UNKNOWN_SERVICE";
    pub const MISSING_SCHEMA: &str = "MISSING_SCHEMA";
    pub const NORMALIZE_ERROR: &str = "NORMALIZE_ERROR";
    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
    pub const HTTP_ERROR: &str = "HTTP_ERROR";
    pub const DECODE_ERROR: &str = "DECODE_ERROR";
    pub const DUMMY_DATA_MISSING: &str = "DUMMY_DATA_MISSING";
    pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";
}

/// Setup-time contract violation. Fatal: raised while building schemas or registries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A relation references an associate the shaper never declared
    UndeclaredAssociate {
        entity: String,
        associate: String,
        declared: Vec<String>,
    },
    /// A relation targets an entity type that is not registered
    UnknownEntity(String),
    /// Two shapers registered under the same entity key
    DuplicateEntity(String),
    /// No API service is flagged as default
    NoDefaultService,
    /// An operation names a service that is not registered
    UnknownService(String),
    /// A normalizing operation was requested on a query without a schema
    MissingSchema(String),
}

impl ConfigError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ConfigError::UndeclaredAssociate { .. } => codes::UNDECLARED_ASSOCIATE,
            ConfigError::UnknownEntity(_) => codes::UNKNOWN_ENTITY,
            ConfigError::DuplicateEntity(_) => codes::DUPLICATE_ENTITY,
            ConfigError::NoDefaultService => codes::NO_DEFAULT_SERVICE,
            ConfigError::UnknownService(_) => codes::UNKNOWN_SERVICE,
            ConfigError::MissingSchema(_) => codes::MISSING_SCHEMA,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ConfigError::UndeclaredAssociate {
                entity,
                associate,
                declared,
            } => format!(
                "{}: {} association is not defined yet (declared: {})",
                entity,
                associate,
                declared.join(", ")
            ),
            ConfigError::UnknownEntity(key) => format!("Entity {} is not registered", key),
            ConfigError::DuplicateEntity(key) => format!("Entity {} is registered twice", key),
            ConfigError::NoDefaultService => {
                "You need to have at least 1 default API service".to_string()
            }
            ConfigError::UnknownService(name) => format!("API service {} is not registered", name),
            ConfigError::MissingSchema(namespace) => format!(
                "Normalize error: missing entity schema declaration for {}",
                namespace
            ),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for ConfigError {}

/// A payload that cannot be turned into entities.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizeError {
    /// No shaper is registered for the entity type
    UnknownEntity(String),
    /// Record has no value under its id attribute
    MissingId { entity: String, id_attribute: String },
    /// Id value is neither an integer nor a string
    InvalidId { entity: String, value: Value },
    /// Something other than an object sits where a record is expected
    NotAnObject { entity: String, value: Value },
}

impl std::fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NormalizeError::UnknownEntity(key) => write!(f, "entity {} is not registered", key),
            NormalizeError::MissingId {
                entity,
                id_attribute,
            } => write!(f, "{} record is missing its `{}` attribute", entity, id_attribute),
            NormalizeError::InvalidId { entity, value } => {
                write!(f, "{} record has an invalid id: {}", entity, value)
            }
            NormalizeError::NotAnObject { entity, value } => {
                write!(f, "expected a {} record, found: {}", entity, value)
            }
        }
    }
}

impl std::error::Error for NormalizeError {}

/// Failure reported by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Connection, timeout or other I/O failure
    Network(String),
    /// Server answered with a non-success status
    Status { status: u16, body: Value },
    /// Response body could not be decoded
    Decode(String),
    /// Dummy data has no entry for the endpoint/method pair
    DummyMissing { endpoint: String, method: String },
}

impl TransportError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::DummyMissing { .. } => Some(404),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Network(msg) => write!(f, "network error: {}", msg),
            TransportError::Status { status, .. } => {
                write!(f, "request failed with status {}", status)
            }
            TransportError::Decode(msg) => write!(f, "decode error: {}", msg),
            TransportError::DummyMissing { endpoint, method } => {
                write!(f, "no dummy data for {} {}", method, endpoint)
            }
        }
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        tracing::warn!("Transport error: {:?}", err);
        if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Decode(format!("JSON error: {}", err))
    }
}

/// Anything a request operation can fail with before it is classified.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestFailure {
    Transport(TransportError),
    Normalize(NormalizeError),
    /// Failure raised by caller code run through a wrapper
    Other(String),
}

impl std::fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestFailure::Transport(e) => write!(f, "{}", e),
            RequestFailure::Normalize(e) => write!(f, "{}", e),
            RequestFailure::Other(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for RequestFailure {}

impl From<TransportError> for RequestFailure {
    fn from(err: TransportError) -> Self {
        RequestFailure::Transport(err)
    }
}

impl From<NormalizeError> for RequestFailure {
    fn from(err: NormalizeError) -> Self {
        RequestFailure::Normalize(err)
    }
}

/// Coarse classification of a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Http,
    Decode,
    Normalize,
    Unknown,
}

/// Uniform failure value surfaced to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectErrorValue {
    pub kind: ErrorKind,
    pub err_msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err_code: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err_status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contexts: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_bag: Option<Map<String, Value>>,
}

impl RejectErrorValue {
    fn new(kind: ErrorKind, err_msg: impl Into<String>, err_code: &str) -> Self {
        Self {
            kind,
            err_msg: err_msg.into(),
            err_code: Some(Value::String(err_code.to_string())),
            err_status_code: None,
            contexts: None,
            message_bag: None,
        }
    }
}

/// Converts raw failures into [`RejectErrorValue`]s.
pub trait ErrorMapper: Send + Sync {
    fn map_failure(&self, failure: &RequestFailure) -> RejectErrorValue;
}

impl<F> ErrorMapper for F
where
    F: Fn(&RequestFailure) -> RejectErrorValue + Send + Sync,
{
    fn map_failure(&self, failure: &RequestFailure) -> RejectErrorValue {
        self(failure)
    }
}

/// Default mapper: [`classify`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorMapper;

impl ErrorMapper for DefaultErrorMapper {
    fn map_failure(&self, failure: &RequestFailure) -> RejectErrorValue {
        classify(failure)
    }
}

/// Classify a failure into the uniform rejection shape.
///
/// For HTTP status failures the server body is mined for `message`, `code`/`errCode`,
/// `errors`/`messageBag` and `contexts`.
pub fn classify(failure: &RequestFailure) -> RejectErrorValue {
    let reject = match failure {
        RequestFailure::Transport(TransportError::Status { status, body }) => {
            let err_msg = body
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Request failed with status {}", status));
            let err_code = body
                .get("code")
                .or_else(|| body.get("errCode"))
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or_else(|| Value::String(codes::HTTP_ERROR.to_string()));
            let message_bag = body
                .get("errors")
                .or_else(|| body.get("messageBag"))
                .and_then(Value::as_object)
                .cloned();
            let contexts = body.get("contexts").and_then(Value::as_object).cloned();

            RejectErrorValue {
                kind: ErrorKind::Http,
                err_msg,
                err_code: Some(err_code),
                err_status_code: Some(*status),
                contexts,
                message_bag,
            }
        }
        RequestFailure::Transport(TransportError::Network(msg)) => {
            RejectErrorValue::new(ErrorKind::Network, msg.clone(), codes::NETWORK_ERROR)
        }
        RequestFailure::Transport(TransportError::Decode(msg)) => {
            RejectErrorValue::new(ErrorKind::Decode, msg.clone(), codes::DECODE_ERROR)
        }
        RequestFailure::Transport(err @ TransportError::DummyMissing { .. }) => {
            let mut reject =
                RejectErrorValue::new(ErrorKind::Http, err.to_string(), codes::DUMMY_DATA_MISSING);
            reject.err_status_code = err.status_code();
            reject
        }
        RequestFailure::Normalize(err) => {
            RejectErrorValue::new(ErrorKind::Normalize, err.to_string(), codes::NORMALIZE_ERROR)
        }
        RequestFailure::Other(msg) => {
            RejectErrorValue::new(ErrorKind::Unknown, msg.clone(), codes::UNKNOWN_ERROR)
        }
    };

    tracing::warn!(
        kind = ?reject.kind,
        status = ?reject.err_status_code,
        "Request rejected: {}",
        reject.err_msg
    );
    reject
}
