//! Normalized entity sync engine.
//!
//! Fetches records from JSON APIs, flattens nested payloads into per-type entity tables,
//! and tracks which ids each named list ("source") holds along with its pagination.

pub mod client;
pub mod config;
pub mod errors;
pub mod ledger;
pub mod models;
pub mod normalize;
pub mod schema;
pub mod store;
pub mod upsert;

pub use client::{
    ActionOption, ApiService, HttpTransport, Operation, Query, QueryOption, RegistryConfig,
    ServiceRegistry,
};
pub use errors::{ConfigError, RejectErrorValue};
pub use models::{EntityId, NormalizedPayload, RequestParams};
pub use schema::{EntityShaper, Schema};
pub use store::Store;

#[cfg(test)]
mod tests;
