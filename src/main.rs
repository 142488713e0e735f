//! entity-sync inspector
//!
//! Fetches one endpoint of the configured API, normalizes the response and prints the
//! resulting source view as JSON.
//!
//! Usage: `entity-sync <endpoint> [entity_key] [source]`

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use entity_sync::config::Config;
use entity_sync::{
    ActionOption, ApiService, EntityShaper, HttpTransport, QueryOption, RegistryConfig,
    RequestParams, Schema, ServiceRegistry, Store,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(endpoint) = args.next() else {
        eprintln!("usage: entity-sync <endpoint> [entity_key] [source]");
        std::process::exit(2);
    };
    let entity_key = args.next().unwrap_or_else(|| "item".to_string());
    let source = args.next().unwrap_or_else(|| "default".to_string());

    tracing::info!("Base URL: {}", config.base_url);
    tracing::info!("Fetching {} as {} into source {}", endpoint, entity_key, source);

    let transport = HttpTransport::from_config(&config)?;
    let registry = ServiceRegistry::new(RegistryConfig::new(vec![ApiService::new(
        &config.service_name,
        Arc::new(transport),
    )
    .snake_case(config.snake_case)]))?;

    let schema = Arc::new(
        Schema::builder()
            .entity(EntityShaper::builder(&entity_key).all_fields().build())
            .build()?,
    );
    let query = registry.query("inspect", schema, &entity_key, QueryOption::default())?;
    let operation = query.fetch(&endpoint, None, ActionOption::new())?;

    let mut store = Store::new();
    match operation
        .dispatch(&mut store, RequestParams::new().source(&source))
        .await
    {
        Ok(payload) => tracing::info!(
            "Fetched {} records",
            payload.normalized.result.ids().len()
        ),
        Err(reject) => tracing::error!("Fetch failed: {}", reject.err_msg),
    }

    let view = store.select_source_view(&entity_key, &source);
    println!("{}", serde_json::to_string_pretty(&view)?);

    Ok(())
}
