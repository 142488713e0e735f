//! Configuration module for the sync engine.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the default API service
    pub base_url: String,
    /// Name the default service is registered under
    pub service_name: String,
    /// Send snake_case keys to the default service
    pub snake_case: bool,
    /// Per-request timeout
    pub timeout: Duration,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let base_url = env::var("ENTITY_SYNC_BASE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());

        let service_name =
            env::var("ENTITY_SYNC_SERVICE").unwrap_or_else(|_| "default".to_string());

        let snake_case = parse_or("ENTITY_SYNC_SNAKE_CASE", false);

        let timeout = Duration::from_secs(parse_or("ENTITY_SYNC_TIMEOUT_SECS", 30));

        let log_level = env::var("ENTITY_SYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Self {
            base_url,
            service_name,
            snake_case,
            timeout,
            log_level,
        }
    }
}

// Invalid values fall back to the default instead of aborting startup.
fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid {} value {:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        env::remove_var("ENTITY_SYNC_BASE_URL");
        env::remove_var("ENTITY_SYNC_SERVICE");
        env::remove_var("ENTITY_SYNC_SNAKE_CASE");
        env::remove_var("ENTITY_SYNC_TIMEOUT_SECS");
        env::remove_var("ENTITY_SYNC_LOG_LEVEL");

        let config = Config::from_env();

        assert_eq!(config.base_url, "http://127.0.0.1:8080");
        assert_eq!(config.service_name, "default");
        assert!(!config.snake_case);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_parse_or_falls_back() {
        env::set_var("ENTITY_SYNC_TEST_FLAG", "not-a-bool");
        assert!(parse_or("ENTITY_SYNC_TEST_FLAG", true));

        env::set_var("ENTITY_SYNC_TEST_FLAG", " false ");
        assert!(!parse_or("ENTITY_SYNC_TEST_FLAG", true));

        env::remove_var("ENTITY_SYNC_TEST_FLAG");
        assert_eq!(parse_or("ENTITY_SYNC_TEST_FLAG", 7u64), 7);
    }
}
