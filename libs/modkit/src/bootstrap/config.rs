//! `AppConfig` — every field named in spec §6.3, loaded by layering
//! environment variables over built-in defaults with `figment` (the
//! teacher's own configuration layering approach).

use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,

    pub database_uri: String,
    pub database_name: String,
    pub max_connection_pool_size: u32,

    pub token_signing_key: String,
    pub token_ttl_seconds: i64,

    pub embedding_model_name: String,
    pub embedding_api_key: String,
    pub embedding_service_url: String,
    pub monitored_vector_types: Vec<String>,
    pub vector_service_enabled: bool,
    pub vector_worker_count: usize,
    pub vector_queue_capacity: usize,

    pub ai_service_url: String,
    pub ai_service_api_key: String,
    pub ai_call_timeout_seconds: u64,

    pub log_level: String,
    pub request_timeout_seconds: u64,
    pub enforce_authentication: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_owned(),
            server_port: 8080,
            database_uri: "mongodb://localhost:27017".to_owned(),
            database_name: "fieldsight".to_owned(),
            max_connection_pool_size: 20,
            token_signing_key: "change-me-in-production".to_owned(),
            token_ttl_seconds: 3600,
            embedding_model_name: "text-embedding-3-small".to_owned(),
            embedding_api_key: String::new(),
            embedding_service_url: "http://localhost:9300".to_owned(),
            monitored_vector_types: vec!["asset".to_owned(), "inspection".to_owned()],
            vector_service_enabled: false,
            vector_worker_count: 4,
            vector_queue_capacity: 256,
            ai_service_url: "http://localhost:9200".to_owned(),
            ai_service_api_key: String::new(),
            ai_call_timeout_seconds: 30,
            log_level: "info".to_owned(),
            request_timeout_seconds: 30,
            enforce_authentication: true,
        }
    }
}

impl AppConfig {
    /// Layer `APP_*`-prefixed environment variables over the defaults.
    ///
    /// # Errors
    /// Returns an error if an environment variable is present but cannot be
    /// parsed into its field's type.
    pub fn load() -> anyhow::Result<Self> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Env::prefixed("APP_").split("__"))
            .extract()?;
        Ok(config)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    #[must_use]
    pub fn ai_call_timeout(&self) -> Duration {
        Duration::from_secs(self.ai_call_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_loadable_without_any_env() {
        let config = AppConfig::load().expect("defaults always parse");
        assert_eq!(config.server_port, 8080);
        assert!(config.enforce_authentication);
    }

    #[test]
    fn env_override_takes_precedence() {
        // SAFETY-equivalent: figment's Env provider reads whatever is set;
        // this uses the process env directly, matching deployment behavior.
        unsafe {
            std::env::set_var("APP_SERVER_PORT", "9000");
        }
        let config = AppConfig::load().expect("parses override");
        assert_eq!(config.server_port, 9000);
        unsafe {
            std::env::remove_var("APP_SERVER_PORT");
        }
    }
}
