//! API configuration

use serde::{Deserialize, Serialize};

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// JWT secret for authentication
    pub jwt_secret: String,
    /// JWT expiration in seconds
    pub jwt_expiration_secs: u64,
    /// Database URL; None runs the API without persistence (tests, demos)
    pub database_url: Option<String>,
    /// Log level
    pub log_level: String,
    /// Days past the submission window during which readings are still
    /// admitted without an override
    pub grace_days: u16,
    /// Days a CLOSED cycle must age before it may be archived
    pub archive_retention_days: u32,
    /// Seconds between notification retry sweeps
    pub retry_sweep_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            jwt_secret: "change-me-in-production".to_string(),
            jwt_expiration_secs: 3600,
            database_url: None,
            log_level: "info".to_string(),
            grace_days: 3,
            archive_retention_days: 90,
            retry_sweep_secs: 60,
        }
    }
}

impl ApiConfig {
    /// Loads configuration from environment, falling back to defaults for
    /// anything unset
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::Environment::with_prefix("API"))
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
