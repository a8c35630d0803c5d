use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{error, info};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Sync relay (WebSocket) port
    #[serde(default = "default_port")]
    pub port: u16,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds an empty room is kept alive before teardown
    #[serde(default = "default_room_grace_secs")]
    pub room_grace_secs: u64,

    /// Payload size above which sync frames are compressed
    #[serde(default = "default_compress_threshold")]
    pub compress_threshold: usize,

    /// Seconds between autosave passes over dirty rooms
    #[serde(default = "default_save_interval_secs")]
    pub save_interval_secs: u64,

    /// JWT secret key for the HTTP API
    pub auth_jwt_secret: Option<String>,

    /// Database URL
    pub db_url: Option<String>,
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Install the loaded configuration as the process-wide instance.
pub fn init_config(config: Config) {
    let _ = CONFIG.set(config);
}

/// Get the process-wide configuration instance.
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(Config::default)
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Load from environment variables using envy
        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Address of the sync relay listener
    pub fn relay_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Address of the HTTP API listener
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }

    pub fn room_grace(&self) -> Duration {
        Duration::from_secs(self.room_grace_secs)
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            http_port: default_http_port(),
            environment: default_environment(),
            cors_origins: None,
            log_level: default_log_level(),
            room_grace_secs: default_room_grace_secs(),
            compress_threshold: default_compress_threshold(),
            save_interval_secs: default_save_interval_secs(),
            auth_jwt_secret: None,
            db_url: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    1234
}

fn default_http_port() -> u16 {
    4000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_room_grace_secs() -> u64 {
    30
}

fn default_compress_threshold() -> usize {
    1024
}

fn default_save_interval_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_contract() {
        let config = Config::default();
        assert_eq!(config.port, 1234);
        assert_eq!(config.room_grace_secs, 30);
        assert_eq!(config.compress_threshold, 1024);
        assert_eq!(config.save_interval_secs, 30);
    }
}
