//! Application settings management
//!
//! This module defines the configuration structure and provides methods
//! for loading settings from TOML files and environment variables.

use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Main application configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub bot: BotConfig,
    pub database: DatabaseConfig,
    pub conversation: ConversationConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Telegram bot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotConfig {
    pub token: String,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Conversation timeouts and display limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversationConfig {
    pub register_timeout_secs: u64,
    pub sleep_timeout_secs: u64,
    pub timezone_timeout_secs: u64,
    pub water_timeout_secs: u64,
    pub thought_timeout_secs: u64,
    /// How often abandoned sessions are swept
    pub sweep_interval_secs: u64,
    /// Records shown by history commands
    pub history_limit: usize,
}

impl ConversationConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Rate limiting for conversation start commands
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    pub register_max_calls: u32,
    pub register_period_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory receiving the daily rolling log files
    pub directory: String,
    pub json: bool,
}

impl Settings {
    /// Load settings from defaults, an optional `config` file and environment variables
    pub fn new() -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("BLUEBERRY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), crate::utils::errors::BlueberryError> {
        super::validation::validate_settings(self)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                token: String::new(),
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/blueberry".to_string(),
                max_connections: 10,
                min_connections: 1,
            },
            conversation: ConversationConfig {
                register_timeout_secs: 60,
                sleep_timeout_secs: 600,
                timezone_timeout_secs: 300,
                water_timeout_secs: 600,
                thought_timeout_secs: 300,
                sweep_interval_secs: 60,
                history_limit: 5,
            },
            rate_limit: RateLimitConfig {
                register_max_calls: 3,
                register_period_secs: 60,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                directory: "logs".to_string(),
                json: false,
            },
        }
    }
}
