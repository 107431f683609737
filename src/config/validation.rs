//! Configuration validation module
//!
//! This module provides validation functions for application configuration
//! to ensure all required settings are properly configured.

use crate::utils::errors::{BlueberryError, Result};
use super::Settings;

/// Validate all configuration settings
pub fn validate_settings(settings: &Settings) -> Result<()> {
    validate_bot_config(&settings.bot)?;
    validate_database_config(&settings.database)?;
    validate_conversation_config(&settings.conversation)?;
    validate_rate_limit_config(&settings.rate_limit)?;
    validate_logging_config(&settings.logging)?;

    Ok(())
}

/// Validate bot configuration
fn validate_bot_config(config: &super::BotConfig) -> Result<()> {
    if config.token.trim().is_empty() {
        return Err(BlueberryError::Config(
            "Bot token is required".to_string()
        ));
    }

    Ok(())
}

/// Validate database configuration
fn validate_database_config(config: &super::DatabaseConfig) -> Result<()> {
    if config.url.is_empty() {
        return Err(BlueberryError::Config(
            "Database URL is required".to_string()
        ));
    }

    if config.max_connections == 0 {
        return Err(BlueberryError::Config(
            "Max connections must be greater than 0".to_string()
        ));
    }

    if config.min_connections > config.max_connections {
        return Err(BlueberryError::Config(
            "Min connections cannot be greater than max connections".to_string()
        ));
    }

    Ok(())
}

/// Validate conversation timeouts and limits
fn validate_conversation_config(config: &super::ConversationConfig) -> Result<()> {
    let timeouts = [
        ("register", config.register_timeout_secs),
        ("sleep", config.sleep_timeout_secs),
        ("timezone", config.timezone_timeout_secs),
        ("water", config.water_timeout_secs),
        ("thought", config.thought_timeout_secs),
    ];

    for (name, secs) in timeouts {
        if secs == 0 {
            return Err(BlueberryError::Config(
                format!("The {} conversation timeout must be greater than 0", name)
            ));
        }
    }

    if config.sweep_interval_secs == 0 {
        return Err(BlueberryError::Config(
            "Sweep interval must be greater than 0".to_string()
        ));
    }

    if config.history_limit == 0 {
        return Err(BlueberryError::Config(
            "History limit must be greater than 0".to_string()
        ));
    }

    Ok(())
}

/// Validate rate limit configuration
fn validate_rate_limit_config(config: &super::RateLimitConfig) -> Result<()> {
    if config.register_max_calls == 0 || config.register_period_secs == 0 {
        return Err(BlueberryError::Config(
            "Registration rate limit needs a non-zero call count and period".to_string()
        ));
    }

    Ok(())
}

/// Validate logging configuration
fn validate_logging_config(config: &super::LoggingConfig) -> Result<()> {
    if config.level.is_empty() {
        return Err(BlueberryError::Config(
            "Log level is required".to_string()
        ));
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.level.as_str()) {
        return Err(BlueberryError::Config(
            format!("Invalid log level: {}. Valid levels: {:?}", config.level, valid_levels)
        ));
    }

    Ok(())
}
