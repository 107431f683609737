//! Error handling for Blueberry
//!
//! This module defines the main error type used throughout the application
//! and provides a unified error handling strategy.

use thiserror::Error;

/// Main error type for Blueberry application
#[derive(Error, Debug)]
pub enum BlueberryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Telegram API error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration loading error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("User not found: {user_id}")]
    UserNotFound { user_id: i64 },

    #[error("This Telegram account is already registered")]
    AlreadyRegistered { user_id: i64 },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Unknown flow: {0}")]
    UnknownFlow(String),

    #[error("Unknown step {step} in flow {flow}")]
    UnknownStep { flow: String, step: String },

    /// A record sink refused one of the collected values
    #[error("Conflicting value for {field}: {reason}")]
    FieldConflict { field: String, reason: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for Blueberry operations
pub type Result<T> = std::result::Result<T, BlueberryError>;

impl BlueberryError {
    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            BlueberryError::Database(_) => true,
            BlueberryError::Migration(_) => false,
            BlueberryError::Telegram(_) => true,
            BlueberryError::Config(_) => false,
            BlueberryError::ConfigLoad(_) => false,
            BlueberryError::UserNotFound { .. } => false,
            BlueberryError::AlreadyRegistered { .. } => false,
            BlueberryError::InvalidStateTransition { .. } => false,
            BlueberryError::UnknownFlow(_) => false,
            BlueberryError::UnknownStep { .. } => false,
            BlueberryError::FieldConflict { .. } => true,
            BlueberryError::Persistence(_) => true,
            BlueberryError::Serialization(_) => false,
            BlueberryError::Io(_) => true,
            BlueberryError::RateLimitExceeded => true,
            BlueberryError::InvalidInput(_) => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            BlueberryError::Migration(_) => ErrorSeverity::Critical,
            BlueberryError::Config(_) => ErrorSeverity::Critical,
            BlueberryError::ConfigLoad(_) => ErrorSeverity::Critical,
            BlueberryError::RateLimitExceeded => ErrorSeverity::Warning,
            BlueberryError::FieldConflict { .. } => ErrorSeverity::Info,
            BlueberryError::InvalidInput(_) => ErrorSeverity::Info,
            BlueberryError::UserNotFound { .. } => ErrorSeverity::Info,
            BlueberryError::AlreadyRegistered { .. } => ErrorSeverity::Info,
            BlueberryError::Persistence(_) => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_conflict_is_recoverable() {
        let err = BlueberryError::FieldConflict {
            field: "email".to_string(),
            reason: "already registered".to_string(),
        };
        assert!(err.is_recoverable());
        assert_eq!(err.severity(), ErrorSeverity::Info);
        assert_eq!(err.to_string(), "Conflicting value for email: already registered");
    }

    #[test]
    fn test_config_errors_are_critical() {
        let err = BlueberryError::Config("Bot token is required".to_string());
        assert!(!err.is_recoverable());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.severity().to_string(), "CRITICAL");
    }

    #[test]
    fn test_store_failures_are_retried_but_missing_rows_are_not() {
        assert!(BlueberryError::Persistence("commit failed".to_string()).is_recoverable());
        assert!(!BlueberryError::AlreadyRegistered { user_id: 7 }.is_recoverable());
        assert!(!BlueberryError::UserNotFound { user_id: 7 }.is_recoverable());
    }
}
