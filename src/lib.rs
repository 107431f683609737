//! Blueberry Telegram Bot
//!
//! A Telegram bot for personal wellness tracking. Users register, choose a
//! timezone and log their sleep through short guided conversations.
//! This library provides the conversation engine, its flows, persistence of
//! finished conversations and the Telegram handlers driving them.

pub mod config;
pub mod handlers;
pub mod services;
pub mod models;
pub mod database;
pub mod state;
pub mod utils;
pub mod middleware;

// Re-export commonly used types
pub use config::Settings;
pub use utils::errors::{BlueberryError, Result};

// Re-export main components for easy access
pub use database::DatabaseService;
pub use state::{AppContext, ConversationEngine, EngineResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{}", NAME, VERSION)
}
