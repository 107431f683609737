//! Services module
//!
//! This module contains business logic services

pub mod user;

// Re-export commonly used services
pub use user::{UserService, UserStatus, Unmet};
