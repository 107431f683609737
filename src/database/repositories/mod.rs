//! Database repositories module
//! 
//! This module contains all repository implementations for data access

pub mod user;
pub mod timezone;
pub mod record;

// Re-export repositories
pub use user::UserRepository;
pub use timezone::TimezoneRepository;
pub use record::RecordRepository;
