//! Data models module
//!
//! This module contains all data structures used throughout the application

pub mod user;
pub mod timezone;
pub mod record;

// Re-export commonly used models
pub use user::{User, CreateUserRequest};
pub use timezone::{UserTimezone, CreateTimezoneRequest, Country, TimezoneOption, EffectiveFrom, TIMEZONES, find_timezone};
pub use record::{
    FlowKind, CollectedFields, Record, RecordRow, ClockTime, SleepLog, Registration, TimezoneSelection, LogDay,
    WaterIntake, JournalEntry,
};
