//! Conversation records
//!
//! A record is what a finished conversation hands to the record sink. Its
//! fields stay a JSON object so every flow can share one table; typed views
//! below read them back for rendering.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::errors::{BlueberryError, Result};

/// Values collected by a conversation, keyed by step name
pub type CollectedFields = HashMap<String, serde_json::Value>;

/// Every conversation the bot knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    Register,
    Sleep,
    #[serde(rename = "wakesleep")]
    WakeSleep,
    WakeTime,
    SleepTime,
    SetTimezone,
    Water,
    Thought,
}

impl FlowKind {
    pub const ALL: [FlowKind; 8] = [
        FlowKind::Register,
        FlowKind::Sleep,
        FlowKind::WakeSleep,
        FlowKind::WakeTime,
        FlowKind::SleepTime,
        FlowKind::SetTimezone,
        FlowKind::Water,
        FlowKind::Thought,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::Register => "register",
            FlowKind::Sleep => "sleep",
            FlowKind::WakeSleep => "wakesleep",
            FlowKind::WakeTime => "wake_time",
            FlowKind::SleepTime => "sleep_time",
            FlowKind::SetTimezone => "set_timezone",
            FlowKind::Water => "water",
            FlowKind::Thought => "thought",
        }
    }

    /// Flows whose records are sleep logs
    pub fn sleep_logs() -> &'static [FlowKind] {
        &[FlowKind::Sleep, FlowKind::WakeSleep]
    }

    /// Whether completed records are shown in the user's local time
    pub fn is_daily_log(&self) -> bool {
        matches!(self, FlowKind::Sleep | FlowKind::WakeSleep | FlowKind::Water | FlowKind::Thought)
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowKind {
    type Err = BlueberryError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        FlowKind::ALL
            .iter()
            .copied()
            .find(|flow| flow.as_str() == s)
            .ok_or_else(|| BlueberryError::UnknownFlow(s.to_string()))
    }
}

/// A finished, validated conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub user_id: i64,
    pub flow: FlowKind,
    pub fields: CollectedFields,
    /// When the conversation completed
    pub event_time: DateTime<Utc>,
}

impl Record {
    pub fn new(user_id: i64, flow: FlowKind, fields: CollectedFields, event_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            flow,
            fields,
            event_time,
        }
    }

    /// Deserialize the collected fields into a typed view
    pub fn fields_as<T: DeserializeOwned>(&self) -> Result<T> {
        let object: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(serde_json::from_value(serde_json::Value::Object(object))?)
    }
}

/// Row of the `conversation_records` table
#[derive(Debug, Clone, FromRow)]
pub struct RecordRow {
    pub id: Uuid,
    pub user_id: i64,
    pub flow: String,
    pub fields: Json<CollectedFields>,
    pub event_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<RecordRow> for Record {
    type Error = BlueberryError;

    fn try_from(row: RecordRow) -> Result<Self> {
        Ok(Record {
            id: row.id,
            user_id: row.user_id,
            flow: row.flow.parse()?,
            fields: row.fields.0,
            event_time: row.event_time,
        })
    }
}

/// An hour and minute on the wall clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockTime {
    pub hour: u32,
    pub minute: u32,
}

impl ClockTime {
    pub fn as_pair(&self) -> (u32, u32) {
        (self.hour, self.minute)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct QuickSleepFields {
    hour_range: [u32; 2],
    minute: u32,
    #[serde(default)]
    notes: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct SleepCycleFields {
    wake: ClockTime,
    sleep: ClockTime,
    #[serde(default)]
    notes: String,
}

/// Sleep entry read back from a `sleep` or `wakesleep` record
#[derive(Debug, Clone, PartialEq)]
pub enum SleepLog {
    /// Fell asleep somewhere in an hour range, at the given minute
    Quick {
        hour_range: (u32, u32),
        minute: u32,
        notes: String,
    },
    /// Full cycle with bedtime and wake-up
    Cycle {
        sleep: ClockTime,
        wake: ClockTime,
        notes: String,
    },
}

impl SleepLog {
    pub fn from_record(record: &Record) -> Result<Self> {
        match record.flow {
            FlowKind::Sleep => {
                let f: QuickSleepFields = record.fields_as()?;
                Ok(SleepLog::Quick {
                    hour_range: (f.hour_range[0], f.hour_range[1]),
                    minute: f.minute,
                    notes: f.notes,
                })
            }
            FlowKind::WakeSleep => {
                let f: SleepCycleFields = record.fields_as()?;
                Ok(SleepLog::Cycle {
                    sleep: f.sleep,
                    wake: f.wake,
                    notes: f.notes,
                })
            }
            other => Err(BlueberryError::InvalidInput(format!("{} records are not sleep logs", other))),
        }
    }

    pub fn notes(&self) -> &str {
        match self {
            SleepLog::Quick { notes, .. } | SleepLog::Cycle { notes, .. } => notes,
        }
    }
}

/// Day a log refers to, relative to when it was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogDay {
    Today,
    Yesterday,
}

impl LogDay {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "today" | "t" => Some(LogDay::Today),
            "yesterday" | "y" => Some(LogDay::Yesterday),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogDay::Today => "today",
            LogDay::Yesterday => "yesterday",
        }
    }

    /// Calendar date this day stands for, seen from `today`
    pub fn date(&self, today: NaiveDate) -> NaiveDate {
        match self {
            LogDay::Today => today,
            LogDay::Yesterday => today - Duration::days(1),
        }
    }
}

/// Water intake read back from a `water` record
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WaterIntake {
    pub day: LogDay,
    pub hour: u32,
    pub minute: u32,
    pub amount_ml: u32,
    #[serde(default)]
    pub notes: String,
}

impl WaterIntake {
    pub fn from_record(record: &Record) -> Result<Self> {
        match record.flow {
            FlowKind::Water => record.fields_as(),
            other => Err(BlueberryError::InvalidInput(format!("{} records are not water logs", other))),
        }
    }

    /// Local date the water was drunk on. `day` is relative to when the
    /// record was completed, in the user's offset.
    pub fn drunk_on(&self, event_time: DateTime<Utc>, offset: &FixedOffset) -> NaiveDate {
        let today = offset.from_utc_datetime(&event_time.naive_utc()).date_naive();
        self.day.date(today)
    }
}

/// Journal entry collected by the `thought` flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub content: String,
}

/// Profile details collected by the `register` flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
}

/// Choice collected by the `set_timezone` flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimezoneSelection {
    pub country: String,
    pub timezone_name: String,
    pub timezone_offset: String,
    pub effective_from: String,
}
