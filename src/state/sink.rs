//! Record sink
//!
//! The conversation engine hands finished records to a [`RecordSink`] and
//! never talks to a concrete store. `DatabaseService` is the production sink,
//! [`MemoryRecordSink`] keeps records in process.

use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::record::{FlowKind, Record, Registration};
use crate::utils::errors::{BlueberryError, Result};

/// Outcome of a successful save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    Stored,
    /// A record with the same id was already stored, nothing changed
    AlreadyStored,
}

/// Persistence boundary of the conversation engine
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persist a finished record. Saving the same record id twice is a no-op.
    async fn save(&self, record: &Record) -> Result<SaveResult>;

    /// At most `limit` records of a user, newest event first
    async fn list_recent(&self, user_id: i64, limit: usize) -> Result<Vec<Record>>;

    /// Like `list_recent`, restricted to records of the given flows
    async fn list_recent_of(&self, user_id: i64, flows: &[FlowKind], limit: usize) -> Result<Vec<Record>>;
}

/// In-process sink. `register` records are unique per user and per email,
/// like the `users` table enforces.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordSink {
    records: Arc<RwLock<Vec<Record>>>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Every stored record in insertion order
    pub async fn all(&self) -> Vec<Record> {
        self.records.read().await.clone()
    }

    fn email_taken(records: &[Record], record: &Record) -> bool {
        let Ok(candidate) = record.fields_as::<Registration>() else {
            return false;
        };
        records
            .iter()
            .filter(|r| r.flow == FlowKind::Register)
            .filter_map(|r| r.fields_as::<Registration>().ok())
            .any(|existing| existing.email == candidate.email)
    }

    fn newest_first(mut records: Vec<Record>, limit: usize) -> Vec<Record> {
        records.sort_by(|a, b| b.event_time.cmp(&a.event_time));
        records.truncate(limit);
        records
    }
}

#[async_trait]
impl RecordSink for MemoryRecordSink {
    async fn save(&self, record: &Record) -> Result<SaveResult> {
        let mut records = self.records.write().await;

        if records.iter().any(|r| r.id == record.id) {
            return Ok(SaveResult::AlreadyStored);
        }

        if record.flow == FlowKind::Register {
            if records.iter().any(|r| r.flow == FlowKind::Register && r.user_id == record.user_id) {
                return Err(BlueberryError::AlreadyRegistered { user_id: record.user_id });
            }
            if Self::email_taken(&records, record) {
                return Err(BlueberryError::FieldConflict {
                    field: "email".to_string(),
                    reason: "This email is already registered".to_string(),
                });
            }
        }

        records.push(record.clone());
        Ok(SaveResult::Stored)
    }

    async fn list_recent(&self, user_id: i64, limit: usize) -> Result<Vec<Record>> {
        let records = self.records.read().await;
        let mine = records.iter().filter(|r| r.user_id == user_id).cloned().collect();
        Ok(Self::newest_first(mine, limit))
    }

    async fn list_recent_of(&self, user_id: i64, flows: &[FlowKind], limit: usize) -> Result<Vec<Record>> {
        let records = self.records.read().await;
        let mine = records
            .iter()
            .filter(|r| r.user_id == user_id && flows.contains(&r.flow))
            .cloned()
            .collect();
        Ok(Self::newest_first(mine, limit))
    }
}
