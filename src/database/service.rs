//! Database service layer
//!
//! This module provides a high-level interface to database operations and
//! the Postgres implementation of the record sink.

use std::time::Instant;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgConnection;
use tracing::{debug, warn};

use crate::database::{DatabasePool, UserRepository, TimezoneRepository, RecordRepository};
use crate::database::repositories::{record::insert_record, timezone::insert_timezone, user::insert_user};
use crate::models::*;
use crate::state::sink::{RecordSink, SaveResult};
use crate::utils::errors::{BlueberryError, Result};
use crate::utils::logging::log_database_operation;

#[derive(Debug, Clone)]
pub struct DatabaseService {
    pool: DatabasePool,
    pub users: UserRepository,
    pub timezones: TimezoneRepository,
    pub records: RecordRepository,
}

impl DatabaseService {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            timezones: TimezoneRepository::new(pool.clone()),
            records: RecordRepository::new(pool.clone()),
            pool,
        }
    }

    async fn save_in(conn: &mut PgConnection, record: &Record) -> Result<SaveResult> {
        if !insert_record(&mut *conn, record).await? {
            return Ok(SaveResult::AlreadyStored);
        }
        Self::project(conn, record).await?;
        Ok(SaveResult::Stored)
    }

    /// Write the domain rows a freshly stored record stands for
    async fn project(conn: &mut PgConnection, record: &Record) -> Result<()> {
        match record.flow {
            FlowKind::Register => {
                let registration: Registration = record.fields_as()?;
                let request = CreateUserRequest {
                    telegram_id: record.user_id,
                    tg_username: None,
                    name: registration.name,
                    email: registration.email,
                };
                insert_user(&mut *conn, &request)
                    .await
                    .map_err(|e| registration_conflict(e, record.user_id))?;
            }
            FlowKind::SetTimezone => {
                let selection: TimezoneSelection = record.fields_as()?;
                let effective_from = EffectiveFrom::parse(&selection.effective_from)
                    .ok_or_else(|| BlueberryError::InvalidInput(
                        format!("Unknown effective date: {}", selection.effective_from)
                    ))?;

                let registered_on: Option<(chrono::DateTime<Utc>,)> =
                    sqlx::query_as("SELECT created_at FROM users WHERE telegram_id = $1")
                        .bind(record.user_id)
                        .fetch_optional(&mut *conn)
                        .await?;
                let (created_at,) = registered_on
                    .ok_or(BlueberryError::UserNotFound { user_id: record.user_id })?;

                let request = CreateTimezoneRequest {
                    telegram_id: record.user_id,
                    timezone_name: selection.timezone_name,
                    timezone_offset: selection.timezone_offset,
                    effective_from: effective_from.resolve(
                        record.event_time.date_naive(),
                        Some(created_at.date_naive()),
                    ),
                };
                insert_timezone(&mut *conn, &request).await?;
            }
            FlowKind::Sleep
            | FlowKind::WakeSleep
            | FlowKind::WakeTime
            | FlowKind::SleepTime
            | FlowKind::Water
            | FlowKind::Thought => {}
        }

        Ok(())
    }
}

/// Name the `users` unique constraint a failed insert violated
fn violated_constraint(err: &BlueberryError) -> Option<&str> {
    match err {
        BlueberryError::Database(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            db_err.constraint()
        }
        _ => None,
    }
}

/// A taken email is asked again. A taken Telegram id can never be stored.
fn registration_conflict(err: BlueberryError, user_id: i64) -> BlueberryError {
    let constraint = violated_constraint(&err).map(str::to_owned);
    match constraint.as_deref() {
        Some("users_email_key") => BlueberryError::FieldConflict {
            field: "email".to_string(),
            reason: "This email is already registered".to_string(),
        },
        Some("users_telegram_id_key") => BlueberryError::AlreadyRegistered { user_id },
        _ => err,
    }
}

#[async_trait]
impl RecordSink for DatabaseService {
    async fn save(&self, record: &Record) -> Result<SaveResult> {
        let started = Instant::now();
        let mut tx = self.pool.begin().await?;

        let outcome = Self::save_in(&mut tx, record).await;

        let elapsed = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(result) => {
                tx.commit()
                    .await
                    .map_err(|e| BlueberryError::Persistence(format!("commit of record {} failed: {}", record.id, e)))?;
                log_database_operation("save", "conversation_records", elapsed, true);
                debug!(record_id = %record.id, user_id = record.user_id, flow = %record.flow, ?result, "Record saved");
                Ok(result)
            }
            Err(e) => {
                tx.rollback().await?;
                log_database_operation("save", "conversation_records", elapsed, false);
                warn!(record_id = %record.id, user_id = record.user_id, flow = %record.flow, error = %e, "Record save rolled back");
                Err(e)
            }
        }
    }

    async fn list_recent(&self, user_id: i64, limit: usize) -> Result<Vec<Record>> {
        self.records.list_recent(user_id, limit as i64).await
    }

    async fn list_recent_of(&self, user_id: i64, flows: &[FlowKind], limit: usize) -> Result<Vec<Record>> {
        self.records.list_recent_of(user_id, flows, limit as i64).await
    }
}
