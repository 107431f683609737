//! Conversation record repository implementation

use sqlx::{Executor, PgPool, Postgres};
use sqlx::types::Json;
use crate::models::record::{FlowKind, Record, RecordRow};
use crate::utils::errors::BlueberryError;

const RECORD_COLUMNS: &str = "id, user_id, flow, fields, event_time, created_at";

#[derive(Clone, Debug)]
pub struct RecordRepository {
    pool: PgPool,
}

impl RecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Latest records of a user, newest first
    pub async fn list_recent(&self, user_id: i64, limit: i64) -> Result<Vec<Record>, BlueberryError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            &format!(
                "SELECT {} FROM conversation_records WHERE user_id = $1 \
                 ORDER BY event_time DESC LIMIT $2",
                RECORD_COLUMNS
            )
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Record::try_from).collect()
    }

    /// Latest records of a user restricted to some flows, newest first
    pub async fn list_recent_of(&self, user_id: i64, flows: &[FlowKind], limit: i64) -> Result<Vec<Record>, BlueberryError> {
        let flows: Vec<String> = flows.iter().map(|f| f.as_str().to_string()).collect();
        let rows = sqlx::query_as::<_, RecordRow>(
            &format!(
                "SELECT {} FROM conversation_records WHERE user_id = $1 AND flow = ANY($2) \
                 ORDER BY event_time DESC LIMIT $3",
                RECORD_COLUMNS
            )
        )
        .bind(user_id)
        .bind(flows)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Record::try_from).collect()
    }
}

/// Insert a record through any executor. Returns false when a record with
/// the same id was already stored.
pub async fn insert_record<'e, E>(executor: E, record: &Record) -> Result<bool, BlueberryError>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO conversation_records (id, user_id, flow, fields, event_time)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO NOTHING
        "#
    )
    .bind(record.id)
    .bind(record.user_id)
    .bind(record.flow.as_str())
    .bind(Json(&record.fields))
    .bind(record.event_time)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}
