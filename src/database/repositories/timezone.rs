//! Timezone repository implementation

use sqlx::{Executor, PgPool, Postgres};
use chrono::Utc;
use crate::models::timezone::{UserTimezone, CreateTimezoneRequest};
use crate::utils::errors::BlueberryError;

const TIMEZONE_COLUMNS: &str = "id, telegram_id, timezone_name, timezone_offset, effective_from, created_at";

#[derive(Clone, Debug)]
pub struct TimezoneRepository {
    pool: PgPool,
}

impl TimezoneRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The most recent effective timezone of a user
    pub async fn current(&self, telegram_id: i64) -> Result<Option<UserTimezone>, BlueberryError> {
        let timezone = sqlx::query_as::<_, UserTimezone>(
            &format!(
                "SELECT {} FROM timezones WHERE telegram_id = $1 \
                 ORDER BY effective_from DESC, created_at DESC LIMIT 1",
                TIMEZONE_COLUMNS
            )
        )
        .bind(telegram_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(timezone)
    }

    /// Every timezone a user has set, newest first
    pub async fn history(&self, telegram_id: i64, limit: i64) -> Result<Vec<UserTimezone>, BlueberryError> {
        let timezones = sqlx::query_as::<_, UserTimezone>(
            &format!(
                "SELECT {} FROM timezones WHERE telegram_id = $1 \
                 ORDER BY effective_from DESC, created_at DESC LIMIT $2",
                TIMEZONE_COLUMNS
            )
        )
        .bind(telegram_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(timezones)
    }
}

/// Insert a timezone row through any executor
pub async fn insert_timezone<'e, E>(executor: E, request: &CreateTimezoneRequest) -> Result<UserTimezone, BlueberryError>
where
    E: Executor<'e, Database = Postgres>,
{
    let timezone = sqlx::query_as::<_, UserTimezone>(
        &format!(
            r#"
            INSERT INTO timezones (telegram_id, timezone_name, timezone_offset, effective_from, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            TIMEZONE_COLUMNS
        )
    )
    .bind(request.telegram_id)
    .bind(&request.timezone_name)
    .bind(&request.timezone_offset)
    .bind(request.effective_from)
    .bind(Utc::now())
    .fetch_one(executor)
    .await?;

    Ok(timezone)
}
