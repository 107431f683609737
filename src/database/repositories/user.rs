//! User repository implementation

use sqlx::{Executor, PgPool, Postgres};
use chrono::Utc;
use crate::models::user::{User, CreateUserRequest};
use crate::utils::errors::BlueberryError;

const USER_COLUMNS: &str = "id, telegram_id, tg_username, name, email, created_at, updated_at";

#[derive(Clone)]
#[derive(Debug)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new user
    pub async fn create(&self, request: CreateUserRequest) -> Result<User, BlueberryError> {
        insert_user(&self.pool, &request).await
    }

    /// Find user by Telegram ID
    pub async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>, BlueberryError> {
        let user = sqlx::query_as::<_, User>(
            &format!("SELECT {} FROM users WHERE telegram_id = $1", USER_COLUMNS)
        )
        .bind(telegram_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Store the Telegram username seen when the user registered
    pub async fn update_username(&self, telegram_id: i64, tg_username: Option<&str>) -> Result<(), BlueberryError> {
        sqlx::query("UPDATE users SET tg_username = $2, updated_at = $3 WHERE telegram_id = $1")
            .bind(telegram_id)
            .bind(tg_username)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Insert a user through any executor, so it can run inside a transaction
pub async fn insert_user<'e, E>(executor: E, request: &CreateUserRequest) -> Result<User, BlueberryError>
where
    E: Executor<'e, Database = Postgres>,
{
    let now = Utc::now();
    let user = sqlx::query_as::<_, User>(
        &format!(
            r#"
            INSERT INTO users (telegram_id, tg_username, name, email, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            USER_COLUMNS
        )
    )
    .bind(request.telegram_id)
    .bind(&request.tg_username)
    .bind(&request.name)
    .bind(request.email.to_lowercase())
    .bind(now)
    .bind(now)
    .fetch_one(executor)
    .await?;

    Ok(user)
}
