//! User service implementation
//!
//! This service answers the questions handlers ask about a user before a
//! conversation starts: are they registered, which timezone applies.

use tracing::{debug, info};
use crate::database::repositories::{TimezoneRepository, UserRepository};
use crate::models::record::FlowKind;
use crate::models::timezone::UserTimezone;
use crate::models::user::User;
use crate::utils::errors::Result;

/// What is known about a user when they start a flow
#[derive(Debug, Clone, Default)]
pub struct UserStatus {
    pub user: Option<User>,
    pub timezone: Option<UserTimezone>,
}

/// A prerequisite a flow needs that the user does not meet
#[derive(Debug, Clone)]
pub enum Unmet {
    /// `/register` by someone who already is
    AlreadyRegistered(User),
    Registration,
    Timezone,
}

impl UserStatus {
    pub fn is_registered(&self) -> bool {
        self.user.is_some()
    }

    /// Check whether `flow` may start for this user
    pub fn check(&self, flow: FlowKind) -> std::result::Result<(), Unmet> {
        match flow {
            FlowKind::Register => match &self.user {
                Some(user) => Err(Unmet::AlreadyRegistered(user.clone())),
                None => Ok(()),
            },
            FlowKind::SetTimezone | FlowKind::Thought => {
                if self.is_registered() { Ok(()) } else { Err(Unmet::Registration) }
            }
            FlowKind::Sleep | FlowKind::WakeSleep | FlowKind::Water => {
                if !self.is_registered() {
                    Err(Unmet::Registration)
                } else if self.timezone.is_none() {
                    Err(Unmet::Timezone)
                } else {
                    Ok(())
                }
            }
            FlowKind::WakeTime | FlowKind::SleepTime => Ok(()),
        }
    }
}

/// User service for registration and timezone lookups
#[derive(Clone, Debug)]
pub struct UserService {
    users: UserRepository,
    timezones: TimezoneRepository,
}

impl UserService {
    /// Create a new UserService instance
    pub fn new(users: UserRepository, timezones: TimezoneRepository) -> Self {
        Self { users, timezones }
    }

    /// Get user by Telegram ID
    pub async fn get_user(&self, telegram_id: i64) -> Result<Option<User>> {
        debug!(telegram_id = telegram_id, "Getting user by Telegram ID");
        self.users.find_by_telegram_id(telegram_id).await
    }

    /// The timezone currently in effect for a user
    pub async fn current_timezone(&self, telegram_id: i64) -> Result<Option<UserTimezone>> {
        debug!(telegram_id = telegram_id, "Getting current timezone");
        self.timezones.current(telegram_id).await
    }

    /// Timezones a user has set, newest first
    pub async fn timezone_history(&self, telegram_id: i64, limit: usize) -> Result<Vec<UserTimezone>> {
        self.timezones.history(telegram_id, limit as i64).await
    }

    /// Load everything `UserStatus::check` looks at
    pub async fn status(&self, telegram_id: i64) -> Result<UserStatus> {
        let user = self.get_user(telegram_id).await?;
        let timezone = match user {
            Some(_) => self.current_timezone(telegram_id).await?,
            None => None,
        };
        Ok(UserStatus { user, timezone })
    }

    /// Remember the Telegram username of a user who just registered
    pub async fn record_username(&self, telegram_id: i64, tg_username: Option<&str>) -> Result<()> {
        self.users.update_username(telegram_id, tg_username).await?;
        info!(telegram_id = telegram_id, has_username = tg_username.is_some(), "Stored Telegram username");
        Ok(())
    }
}
