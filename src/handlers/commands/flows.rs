//! Conversation commands
//!
//! Bridges Telegram messages to the conversation engine. Every start command
//! passes [`admit`] first, however it reached the bot; everything else goes
//! straight to the engine.

use std::sync::Arc;
use teloxide::{Bot, types::Message, prelude::*};
use tracing::{debug, error, info, warn};

use crate::handlers::replies::{self, offset_for};
use crate::middleware::RateLimitMiddleware;
use crate::models::record::FlowKind;
use crate::services::{Unmet, UserStatus};
use crate::state::{AppContext, EngineResult};
use crate::utils::errors::Result;
use crate::utils::logging::log_user_action;

/// Why a start command was turned away
#[derive(Debug, Clone)]
pub enum Refusal {
    Unmet(Unmet),
    RateLimited,
}

impl Refusal {
    pub fn reply(&self) -> String {
        match self {
            Refusal::Unmet(unmet) => replies::render_unmet(unmet),
            Refusal::RateLimited => replies::RATE_LIMITED.to_string(),
        }
    }
}

/// Decide whether `flow` may start. Resuming the running flow skips the
/// checks, they passed when it started.
pub fn admit(
    status: &UserStatus,
    limiter: &RateLimitMiddleware,
    user_id: i64,
    flow: FlowKind,
    resuming: bool,
) -> std::result::Result<(), Refusal> {
    if resuming {
        return Ok(());
    }

    status.check(flow).map_err(Refusal::Unmet)?;

    if flow == FlowKind::Register && limiter.check_rate_limit(user_id).is_err() {
        return Err(Refusal::RateLimited);
    }
    Ok(())
}

/// Start (or resume) the flow a command names
pub async fn handle_flow_command(bot: Bot, msg: Message, flow: FlowKind, ctx: Arc<AppContext>) -> Result<()> {
    let user_id = msg.chat.id.0;

    let resuming = ctx
        .engine
        .active_session(user_id)
        .await
        .is_some_and(|s| s.root_flow() == flow);
    let status = if resuming {
        UserStatus::default()
    } else {
        ctx.user_service.status(user_id).await?
    };

    if let Err(refusal) = admit(&status, &ctx.register_limiter, user_id, flow, resuming) {
        debug!(user_id = user_id, flow = %flow, ?refusal, "Flow start refused");
        bot.send_message(msg.chat.id, refusal.reply()).await?;
        return Ok(());
    }

    log_user_action(user_id, "start_flow", Some(flow.as_str()));
    converse(bot, msg, ctx).await
}

/// Handle /cancel
pub async fn handle_cancel(bot: Bot, msg: Message, ctx: Arc<AppContext>) -> Result<()> {
    let result = ctx.engine.handle_message(msg.chat.id.0, "/cancel").await?;
    let text = match result {
        EngineResult::NoOp => replies::NOTHING_TO_CANCEL.to_string(),
        other => replies::render_result(&other, &offset_for(None)).unwrap_or_default(),
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Commands with no handler of their own are answers to the current step
pub async fn forward_to_conversation(bot: Bot, msg: Message, ctx: Arc<AppContext>) -> Result<()> {
    converse(bot, msg, ctx).await
}

/// Pass the message text to the engine and send its reply
pub async fn converse(bot: Bot, msg: Message, ctx: Arc<AppContext>) -> Result<()> {
    let user_id = msg.chat.id.0;
    let Some(text) = msg.text() else {
        debug!(user_id = user_id, "Ignoring message without text");
        return Ok(());
    };

    let result = match ctx.engine.handle_message(user_id, text).await {
        Ok(result) => result,
        Err(e) => {
            error!(user_id = user_id, error = %e, "Conversation engine failed");
            bot.send_message(msg.chat.id, replies::SOMETHING_WENT_WRONG).await?;
            return Err(e);
        }
    };

    let offset = match &result {
        EngineResult::Completed(record) if record.flow.is_daily_log() => {
            let timezone = ctx.user_service.current_timezone(user_id).await?;
            offset_for(timezone.as_ref())
        }
        _ => offset_for(None),
    };

    if let EngineResult::Completed(record) = &result {
        if record.flow == FlowKind::Register {
            let username = msg.from.as_ref().and_then(|u| u.username.as_deref());
            if let Err(e) = ctx.user_service.record_username(user_id, username).await {
                warn!(user_id = user_id, error = %e, "Failed to store Telegram username");
            }
            info!(user_id = user_id, "User registered");
        }
    }

    let reply = match result {
        EngineResult::NoOp => replies::NO_CONVERSATION.to_string(),
        other => replies::render_result(&other, &offset).unwrap_or_default(),
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use std::time::Duration;
    use crate::models::{User, UserTimezone};

    fn limiter() -> RateLimitMiddleware {
        RateLimitMiddleware::new("register", 3, Duration::from_secs(60)).unwrap()
    }

    fn registered(with_timezone: bool) -> UserStatus {
        let user = User {
            id: 1,
            telegram_id: 7,
            tg_username: None,
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let timezone = with_timezone.then(|| UserTimezone {
            id: 1,
            telegram_id: 7,
            timezone_name: "Europe/London".to_string(),
            timezone_offset: "+0:00".to_string(),
            effective_from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            created_at: Utc::now(),
        });
        UserStatus { user: Some(user), timezone }
    }

    #[test]
    fn test_registered_user_cannot_register_again() {
        let refusal = admit(&registered(true), &limiter(), 7, FlowKind::Register, false).unwrap_err();
        assert!(matches!(refusal, Refusal::Unmet(Unmet::AlreadyRegistered(_))));
        assert!(refusal.reply().contains("already registered"));
    }

    #[test]
    fn test_register_is_rate_limited() {
        let limiter = limiter();
        let status = UserStatus::default();
        for _ in 0..3 {
            assert!(admit(&status, &limiter, 7, FlowKind::Register, false).is_ok());
        }
        let refusal = admit(&status, &limiter, 7, FlowKind::Register, false).unwrap_err();
        assert!(matches!(refusal, Refusal::RateLimited));
        assert!(admit(&status, &limiter, 8, FlowKind::Register, false).is_ok());
    }

    #[test]
    fn test_logs_need_registration_and_timezone() {
        let limiter = limiter();
        assert!(matches!(
            admit(&UserStatus::default(), &limiter, 7, FlowKind::Water, false),
            Err(Refusal::Unmet(Unmet::Registration))
        ));
        assert!(matches!(
            admit(&registered(false), &limiter, 7, FlowKind::Sleep, false),
            Err(Refusal::Unmet(Unmet::Timezone))
        ));
        assert!(admit(&registered(false), &limiter, 7, FlowKind::Thought, false).is_ok());
        assert!(admit(&registered(true), &limiter, 7, FlowKind::WakeSleep, false).is_ok());
    }

    #[test]
    fn test_resuming_skips_checks() {
        let limiter = limiter();
        for _ in 0..5 {
            assert!(admit(&UserStatus::default(), &limiter, 7, FlowKind::Sleep, true).is_ok());
        }
    }
}
