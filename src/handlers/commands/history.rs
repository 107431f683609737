//! History commands: /mysleep, /mywater, /mythoughts and /mytimezone

use std::sync::Arc;
use chrono::Utc;
use teloxide::{Bot, types::Message, prelude::*};
use tracing::debug;

use crate::handlers::replies::{self, offset_for};
use crate::models::record::FlowKind;
use crate::services::{Unmet, UserStatus};
use crate::state::AppContext;
use crate::utils::errors::Result;

/// Intakes listed by /mywater
const WATER_SHOWN: usize = 10;
/// Intakes loaded to add up today's total
const WATER_SCANNED: usize = 100;

/// The user's status, or `None` after telling them to register
async fn registered_status(bot: &Bot, msg: &Message, ctx: &AppContext) -> Result<Option<UserStatus>> {
    let status = ctx.user_service.status(msg.chat.id.0).await?;
    if !status.is_registered() {
        bot.send_message(msg.chat.id, replies::render_unmet(&Unmet::Registration)).await?;
        return Ok(None);
    }
    Ok(Some(status))
}

/// Handle /mysleep: the latest sleep logs in the user's current timezone
pub async fn handle_my_sleep(bot: Bot, msg: Message, ctx: Arc<AppContext>) -> Result<()> {
    let user_id = msg.chat.id.0;
    let Some(status) = registered_status(&bot, &msg, &ctx).await? else {
        return Ok(());
    };

    let records = ctx
        .engine
        .sink()
        .list_recent_of(user_id, FlowKind::sleep_logs(), ctx.history_limit())
        .await?;
    debug!(user_id = user_id, count = records.len(), "Loaded sleep history");

    let text = replies::render_sleep_history(&records, &offset_for(status.timezone.as_ref()));
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Handle /mywater: today's total and the latest intakes
pub async fn handle_my_water(bot: Bot, msg: Message, ctx: Arc<AppContext>) -> Result<()> {
    let user_id = msg.chat.id.0;
    let Some(status) = registered_status(&bot, &msg, &ctx).await? else {
        return Ok(());
    };

    let records = ctx
        .engine
        .sink()
        .list_recent_of(user_id, &[FlowKind::Water], WATER_SCANNED)
        .await?;
    debug!(user_id = user_id, count = records.len(), "Loaded water history");

    let offset = offset_for(status.timezone.as_ref());
    let text = replies::render_water_history(&records, &offset, Utc::now(), WATER_SHOWN);
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Handle /mythoughts: the latest journal entries
pub async fn handle_my_thoughts(bot: Bot, msg: Message, ctx: Arc<AppContext>) -> Result<()> {
    let user_id = msg.chat.id.0;
    let Some(status) = registered_status(&bot, &msg, &ctx).await? else {
        return Ok(());
    };

    let records = ctx
        .engine
        .sink()
        .list_recent_of(user_id, &[FlowKind::Thought], ctx.history_limit())
        .await?;
    debug!(user_id = user_id, count = records.len(), "Loaded journal");

    let text = replies::render_thoughts(&records, &offset_for(status.timezone.as_ref()));
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Handle /mytimezone: current timezone and earlier changes
pub async fn handle_my_timezone(bot: Bot, msg: Message, ctx: Arc<AppContext>) -> Result<()> {
    let user_id = msg.chat.id.0;
    let history = ctx.user_service.timezone_history(user_id, ctx.history_limit()).await?;
    bot.send_message(msg.chat.id, replies::render_timezones(&history)).await?;
    Ok(())
}
