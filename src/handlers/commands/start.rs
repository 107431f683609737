//! Start command handler

use std::sync::Arc;
use teloxide::{Bot, types::Message, prelude::*};
use tracing::info;

use crate::handlers::replies;
use crate::state::AppContext;
use crate::utils::errors::Result;
use crate::utils::logging::log_user_action;

/// Handle /start. Registered users are greeted by name.
pub async fn handle_start(bot: Bot, msg: Message, ctx: Arc<AppContext>) -> Result<()> {
    let user_id = msg.chat.id.0;
    info!(user_id = user_id, "Start command received");
    log_user_action(user_id, "start", None);

    let text = match ctx.user_service.get_user(user_id).await? {
        Some(user) => format!("Welcome back, {}!\n\n{}", user.name, replies::WELCOME),
        None => replies::WELCOME.to_string(),
    };

    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}
