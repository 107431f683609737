//! Message handlers module
//!
//! Plain text in a private chat answers the current conversation step.
//! Start commands that teloxide did not parse (other casing, another bot's
//! mention) land here too and go through the start checks.

use std::sync::Arc;
use teloxide::{Bot, types::Message};
use tracing::debug;

use crate::handlers::commands::flows::{converse, handle_flow_command};
use crate::state::AppContext;
use crate::utils::errors::Result;

/// Handle incoming text messages
pub async fn handle_message(bot: Bot, msg: Message, ctx: Arc<AppContext>) -> Result<()> {
    let user_id = msg.chat.id.0;
    if let Some(flow) = msg.text().and_then(|text| ctx.engine.started_flow(text)) {
        debug!(user_id = user_id, flow = %flow, "Start command outside the command parser");
        return handle_flow_command(bot, msg, flow, ctx).await;
    }

    debug!(user_id = user_id, "Processing message");
    converse(bot, msg, ctx).await
}
