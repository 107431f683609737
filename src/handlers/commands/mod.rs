//! Command handlers module
//!
//! This module contains handlers for all bot commands like /start, /help, etc.

pub mod start;
pub mod help;
pub mod flows;
pub mod history;

use std::sync::Arc;
use teloxide::{Bot, types::Message, utils::command::BotCommands};
use crate::models::record::FlowKind;
use crate::state::AppContext;
use crate::utils::errors::Result;

/// All available bot commands
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Blueberry commands:")]
pub enum Command {
    #[command(description = "Welcome message and quick start guide")]
    Start,
    #[command(description = "Show available commands")]
    Help,
    #[command(description = "Register to start using the bot")]
    Register,
    #[command(rename = "set_timezone", description = "Set your timezone (important for accurate logs)")]
    SetTimezone,
    #[command(description = "View your timezone settings")]
    MyTimezone,
    #[command(description = "Log when you fell asleep")]
    Sleep,
    #[command(description = "Log your sleep and wake times")]
    WakeSleep,
    #[command(hide)]
    SleepCycle,
    #[command(description = "View your sleep history")]
    MySleep,
    #[command(hide)]
    MyWakeSleep,
    #[command(description = "Log water intake")]
    Water,
    #[command(description = "View today's water total and recent intake")]
    MyWater,
    #[command(description = "Write a journal entry")]
    Thought,
    #[command(description = "View your recent journal entries")]
    MyThoughts,
    #[command(hide)]
    MyThought,
    #[command(description = "Skip an optional question")]
    Skip,
    #[command(description = "Cancel the current conversation")]
    Cancel,
}

impl Command {
    /// Flow started by this command, if it starts one
    pub fn flow(&self) -> Option<FlowKind> {
        match self {
            Command::Register => Some(FlowKind::Register),
            Command::SetTimezone => Some(FlowKind::SetTimezone),
            Command::Sleep => Some(FlowKind::Sleep),
            Command::WakeSleep | Command::SleepCycle => Some(FlowKind::WakeSleep),
            Command::Water => Some(FlowKind::Water),
            Command::Thought => Some(FlowKind::Thought),
            _ => None,
        }
    }
}

/// Main command dispatcher
pub async fn handle_command(bot: Bot, msg: Message, cmd: Command, ctx: Arc<AppContext>) -> Result<()> {
    if let Some(flow) = cmd.flow() {
        return flows::handle_flow_command(bot, msg, flow, ctx).await;
    }

    match cmd {
        Command::Start => start::handle_start(bot, msg, ctx).await,
        Command::Help => help::handle_help(bot, msg).await,
        Command::MyTimezone => history::handle_my_timezone(bot, msg, ctx).await,
        Command::MySleep | Command::MyWakeSleep => history::handle_my_sleep(bot, msg, ctx).await,
        Command::MyWater => history::handle_my_water(bot, msg, ctx).await,
        Command::MyThoughts | Command::MyThought => history::handle_my_thoughts(bot, msg, ctx).await,
        Command::Cancel => flows::handle_cancel(bot, msg, ctx).await,
        _ => flows::forward_to_conversation(bot, msg, ctx).await,
    }
}
