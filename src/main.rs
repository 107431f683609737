//! Blueberry Telegram Bot
//!
//! Main application entry point

use std::sync::Arc;
use teloxide::{prelude::*, types::{ChatId, Update}};
use teloxide::dispatching::UpdateHandler;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn, error};

use blueberry::{
    config::Settings,
    utils::logging,
    database::{DatabaseService, create_pool, run_migrations},
    state::{AppContext, SessionStore, SessionSweeper},
    handlers::{Command, handle_command, handle_message, replies},
};

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;
    settings.validate()?;

    // Initialize logging
    let _log_guard = logging::init_logging(&settings.logging)?;

    info!("Starting {}...", blueberry::info());

    // Initialize database connection
    info!("Connecting to database...");
    let db_pool = create_pool(&settings.database).await?;

    // Run database migrations
    info!("Running database migrations...");
    run_migrations(&db_pool).await?;

    let database_service = Arc::new(DatabaseService::new(db_pool));

    // Initialize state management
    let store = SessionStore::new();
    let mut sweeper = SessionSweeper::new(store.clone(), settings.conversation.sweep_interval());
    let ctx = Arc::new(AppContext::new(settings.clone(), database_service, store)?);

    // Initialize bot
    let bot = Bot::new(&settings.bot.token);
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!(error = %e, "Failed to publish the command list");
    }

    spawn_expiry_notifier(bot.clone(), ctx.clone(), &mut sweeper);

    info!("Setting up bot handlers...");
    let handler = create_handler();

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![ctx])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd);
        })
        .enable_ctrlc_handler()
        .build();

    info!("Blueberry bot is ready, starting polling...");
    dispatcher.dispatch().await;

    sweeper.stop();
    info!("Blueberry bot has been shut down.");

    Ok(())
}

/// Tell users when an abandoned conversation was swept
fn spawn_expiry_notifier(bot: Bot, ctx: Arc<AppContext>, sweeper: &mut SessionSweeper) {
    let mut expired = sweeper.start();

    tokio::spawn(async move {
        while let Some(session) = expired.recv().await {
            let flow = session.root_flow();
            let text = replies::render_expired(flow);
            if let Err(e) = bot.send_message(ChatId(session.user_id), text).await {
                warn!(user_id = session.user_id, error = %e, "Failed to send expiry notice");
            }
            ctx.register_limiter.cleanup();
        }
    });
}

/// Create the main update handler
fn create_handler() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    use teloxide::dispatching::UpdateFilterExt;

    Update::filter_message()
        .filter(|msg: Message| msg.chat.is_private())
        .branch(
            // Handle commands
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_commands),
        )
        .branch(
            // Handle conversation answers
            dptree::filter(|msg: Message| msg.text().is_some())
                .endpoint(handle_messages),
        )
}

/// Handle bot commands
async fn handle_commands(bot: Bot, msg: Message, cmd: Command, ctx: Arc<AppContext>) -> HandlerResult {
    if let Err(e) = handle_command(bot, msg, cmd, ctx).await {
        error!(error = %e, "Error handling command");
        return Err(e.into());
    }

    Ok(())
}

/// Handle regular messages
async fn handle_messages(bot: Bot, msg: Message, ctx: Arc<AppContext>) -> HandlerResult {
    if let Err(e) = handle_message(bot, msg, ctx).await {
        error!(error = %e, "Error handling message");
        return Err(e.into());
    }

    Ok(())
}
