//! Application context
//!
//! Everything handlers need, shared through the dispatcher's dependency map.

use std::sync::Arc;

use crate::config::Settings;
use crate::database::DatabaseService;
use crate::middleware::RateLimitMiddleware;
use crate::services::UserService;
use crate::utils::errors::Result;
use super::engine::ConversationEngine;
use super::flows::FlowRegistry;
use super::sink::RecordSink;
use super::storage::SessionStore;

/// Application-wide context containing services and settings
#[derive(Debug, Clone)]
pub struct AppContext {
    pub settings: Settings,
    pub database: Arc<DatabaseService>,
    pub user_service: Arc<UserService>,
    pub engine: Arc<ConversationEngine>,
    pub register_limiter: Arc<RateLimitMiddleware>,
}

impl AppContext {
    /// Wire the conversation engine to the database and build the services
    pub fn new(settings: Settings, database: Arc<DatabaseService>, store: SessionStore) -> Result<Self> {
        let registry = Arc::new(FlowRegistry::with_defaults(&settings.conversation));
        let sink: Arc<dyn RecordSink> = database.clone();
        let engine = Arc::new(ConversationEngine::new(registry, store, sink));

        let user_service = Arc::new(UserService::new(
            database.users.clone(),
            database.timezones.clone(),
        ));
        let register_limiter = Arc::new(RateLimitMiddleware::for_registration(&settings.rate_limit)?);

        Ok(Self {
            settings,
            database,
            user_service,
            engine,
            register_limiter,
        })
    }

    /// Records shown by history commands
    pub fn history_limit(&self) -> usize {
        self.settings.conversation.history_limit
    }
}
