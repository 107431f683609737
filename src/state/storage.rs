//! Session storage implementation
//!
//! In-flight conversations live in process memory for as long as they last.
//! The store is cheap to clone and shared by the engine and the sweeper.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use super::session::Session;

/// Per-user session store
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<i64, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a user's session
    pub async fn get(&self, user_id: i64) -> Option<Session> {
        let session = self.sessions.read().await.get(&user_id).cloned();
        debug!(user_id = user_id, found = session.is_some(), "Session lookup");
        session
    }

    /// Save a session, replacing any previous one of the same user
    pub async fn put(&self, session: Session) {
        debug!(user_id = session.user_id, flow = %session.active().flow,
               step = %session.active().current_step, "Saving session");
        self.sessions.write().await.insert(session.user_id, session);
    }

    /// Delete a user's session, returning it when there was one
    pub async fn delete(&self, user_id: i64) -> Option<Session> {
        let removed = self.sessions.write().await.remove(&user_id);
        if removed.is_some() {
            debug!("Deleted session for user {}", user_id);
        } else {
            debug!("No session to delete for user {}", user_id);
        }
        removed
    }

    pub async fn contains(&self, user_id: i64) -> bool {
        self.sessions.read().await.contains_key(&user_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Remove every session whose budget ran out before `now`
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<Session> {
        let mut sessions = self.sessions.write().await;
        let expired_ids: Vec<i64> = sessions
            .values()
            .filter(|s| s.is_expired(now))
            .map(|s| s.user_id)
            .collect();

        let expired: Vec<Session> = expired_ids
            .into_iter()
            .filter_map(|id| sessions.remove(&id))
            .collect();

        if !expired.is_empty() {
            info!("Swept {} expired sessions", expired.len());
        }
        expired
    }
}

/// Background task that periodically sweeps expired sessions and reports
/// them on a channel
#[derive(Debug)]
pub struct SessionSweeper {
    store: SessionStore,
    interval: Duration,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl SessionSweeper {
    pub fn new(store: SessionStore, interval: Duration) -> Self {
        Self {
            store,
            interval,
            handle: None,
        }
    }

    /// Start sweeping. Expired sessions are sent to the returned receiver.
    pub fn start(&mut self) -> mpsc::UnboundedReceiver<Session> {
        let (tx, rx) = mpsc::unbounded_channel();

        if let Some(old) = self.handle.take() {
            warn!("Sweeper was already running, restarting it");
            old.abort();
        }

        let store = self.store.clone();
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                ticker.tick().await;

                for session in store.sweep_expired(Utc::now()).await {
                    if tx.send(session).is_err() {
                        debug!("Sweep receiver dropped, stopping sweeper");
                        return;
                    }
                }
            }
        });

        self.handle = Some(handle);
        info!("Started session sweeper with interval {:?}", self.interval);
        rx
    }

    /// Stop the background task
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            info!("Stopped session sweeper");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for SessionSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
