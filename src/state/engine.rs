//! Conversation engine
//!
//! Drives every user's session: starts flows on their commands, validates
//! answers step by step, descends into nested flows and returns to the
//! parent when they finish, and hands the finished record to the sink.
//! Expiry is checked lazily whenever the user writes.

use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::record::{FlowKind, Record};
use crate::utils::errors::{BlueberryError, Result};
use crate::utils::logging::log_conversation_event;
use super::flows::FlowRegistry;
use super::session::{Session, SessionPhase, TimeoutBudget};
use super::sink::RecordSink;
use super::steps::{StepKind, Transition, Validation};
use super::storage::SessionStore;

/// What the engine did with a message
#[derive(Debug, Clone, PartialEq)]
pub enum EngineResult {
    /// Nothing to do: no session and no start command
    NoOp,
    /// Ask the next question
    Prompt(String),
    /// The answer was rejected, ask again
    Reprompt { reason: String, prompt: String },
    /// The same flow was started again, continue where it stopped
    Resumed(String),
    /// Another flow was running and has been cancelled
    Replaced { cancelled: FlowKind, prompt: String },
    Completed(Record),
    Cancelled { flow: FlowKind },
    Expired { flow: FlowKind },
    /// The record could not be stored. The session keeps every answer and
    /// the next message retries.
    SaveFailed { reason: String },
    /// The sink refused the record for good. The session is dropped.
    Refused { flow: FlowKind, reason: String },
}

/// A message as the engine sees it
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Cancel,
    Start(FlowKind),
    Text(String),
}

/// Command name of a message like `/sleep@blueberry_bot extra`, lower-cased
/// and without the slash or bot mention
pub fn command_name(text: &str) -> Option<String> {
    let rest = text.trim().strip_prefix('/')?;
    let word = rest.split_whitespace().next()?;
    let name = word.split('@').next().unwrap_or(word);
    if name.is_empty() {
        None
    } else {
        Some(name.to_lowercase())
    }
}

pub struct ConversationEngine {
    registry: Arc<FlowRegistry>,
    store: SessionStore,
    sink: Arc<dyn RecordSink>,
}

impl ConversationEngine {
    pub fn new(registry: Arc<FlowRegistry>, store: SessionStore, sink: Arc<dyn RecordSink>) -> Self {
        Self { registry, store, sink }
    }

    pub fn sink(&self) -> &Arc<dyn RecordSink> {
        &self.sink
    }

    /// Top-level flow a message would start, if it is a start command in
    /// any spelling the engine accepts
    pub fn started_flow(&self, text: &str) -> Option<FlowKind> {
        match self.classify(text) {
            Input::Start(flow) => Some(flow),
            _ => None,
        }
    }

    /// The user's session, if one is in progress
    pub async fn active_session(&self, user_id: i64) -> Option<Session> {
        self.store.get(user_id).await
    }

    pub async fn handle_message(&self, user_id: i64, text: &str) -> Result<EngineResult> {
        self.handle_message_at(user_id, text, Utc::now()).await
    }

    /// Handle one message as if it arrived at `now`
    pub async fn handle_message_at(&self, user_id: i64, text: &str, now: DateTime<Utc>) -> Result<EngineResult> {
        let input = self.classify(text);
        let existing = self.store.get(user_id).await;

        if let Some(session) = &existing {
            if session.is_expired(now) {
                let flow = session.root_flow();
                self.store.delete(user_id).await;
                warn!(user_id = user_id, flow = %flow, step = %session.active().current_step,
                      deadline = %session.timeout.deadline(), "Conversation expired");
                log_conversation_event(user_id, flow.as_str(), "expired", Some(&session.active().current_step));
                return Ok(EngineResult::Expired { flow });
            }
        }

        match (input, existing) {
            (Input::Cancel, Some(session)) => {
                let flow = session.root_flow();
                self.store.delete(user_id).await;
                log_conversation_event(user_id, flow.as_str(), "cancelled", Some(&session.active().current_step));
                Ok(EngineResult::Cancelled { flow })
            }
            (Input::Cancel, None) => Ok(EngineResult::NoOp),
            (Input::Start(flow), None) => {
                let prompt = self.start(user_id, flow, now).await?;
                Ok(EngineResult::Prompt(prompt))
            }
            (Input::Start(flow), Some(session)) if session.root_flow() == flow => {
                if session.is_awaiting_commit() {
                    return self.commit(session).await;
                }
                debug!(user_id = user_id, flow = %flow, step = %session.active().current_step, "Resuming conversation");
                let prompt = self.current_prompt(&session)?;
                Ok(EngineResult::Resumed(prompt))
            }
            (Input::Start(flow), Some(session)) => {
                let cancelled = session.root_flow();
                self.store.delete(user_id).await;
                info!(user_id = user_id, cancelled = %cancelled, flow = %flow, "Replacing conversation");
                log_conversation_event(user_id, cancelled.as_str(), "replaced", Some(&session.active().current_step));
                let prompt = self.start(user_id, flow, now).await?;
                Ok(EngineResult::Replaced { cancelled, prompt })
            }
            (Input::Text(_), None) => Ok(EngineResult::NoOp),
            (Input::Text(_), Some(session)) if session.is_awaiting_commit() => self.commit(session).await,
            (Input::Text(text), Some(session)) => self.answer(session, &text, now).await,
        }
    }

    fn classify(&self, text: &str) -> Input {
        match command_name(text) {
            Some(name) if name == "cancel" => Input::Cancel,
            Some(name) => match self.registry.for_command(&name) {
                Some(flow) => Input::Start(flow),
                None => Input::Text(format!("/{}", name)),
            },
            None => Input::Text(text.to_string()),
        }
    }

    async fn start(&self, user_id: i64, flow: FlowKind, now: DateTime<Utc>) -> Result<String> {
        let definition = self.registry.get(flow)?;
        let budget = definition.timeout.ok_or_else(|| BlueberryError::InvalidStateTransition {
            from: "idle".to_string(),
            to: flow.to_string(),
        })?;
        let first = definition.first_step()?;

        let mut session = Session::new(user_id, flow, first.name, TimeoutBudget::new(now, budget));
        let prompt = self.enter_current(&mut session)?;
        self.store.put(session).await;

        info!(user_id = user_id, flow = %flow, budget_secs = budget.num_seconds(), "Conversation started");
        log_conversation_event(user_id, flow.as_str(), "started", Some(first.name));
        Ok(prompt)
    }

    /// Prompt for the active step, descending into nested flows until a
    /// step that takes a direct answer is reached
    fn enter_current(&self, session: &mut Session) -> Result<String> {
        let mut prompts = Vec::new();

        loop {
            let frame = session.active();
            let step = self.registry.get(frame.flow)?.step(&frame.current_step)?;
            prompts.push(step.prompt_text(&frame.collected_fields));

            match step.kind {
                StepKind::Field(_) => break,
                StepKind::SubFlow(child) => {
                    let first = self.registry.get(child)?.first_step()?;
                    debug!(user_id = session.user_id, parent = %frame.flow, child = %child,
                           depth = session.depth(), "Entering nested flow");
                    session.push_child(child, first.name);
                }
            }
        }

        Ok(prompts.join("\n\n"))
    }

    fn current_prompt(&self, session: &Session) -> Result<String> {
        let frame = session.active();
        let step = self.registry.get(frame.flow)?.step(&frame.current_step)?;
        Ok(step.prompt_text(&frame.collected_fields))
    }

    async fn answer(&self, mut session: Session, text: &str, now: DateTime<Utc>) -> Result<EngineResult> {
        let user_id = session.user_id;
        let frame = session.active();
        let step = *self.registry.get(frame.flow)?.step(&frame.current_step)?;

        let StepKind::Field(kind) = step.kind else {
            return Err(BlueberryError::InvalidStateTransition {
                from: frame.current_step.clone(),
                to: "answer".to_string(),
            });
        };

        match kind.validate(text, &frame.collected_fields) {
            Validation::Reject(reason) => {
                let prompt = step.prompt_text(&frame.collected_fields);
                let frame = session.active_mut();
                frame.attempts += 1;
                warn!(user_id = user_id, flow = %frame.flow, step = step.name,
                      attempts = frame.attempts, reason = %reason, "Answer rejected");
                self.store.put(session).await;
                Ok(EngineResult::Reprompt { reason, prompt })
            }
            Validation::Accept(value) => {
                debug!(user_id = user_id, flow = %frame.flow, step = step.name, "Answer accepted");
                session
                    .active_mut()
                    .collected_fields
                    .insert(step.name.to_string(), value);
                self.advance(session, now).await
            }
        }
    }

    /// Move past the step just answered. Finished nested flows hand their
    /// fields to the parent, which then moves on itself.
    async fn advance(&self, mut session: Session, now: DateTime<Utc>) -> Result<EngineResult> {
        let user_id = session.user_id;
        loop {
            let frame = session.active();
            let definition = self.registry.get(frame.flow)?;

            match definition.transition_after(&frame.current_step, &frame.collected_fields)? {
                Transition::Step(next) => {
                    session.active_mut().advance_to(next);
                    let prompt = self.enter_current(&mut session)?;
                    self.store.put(session).await;
                    return Ok(EngineResult::Prompt(prompt));
                }
                Transition::Finish if session.depth() > 1 => {
                    let (child, parent) = session.pop_child()?;
                    let mut fields = child.collected_fields;
                    definition.complete(&mut fields)?;

                    let parent_frame = &mut session.frames[parent];
                    debug!(user_id = user_id, child = %child.flow, parent = %parent_frame.flow,
                           step = %parent_frame.current_step, "Nested flow finished, returning to parent");
                    let step_name = parent_frame.current_step.clone();
                    parent_frame
                        .collected_fields
                        .insert(step_name, Value::Object(fields.into_iter().collect()));
                }
                Transition::Finish => {
                    definition.complete(&mut session.root_mut().collected_fields)?;
                    session.phase = SessionPhase::AwaitingCommit {
                        record_id: Uuid::new_v4(),
                        completed_at: now,
                    };
                    return self.commit(session).await;
                }
            }
        }
    }

    /// Store the finished record. Retries reuse the record id and time.
    ///
    /// The session is taken out of the store while the save runs, so the
    /// sweeper never reports a conversation that is being completed.
    async fn commit(&self, mut session: Session) -> Result<EngineResult> {
        let SessionPhase::AwaitingCommit { record_id, completed_at } = session.phase else {
            return Err(BlueberryError::InvalidStateTransition {
                from: "collecting".to_string(),
                to: "commit".to_string(),
            });
        };

        let user_id = session.user_id;
        let flow = session.root_flow();
        if self.store.delete(user_id).await.is_none() {
            warn!(user_id = user_id, flow = %flow, "Session was swept before it could be saved");
            return Ok(EngineResult::Expired { flow });
        }

        let root = session.root();
        let record = Record {
            id: record_id,
            user_id,
            flow,
            fields: root.collected_fields.clone(),
            event_time: completed_at,
        };

        match self.sink.save(&record).await {
            Ok(result) => {
                info!(user_id = user_id, flow = %record.flow, record_id = %record.id, ?result, "Conversation completed");
                log_conversation_event(user_id, record.flow.as_str(), "completed", None);
                Ok(EngineResult::Completed(record))
            }
            Err(BlueberryError::FieldConflict { field, reason }) => {
                let definition = self.registry.get(record.flow)?;
                let step = definition.step(&field)?;
                let prompt = step.prompt_text(&record.fields);

                session.phase = SessionPhase::Collecting;
                session.frames.truncate(1);
                let root = session.root_mut();
                root.collected_fields.remove(&field);
                root.advance_to(step.name);
                root.attempts = 1;

                warn!(user_id = user_id, flow = %record.flow, field = %field, reason = %reason,
                      "Record refused a collected value, asking again");
                self.store.put(session).await;
                Ok(EngineResult::Reprompt { reason, prompt })
            }
            Err(e) if e.is_recoverable() => {
                warn!(user_id = user_id, flow = %record.flow, record_id = %record.id, error = %e,
                      severity = %e.severity(), "Failed to save record, keeping session for retry");
                self.store.put(session).await;
                Ok(EngineResult::SaveFailed { reason: e.to_string() })
            }
            Err(e) => {
                warn!(user_id = user_id, flow = %record.flow, record_id = %record.id, error = %e,
                      severity = %e.severity(), "Record can never be saved, dropping session");
                log_conversation_event(user_id, record.flow.as_str(), "refused", None);
                Ok(EngineResult::Refused { flow, reason: e.to_string() })
            }
        }
    }
}

impl std::fmt::Debug for ConversationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationEngine")
            .field("registry", &self.registry)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_name_normalization() {
        assert_eq!(command_name("/sleep"), Some("sleep".to_string()));
        assert_eq!(command_name("  /WakeSleep@blueberry_bot now"), Some("wakesleep".to_string()));
        assert_eq!(command_name("/skip"), Some("skip".to_string()));
        assert_eq!(command_name("sleep"), None);
        assert_eq!(command_name("/"), None);
        assert_eq!(command_name("/@bot"), None);
    }
}
