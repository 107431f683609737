//! Conversation sessions
//!
//! A session is the in-flight state of one user's conversation. Nested
//! conversations push a new [`Frame`] on the session's stack; the frames
//! share the single [`TimeoutBudget`] owned by the session.

use std::collections::HashMap;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::record::{CollectedFields, FlowKind};
use crate::utils::errors::{BlueberryError, Result};

/// Time a conversation may take, measured from its outermost start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutBudget {
    pub started_at: DateTime<Utc>,
    pub budget: Duration,
}

impl TimeoutBudget {
    pub fn new(started_at: DateTime<Utc>, budget: Duration) -> Self {
        Self { started_at, budget }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.started_at > self.budget
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.started_at + self.budget
    }
}

/// One flow on the session stack
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub flow: FlowKind,
    pub current_step: String,
    pub collected_fields: CollectedFields,
    /// Index of the frame that spawned this one
    pub parent: Option<usize>,
    /// Rejected answers for the current step
    pub attempts: u32,
}

impl Frame {
    pub fn new(flow: FlowKind, first_step: &str, parent: Option<usize>) -> Self {
        Self {
            flow,
            current_step: first_step.to_string(),
            collected_fields: HashMap::new(),
            parent,
            attempts: 0,
        }
    }

    pub fn advance_to(&mut self, step: &str) {
        self.current_step = step.to_string();
        self.attempts = 0;
    }
}

/// Where a session stands
#[derive(Debug, Clone, PartialEq)]
pub enum SessionPhase {
    /// Waiting for the answer to the current step of the top frame
    Collecting,
    /// Every field is collected, the record is not stored yet
    AwaitingCommit {
        record_id: Uuid,
        completed_at: DateTime<Utc>,
    },
}

/// A user's active conversation
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: i64,
    /// `frames[0]` is the outermost flow, the last frame receives input
    pub frames: Vec<Frame>,
    pub timeout: TimeoutBudget,
    pub phase: SessionPhase,
}

impl Session {
    pub fn new(user_id: i64, flow: FlowKind, first_step: &str, timeout: TimeoutBudget) -> Self {
        Self {
            user_id,
            frames: vec![Frame::new(flow, first_step, None)],
            timeout,
            phase: SessionPhase::Collecting,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.timeout.is_expired(now)
    }

    /// The flow the user started
    pub fn root_flow(&self) -> FlowKind {
        self.frames[0].flow
    }

    pub fn root(&self) -> &Frame {
        &self.frames[0]
    }

    pub fn root_mut(&mut self) -> &mut Frame {
        &mut self.frames[0]
    }

    /// The frame receiving input
    pub fn active(&self) -> &Frame {
        let last = self.frames.len() - 1;
        &self.frames[last]
    }

    pub fn active_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_awaiting_commit(&self) -> bool {
        matches!(self.phase, SessionPhase::AwaitingCommit { .. })
    }

    /// Start a nested flow on top of the active frame
    pub fn push_child(&mut self, flow: FlowKind, first_step: &str) {
        let parent = self.frames.len() - 1;
        self.frames.push(Frame::new(flow, first_step, Some(parent)));
    }

    /// Remove the finished top frame and return it with the index of its
    /// parent, which becomes the active frame again.
    pub fn pop_child(&mut self) -> Result<(Frame, usize)> {
        if self.frames.len() < 2 {
            return Err(BlueberryError::InvalidStateTransition {
                from: self.active().flow.to_string(),
                to: "parent".to_string(),
            });
        }

        let child = self.frames.pop().ok_or_else(|| BlueberryError::InvalidStateTransition {
            from: "empty".to_string(),
            to: "parent".to_string(),
        })?;
        let parent = child.parent.ok_or_else(|| BlueberryError::InvalidStateTransition {
            from: child.flow.to_string(),
            to: "parent".to_string(),
        })?;

        // A child always sits directly on its parent
        if parent != self.frames.len() - 1 {
            return Err(BlueberryError::InvalidStateTransition {
                from: child.flow.to_string(),
                to: format!("frame {}", parent),
            });
        }

        Ok((child, parent))
    }
}
