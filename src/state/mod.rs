//! Conversation state module
//!
//! This module holds the conversation core: sessions and their storage,
//! step and flow definitions, the engine driving them and the record sink
//! finished conversations are written to.

pub mod context;
pub mod engine;
pub mod flows;
pub mod session;
pub mod sink;
pub mod steps;
pub mod storage;

pub use context::AppContext;
pub use engine::{ConversationEngine, EngineResult};
pub use flows::{FlowDefinition, FlowRegistry};
pub use session::{Frame, Session, SessionPhase, TimeoutBudget};
pub use sink::{MemoryRecordSink, RecordSink, SaveResult};
pub use steps::{FieldKind, NextStep, StepDefinition, StepKind, Transition, Validation};
pub use storage::{SessionStore, SessionSweeper};
