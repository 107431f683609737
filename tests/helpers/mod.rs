//! Test helpers module
//!
//! Builds conversation engines over in-memory storage and provides sinks
//! that fail on demand.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::Mutex;

use blueberry::config::Settings;
use blueberry::models::record::{FlowKind, Record};
use blueberry::state::{
    ConversationEngine, EngineResult, FlowRegistry, MemoryRecordSink, RecordSink, SaveResult, SessionStore,
};
use blueberry::utils::errors::{BlueberryError, Result};

pub const USER: i64 = 1001;

/// Fixed start time so timeouts are deterministic
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 22, 0, 0).unwrap()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

pub fn registry() -> Arc<FlowRegistry> {
    Arc::new(FlowRegistry::with_defaults(&Settings::default().conversation))
}

/// Engine plus handles on its store and sink
pub struct TestContext {
    pub engine: ConversationEngine,
    pub store: SessionStore,
    pub sink: MemoryRecordSink,
}

impl TestContext {
    pub fn new() -> Self {
        let store = SessionStore::new();
        let sink = MemoryRecordSink::new();
        let engine = ConversationEngine::new(registry(), store.clone(), Arc::new(sink.clone()));
        Self { engine, store, sink }
    }

    /// Send `text` at `secs` seconds after [`t0`]
    pub async fn send(&self, secs: i64, text: &str) -> EngineResult {
        self.engine
            .handle_message_at(USER, text, at(secs))
            .await
            .unwrap_or_else(|e| panic!("engine failed on {:?}: {}", text, e))
    }

    /// Send every message one second apart, returning the last result
    pub async fn script(&self, messages: &[&str]) -> EngineResult {
        let mut last = EngineResult::NoOp;
        for (i, text) in messages.iter().enumerate() {
            last = self.send(i as i64, text).await;
        }
        last
    }

    pub async fn current_step(&self) -> Option<(FlowKind, String)> {
        self.store
            .get(USER)
            .await
            .map(|s| (s.active().flow, s.active().current_step.clone()))
    }
}

/// Sink that fails its first `failures` saves, then stores in memory
pub struct FlakySink {
    failures: AtomicUsize,
    pub attempts: AtomicUsize,
    pub inner: MemoryRecordSink,
}

impl FlakySink {
    pub fn new(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
            inner: MemoryRecordSink::new(),
        }
    }
}

#[async_trait]
impl RecordSink for FlakySink {
    async fn save(&self, record: &Record) -> Result<SaveResult> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BlueberryError::Persistence("connection reset".to_string()));
        }
        self.inner.save(record).await
    }

    async fn list_recent(&self, user_id: i64, limit: usize) -> Result<Vec<Record>> {
        self.inner.list_recent(user_id, limit).await
    }

    async fn list_recent_of(&self, user_id: i64, flows: &[FlowKind], limit: usize) -> Result<Vec<Record>> {
        self.inner.list_recent_of(user_id, flows, limit).await
    }
}

/// Sink that runs the session sweeper's pass in the middle of every save,
/// as if the sweeper ticked while the database was busy
pub struct SweepDuringSave {
    store: SessionStore,
    sweep_at: DateTime<Utc>,
    pub swept: Mutex<Vec<i64>>,
    pub inner: FlakySink,
}

impl SweepDuringSave {
    pub fn new(store: SessionStore, sweep_at: DateTime<Utc>, failures: usize) -> Self {
        Self {
            store,
            sweep_at,
            swept: Mutex::new(Vec::new()),
            inner: FlakySink::new(failures),
        }
    }
}

#[async_trait]
impl RecordSink for SweepDuringSave {
    async fn save(&self, record: &Record) -> Result<SaveResult> {
        let reaped = self.store.sweep_expired(self.sweep_at).await;
        self.swept.lock().await.extend(reaped.iter().map(|s| s.user_id));
        self.inner.save(record).await
    }

    async fn list_recent(&self, user_id: i64, limit: usize) -> Result<Vec<Record>> {
        self.inner.list_recent(user_id, limit).await
    }

    async fn list_recent_of(&self, user_id: i64, flows: &[FlowKind], limit: usize) -> Result<Vec<Record>> {
        self.inner.list_recent_of(user_id, flows, limit).await
    }
}
