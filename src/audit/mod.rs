//! Audit trail dispatch
//!
//! The pipeline records an audit entry at least once per layer completion
//! and once per validator verdict. Dispatch goes through a bounded queue
//! drained by a worker task, so pipeline latency never couples to the
//! sink's latency and audit failures never propagate into the pipeline.
//! When the queue is full the entry is dropped with a warning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

/// Severity of an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Severity
    pub level: AuditLevel,
    /// Subsystem category (e.g. "pipeline", "validation", "adapters")
    pub category: String,
    /// Event name (e.g. "layer_completed", "adapter_fallback")
    pub event: String,
    /// Acting component
    pub actor: String,
    /// Arbitrary structured details
    pub details: serde_json::Value,
    /// Entry creation time
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// New entry with empty details and the "pipeline" actor.
    pub fn new(
        level: AuditLevel,
        category: impl Into<String>,
        event: impl Into<String>,
    ) -> Self {
        Self {
            level,
            category: category.into(),
            event: event.into(),
            actor: "pipeline".to_string(),
            details: serde_json::Value::Object(serde_json::Map::new()),
            timestamp: Utc::now(),
        }
    }

    /// Set the acting component.
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    /// Attach one structured detail field.
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        if let serde_json::Value::Object(map) = &mut self.details {
            map.insert(key.into(), value.into());
        }
        self
    }
}

/// Destination for audit entries. Implementations must not block.
pub trait AuditSink: Send + Sync {
    /// Persist or forward one entry.
    fn record(&self, entry: &AuditEntry);
}

/// Sink that emits entries as tracing events
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, entry: &AuditEntry) {
        match entry.level {
            AuditLevel::Info => tracing::info!(
                category = %entry.category,
                event = %entry.event,
                actor = %entry.actor,
                details = %entry.details,
                "audit"
            ),
            AuditLevel::Warn => tracing::warn!(
                category = %entry.category,
                event = %entry.event,
                actor = %entry.actor,
                details = %entry.details,
                "audit"
            ),
            AuditLevel::Error => tracing::error!(
                category = %entry.category,
                event = %entry.event,
                actor = %entry.actor,
                details = %entry.details,
                "audit"
            ),
        }
    }
}

/// Sink that discards everything
pub struct NullSink;

impl AuditSink for NullSink {
    fn record(&self, _entry: &AuditEntry) {}
}

/// Sink that captures entries in memory, for inspection in tests and
/// diagnostics.
#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemorySink {
    /// New empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all captured entries.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Captured entries matching an event name.
    pub fn with_event(&self, event: &str) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.event == event)
            .collect()
    }
}

impl AuditSink for MemorySink {
    fn record(&self, entry: &AuditEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.clone());
        }
    }
}

enum AuditMessage {
    Entry(AuditEntry),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget audit dispatcher backed by a bounded queue.
///
/// Cheap to clone; all clones share the same worker.
#[derive(Clone)]
pub struct AuditLogger {
    tx: mpsc::Sender<AuditMessage>,
}

impl AuditLogger {
    const DEFAULT_CAPACITY: usize = 256;

    /// Logger draining into the given sink. Must be called within a tokio
    /// runtime (spawns the worker task).
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self::with_capacity(sink, Self::DEFAULT_CAPACITY)
    }

    /// Logger with an explicit queue capacity.
    pub fn with_capacity(sink: Arc<dyn AuditSink>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<AuditMessage>(capacity.max(1));
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    AuditMessage::Entry(entry) => sink.record(&entry),
                    AuditMessage::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });
        Self { tx }
    }

    /// Logger that emits entries as tracing events.
    pub fn to_tracing() -> Self {
        Self::new(Arc::new(TracingSink))
    }

    /// Logger that discards everything.
    pub fn disabled() -> Self {
        Self::new(Arc::new(NullSink))
    }

    /// Enqueue an entry. Never blocks; a full queue drops the entry.
    pub fn record(&self, entry: AuditEntry) {
        if self.tx.try_send(AuditMessage::Entry(entry)).is_err() {
            tracing::warn!("audit queue full, entry dropped");
        }
    }

    /// Wait until every entry enqueued before this call has reached the
    /// sink. Diagnostics/test helper.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(AuditMessage::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}
