//! Event sinks.
//!
//! Engines hand every state change to an [`EventSink`] synchronously, after
//! the write has been committed. A failing sink is reported to the caller
//! and never retried.

use std::fmt;

use engage_core::{EngagementEvent, EventKind};
use parking_lot::Mutex;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("event rejected: {0}")]
    Rejected(String),
}

pub trait EventSink: Send + Sync + fmt::Debug {
    fn emit(&self, event: &EngagementEvent) -> Result<(), SinkError>;
}

/// Writes each event as a structured `info!` record.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &EngagementEvent) -> Result<(), SinkError> {
        info!(
            event_id = %event.id,
            kind = %event.kind,
            object_id = event.object_id,
            context_id = event.context_id.get(),
            related_user_id = event.related_user_id.map(|u| u.get()),
            "engagement event"
        );
        Ok(())
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<EngagementEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<EngagementEvent> {
        self.events.lock().clone()
    }

    /// Drain the collected events.
    pub fn take(&self) -> Vec<EngagementEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &EngagementEvent) -> Result<(), SinkError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
