//! In-memory snapshot sink
//!
//! Keeps every persisted snapshot in a vector. Failures can be scripted,
//! which makes it the sink of choice for embedding and tests.

use super::writer_backend::SnapshotSink;
use crate::pipeline::error::SinkError;
use crate::pipeline::types::Snapshot;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    snapshots: Vec<Snapshot>,
    attempts: usize,
    fail_next: usize,
    failing_resources: HashSet<String>,
    unavailable: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `n` persist calls
    pub fn fail_next(&self, n: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next = n;
        }
    }

    /// Reject every snapshot for `resource` until cleared
    pub fn fail_resource(&self, resource: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_resources.insert(resource.into());
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next = 0;
            state.failing_resources.clear();
            state.unavailable = false;
        }
    }

    /// Make every subsequent call fail with a fatal error
    pub fn set_unavailable(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.unavailable = true;
        }
    }

    /// Snapshots persisted so far, in persist order
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.state
            .lock()
            .map(|state| state.snapshots.clone())
            .unwrap_or_default()
    }

    /// Number of persist calls, successful or not
    pub fn attempts(&self) -> usize {
        self.state.lock().map(|state| state.attempts).unwrap_or(0)
    }
}

#[async_trait]
impl SnapshotSink for MemorySink {
    async fn persist(&self, snapshot: &Snapshot) -> Result<(), SinkError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SinkError::Unavailable("memory sink mutex poisoned".to_string()))?;

        state.attempts += 1;

        if state.unavailable {
            return Err(SinkError::Unavailable("memory sink marked unavailable".to_string()));
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(SinkError::Rejected(format!(
                "scripted failure for {}",
                snapshot.resource
            )));
        }
        if state.failing_resources.contains(&snapshot.resource) {
            return Err(SinkError::Rejected(format!(
                "resource {} is failing",
                snapshot.resource
            )));
        }
        if state
            .snapshots
            .iter()
            .any(|s| s.resource == snapshot.resource && s.timestamp == snapshot.timestamp)
        {
            return Err(SinkError::Rejected(format!(
                "duplicate snapshot key ({}, {})",
                snapshot.resource, snapshot.timestamp
            )));
        }

        state.snapshots.push(snapshot.clone());
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "Memory"
    }
}
