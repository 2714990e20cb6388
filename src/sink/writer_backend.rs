//! Snapshot sink trait
//!
//! Defines the persistence contract the aggregator depends on.

use crate::pipeline::error::SinkError;
use crate::pipeline::types::Snapshot;
use async_trait::async_trait;

/// Durable target for ranked snapshots
///
/// One `persist` call per snapshot. A call either stores the whole
/// snapshot or fails; the aggregator never retries within a flush.
/// Implementations are shared across partition workers.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Persist a single snapshot keyed by `(resource, timestamp)`
    async fn persist(&self, snapshot: &Snapshot) -> Result<(), SinkError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}
