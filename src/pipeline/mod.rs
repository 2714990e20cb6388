//! # Windowed field counting pipeline
//!
//! For every resource seen on a partition, keeps the field values observed
//! in a trailing window and periodically emits a ranked snapshot of
//! field counts to a sink.
//!
//! ## Architecture
//!
//! ```text
//! PartitionRouter (resource = partition key)
//!     ↓
//! ChannelTransport per partition
//!     ↓
//! PartitionWorker (decode → Aggregator::record)
//!     ↓ every flush interval
//! Aggregator::flush → WindowBuffer::evict_expired + rank → Snapshot
//!     ↓
//! SnapshotSink::persist → transport.checkpoint
//! ```
//!
//! **Key principle:** each partition owns its windows outright. There is
//! no shared counting state, so partitions never contend and a slow sink
//! call only delays its own partition.
//!
//! ## Module Organization
//!
//! - `types` - Event, WindowEntry, FieldCount, Snapshot, RawRecord
//! - `windows` - per-resource rolling window buffer
//! - `engine` - per-partition aggregator and flush report
//! - `ingestion` - partition worker loop (intake, flush timer, checkpoint)
//! - `transport` - transport trait, channel adapter, partition router
//! - `runtime` - one task per partition with shared shutdown
//! - `config` - environment-driven settings
//! - `error` - error types

pub mod config;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod runtime;
pub mod transport;
pub mod types;
pub mod windows;

// Re-export commonly used types
pub use config::{BackendType, PipelineConfig};
pub use engine::{Aggregator, FlushReport};
pub use error::{ConfigError, EventError, SinkError, TransportError, WorkerError};
pub use ingestion::{PartitionWorker, WorkerSummary};
pub use runtime::PartitionSet;
pub use transport::{ChannelTransport, CheckpointLog, PartitionRouter, PartitionTransport};
pub use types::{Event, FieldCount, RawRecord, Snapshot, WindowEntry};
pub use windows::WindowBuffer;
