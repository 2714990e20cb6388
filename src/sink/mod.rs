//! Snapshot sinks
//!
//! The aggregator only knows the [`SnapshotSink`] contract. Backends:
//! - `SqliteSnapshotSink` - `record_counts` table keyed by (resource, timestamp)
//! - `JsonlSnapshotSink` - append-only JSON lines file
//! - `MemorySink` - in-process vector with scriptable failures

pub mod jsonl_writer;
pub mod memory;
pub mod sqlite_pragma;
pub mod sqlite_writer;
pub mod writer;
pub mod writer_backend;

pub use jsonl_writer::JsonlSnapshotSink;
pub use memory::MemorySink;
pub use sqlite_writer::SqliteSnapshotSink;
pub use writer::SnapshotWriter;
pub use writer_backend::SnapshotSink;
