//! Unified snapshot writer
//!
//! Routes persists to either the SQLite or the JSONL backend based on
//! configuration.

use super::jsonl_writer::JsonlSnapshotSink;
use super::sqlite_writer::SqliteSnapshotSink;
use super::writer_backend::SnapshotSink;
use crate::pipeline::config::{BackendType, PipelineConfig};
use crate::pipeline::error::SinkError;
use crate::pipeline::types::Snapshot;
use async_trait::async_trait;

pub enum SnapshotWriter {
    Sqlite(SqliteSnapshotSink),
    Jsonl(JsonlSnapshotSink),
}

impl SnapshotWriter {
    /// Create the writer selected by `config.backend`
    pub fn from_config(config: &PipelineConfig) -> Result<Self, SinkError> {
        match config.backend {
            BackendType::Sqlite => Ok(SnapshotWriter::Sqlite(SqliteSnapshotSink::new(
                &config.db_path,
            )?)),
            BackendType::Jsonl => Ok(SnapshotWriter::Jsonl(JsonlSnapshotSink::new(
                &config.output_path,
            )?)),
        }
    }
}

#[async_trait]
impl SnapshotSink for SnapshotWriter {
    async fn persist(&self, snapshot: &Snapshot) -> Result<(), SinkError> {
        match self {
            SnapshotWriter::Sqlite(w) => w.persist(snapshot).await,
            SnapshotWriter::Jsonl(w) => w.persist(snapshot).await,
        }
    }

    fn backend_type(&self) -> &'static str {
        match self {
            SnapshotWriter::Sqlite(w) => w.backend_type(),
            SnapshotWriter::Jsonl(w) => w.backend_type(),
        }
    }
}
