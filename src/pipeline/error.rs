//! Error types for event intake, persistence, transport and configuration

use thiserror::Error;

/// An event payload that could not be turned into an [`Event`](super::types::Event)
///
/// The offending record is skipped; intake continues.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("event has an empty resource")]
    EmptyResource,

    #[error("event has an empty field")]
    EmptyField,
}

/// A snapshot sink failed to persist
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),

    /// The sink refused this snapshot but remains usable
    #[error("snapshot rejected: {0}")]
    Rejected(String),

    /// The sink cannot accept any further writes
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

impl SinkError {
    /// Whether the failure should stop the partition worker
    pub fn is_fatal(&self) -> bool {
        matches!(self, SinkError::Unavailable(_))
    }
}

impl From<rusqlite::Error> for SinkError {
    fn from(err: rusqlite::Error) -> Self {
        SinkError::Database(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("checkpoint failed: {0}")]
    Checkpoint(String),

    #[error("transport closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Conditions that stop a partition worker
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("partition {partition}: {source}")]
    SinkUnavailable {
        partition: String,
        #[source]
        source: SinkError,
    },
}
