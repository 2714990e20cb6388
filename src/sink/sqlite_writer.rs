//! SQLite snapshot sink
//!
//! One row per snapshot in `record_counts`, keyed by `(resource, timestamp)`
//! so successive flushes for a resource form a time series. Field counts
//! are stored as a JSON array in rank order.

use super::sqlite_pragma::apply_optimized_pragmas;
use super::writer_backend::SnapshotSink;
use crate::pipeline::error::SinkError;
use crate::pipeline::types::{FieldCount, Snapshot};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct SqliteSnapshotSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSnapshotSink {
    /// Open (or create) the database and provision the schema
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, SinkError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path.as_ref())?;
        apply_optimized_pragmas(&conn)?;
        Self::provision(&conn)?;

        log::info!(
            "✅ SQLite snapshot sink initialized: {}",
            db_path.as_ref().display()
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, mostly for tests and dry runs
    pub fn in_memory() -> Result<Self, SinkError> {
        let conn = Connection::open_in_memory()?;
        Self::provision(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn provision(conn: &Connection) -> Result<(), SinkError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS record_counts (
                resource TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                host TEXT NOT NULL,
                field_counts TEXT NOT NULL,
                PRIMARY KEY (resource, timestamp)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_record_counts_timestamp ON record_counts(timestamp DESC)",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SinkError> {
        self.conn
            .lock()
            .map_err(|_| SinkError::Unavailable("sqlite connection mutex poisoned".to_string()))
    }

    /// Most recent snapshot stored for a resource
    pub fn latest(&self, resource: &str) -> Result<Option<Snapshot>, SinkError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT resource, timestamp, host, field_counts FROM record_counts
                 WHERE resource = ?1 ORDER BY timestamp DESC LIMIT 1",
                params![resource],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(resource, timestamp, host, json)| decode_row(resource, timestamp, host, &json))
            .transpose()
    }

    /// All stored snapshots for a resource, oldest first
    pub fn series(&self, resource: &str) -> Result<Vec<Snapshot>, SinkError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT resource, timestamp, host, field_counts FROM record_counts
             WHERE resource = ?1 ORDER BY timestamp ASC",
        )?;

        let rows = stmt.query_map(params![resource], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut snapshots = Vec::new();
        for row in rows {
            let (resource, timestamp, host, json) = row?;
            snapshots.push(decode_row(resource, timestamp, host, &json)?);
        }
        Ok(snapshots)
    }
}

fn decode_row(
    resource: String,
    timestamp: i64,
    host: String,
    field_counts_json: &str,
) -> Result<Snapshot, SinkError> {
    let field_counts: Vec<FieldCount> = serde_json::from_str(field_counts_json)?;
    Ok(Snapshot {
        resource,
        timestamp,
        host,
        field_counts,
    })
}

#[async_trait]
impl SnapshotSink for SqliteSnapshotSink {
    async fn persist(&self, snapshot: &Snapshot) -> Result<(), SinkError> {
        let field_counts = serde_json::to_string(&snapshot.field_counts)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO record_counts (resource, timestamp, host, field_counts)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                snapshot.resource,
                snapshot.timestamp,
                snapshot.host,
                field_counts,
            ],
        )?;

        log::debug!(
            "✅ Snapshot persisted: {} @ {} ({} fields)",
            snapshot.resource,
            snapshot.timestamp,
            snapshot.field_counts.len()
        );

        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}
