//! JSONL snapshot sink - appends one JSON object per snapshot

use super::writer_backend::SnapshotSink;
use crate::pipeline::error::SinkError;
use crate::pipeline::types::Snapshot;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

pub struct JsonlSnapshotSink {
    inner: Mutex<JsonlState>,
}

struct JsonlState {
    file: File,
    // Newest timestamp written per resource; flush times only move forward
    last_written: HashMap<String, i64>,
}

impl JsonlSnapshotSink {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        log::info!("📝 Writing snapshots to: {}", path.display());

        Ok(Self {
            inner: Mutex::new(JsonlState {
                file,
                last_written: HashMap::new(),
            }),
        })
    }
}

#[async_trait]
impl SnapshotSink for JsonlSnapshotSink {
    async fn persist(&self, snapshot: &Snapshot) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(snapshot)?;
        line.push('\n');

        let mut state = self
            .inner
            .lock()
            .map_err(|_| SinkError::Unavailable("jsonl writer mutex poisoned".to_string()))?;

        if let Some(&last) = state.last_written.get(&snapshot.resource) {
            if snapshot.timestamp <= last {
                return Err(SinkError::Rejected(format!(
                    "snapshot ({}, {}) is not newer than {}",
                    snapshot.resource, snapshot.timestamp, last
                )));
            }
        }

        // Whole line in one call: a failed persist leaves nothing buffered
        state.file.write_all(line.as_bytes())?;
        state
            .last_written
            .insert(snapshot.resource.clone(), snapshot.timestamp);

        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "JSONL"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::FieldCount;
    use tempfile::tempdir;

    fn create_test_snapshot(timestamp: i64) -> Snapshot {
        Snapshot {
            resource: "/index.html".to_string(),
            timestamp,
            host: "test-host".to_string(),
            field_counts: vec![FieldCount::new("google", 2)],
        }
    }

    #[tokio::test]
    async fn test_jsonl_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("snapshots.jsonl");
        let sink = JsonlSnapshotSink::new(&path).unwrap();

        sink.persist(&create_test_snapshot(1000)).await.unwrap();
        sink.persist(&create_test_snapshot(2000)).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Snapshot> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].timestamp, 2000);
        assert_eq!(lines[0].field_counts[0].field, "google");
    }

    #[tokio::test]
    async fn test_jsonl_rejects_duplicate_key() {
        let dir = tempdir().unwrap();
        let sink = JsonlSnapshotSink::new(dir.path().join("s.jsonl")).unwrap();

        sink.persist(&create_test_snapshot(1000)).await.unwrap();
        let err = sink.persist(&create_test_snapshot(1000)).await.unwrap_err();

        assert!(matches!(err, SinkError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_jsonl_rejects_older_timestamp_per_resource() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        let sink = JsonlSnapshotSink::new(&path).unwrap();

        sink.persist(&create_test_snapshot(2000)).await.unwrap();
        let err = sink.persist(&create_test_snapshot(1500)).await.unwrap_err();
        assert!(matches!(err, SinkError::Rejected(_)));

        // Other resources keep their own ordering
        let mut other = create_test_snapshot(1000);
        other.resource = "/about.html".to_string();
        sink.persist(&other).await.unwrap();

        // Rejected snapshots never reach the file
        let content = std::fs::read_to_string(&path).unwrap();
        let timestamps: Vec<i64> = content
            .lines()
            .map(|l| serde_json::from_str::<Snapshot>(l).unwrap().timestamp)
            .collect();
        assert_eq!(timestamps, vec![2000, 1000]);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        std::fs::write(&path, "").unwrap();

        // A read-only handle makes every write fail
        let sink = JsonlSnapshotSink {
            inner: Mutex::new(JsonlState {
                file: OpenOptions::new().read(true).open(&path).unwrap(),
                last_written: HashMap::new(),
            }),
        };
        let err = sink.persist(&create_test_snapshot(1000)).await.unwrap_err();
        assert!(matches!(err, SinkError::Io(_)));

        sink.inner.lock().unwrap().file = OpenOptions::new().append(true).open(&path).unwrap();
        // The failed timestamp was never recorded, so it can be retried
        sink.persist(&create_test_snapshot(1000)).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        let snapshot: Snapshot = serde_json::from_str(content.trim_end()).unwrap();
        assert_eq!(snapshot.timestamp, 1000);
    }
}
