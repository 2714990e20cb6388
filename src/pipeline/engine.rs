//! Aggregator - per-partition windowed field counter
//!
//! ## Architecture
//!
//! ```text
//! Event
//!     ↓
//! Aggregator::record()            (intake path, no I/O)
//!     ↓
//! WindowBuffer per resource
//!     ↓
//! Aggregator::flush(now, host)    (clock driven)
//!     ↓
//! evict_expired → rank → Snapshot
//!     ↓
//! SnapshotSink::persist()         (one call per resource)
//! ```
//!
//! One aggregator belongs to exactly one partition. Nothing in here is
//! shared, so `record` and `flush` only need to be serialized with each
//! other, which the partition worker does by running both on one task.

use super::types::{Event, Snapshot};
use super::windows::WindowBuffer;
use crate::pipeline::error::SinkError;
use crate::sink::SnapshotSink;
use std::collections::HashMap;

/// Outcome of a single flush cycle
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Flush timestamp
    pub timestamp: i64,
    /// Snapshots produced (persisted + dropped)
    pub snapshots: usize,
    pub persisted: usize,
    pub dropped: usize,
    pub evicted_entries: usize,
    /// Resources removed because their window emptied
    pub retired_resources: usize,
    /// `now` went backwards; nothing was evicted or emitted
    pub clock_regression: bool,
    /// The sink reported it can no longer accept writes
    pub fatal: Option<SinkError>,
}

impl FlushReport {
    /// Every produced snapshot reached the sink
    pub fn fully_persisted(&self) -> bool {
        !self.clock_regression && self.dropped == 0 && self.fatal.is_none()
    }
}

pub struct Aggregator {
    span_ms: i64,
    buffers: HashMap<String, WindowBuffer>,
    /// Highest `now` any flush has seen
    last_flush: Option<i64>,
}

impl Aggregator {
    pub fn new(span_ms: i64) -> Self {
        Self {
            span_ms,
            buffers: HashMap::new(),
            last_flush: None,
        }
    }

    pub fn span_ms(&self) -> i64 {
        self.span_ms
    }

    /// Add an event to its resource's window
    pub fn record(&mut self, event: Event) {
        let span_ms = self.span_ms;
        let (resource, entry) = event.into_entry();

        self.buffers
            .entry(resource)
            .or_insert_with(|| WindowBuffer::new(span_ms))
            .insert(entry);
    }

    /// Evict and rank every resource, returning the snapshots to persist
    ///
    /// Resources whose window is empty after eviction are dropped from
    /// tracking and yield nothing. Returns `None` when `now` is earlier
    /// than a previous flush.
    pub fn collect_snapshots(&mut self, now: i64, host: &str) -> Option<CollectedSnapshots> {
        if let Some(last) = self.last_flush {
            if now < last {
                log::warn!(
                    "⚠️  Clock regression: flush at {} is {}ms behind previous flush at {}, skipping",
                    now,
                    last - now,
                    last
                );
                return None;
            }
        }
        self.last_flush = Some(now);

        let mut evicted_entries = 0;
        for buffer in self.buffers.values_mut() {
            evicted_entries += buffer.evict_expired(now);
        }

        let before = self.buffers.len();
        self.buffers.retain(|_, buffer| !buffer.is_empty());
        let retired_resources = before - self.buffers.len();

        let mut resources: Vec<&String> = self.buffers.keys().collect();
        resources.sort();

        let snapshots = resources
            .into_iter()
            .filter_map(|resource| {
                let field_counts = self.buffers[resource].rank();
                if field_counts.is_empty() {
                    return None;
                }
                Some(Snapshot {
                    resource: resource.clone(),
                    timestamp: now,
                    host: host.to_string(),
                    field_counts,
                })
            })
            .collect();

        Some(CollectedSnapshots {
            snapshots,
            evicted_entries,
            retired_resources,
        })
    }

    /// Recompute every window and hand the snapshots to `sink`
    ///
    /// A rejected snapshot is logged and counted; the cycle continues with
    /// the next resource. A fatal sink error stops the cycle and is
    /// returned in the report.
    pub async fn flush(&mut self, now: i64, host: &str, sink: &dyn SnapshotSink) -> FlushReport {
        let mut report = FlushReport {
            timestamp: now,
            ..FlushReport::default()
        };

        let collected = match self.collect_snapshots(now, host) {
            Some(collected) => collected,
            None => {
                report.clock_regression = true;
                return report;
            }
        };

        report.snapshots = collected.snapshots.len();
        report.evicted_entries = collected.evicted_entries;
        report.retired_resources = collected.retired_resources;

        for snapshot in collected.snapshots {
            if report.fatal.is_some() {
                report.dropped += 1;
                continue;
            }

            match sink.persist(&snapshot).await {
                Ok(()) => report.persisted += 1,
                Err(e) if e.is_fatal() => {
                    log::error!(
                        "❌ {} sink unavailable while persisting {} @ {}: {}",
                        sink.backend_type(),
                        snapshot.resource,
                        snapshot.timestamp,
                        e
                    );
                    report.dropped += 1;
                    report.fatal = Some(e);
                }
                Err(e) => {
                    log::warn!(
                        "⚠️  Dropped snapshot {} @ {}: {}",
                        snapshot.resource,
                        snapshot.timestamp,
                        e
                    );
                    report.dropped += 1;
                }
            }
        }

        report
    }

    /// Resources with a live window
    pub fn active_resources(&self) -> Vec<String> {
        self.buffers.keys().cloned().collect()
    }

    pub fn resource_count(&self) -> usize {
        self.buffers.len()
    }

    /// Total entries held across all windows
    pub fn buffered_entries(&self) -> usize {
        self.buffers.values().map(WindowBuffer::len).sum()
    }

    pub fn buffer(&self, resource: &str) -> Option<&WindowBuffer> {
        self.buffers.get(resource)
    }
}

/// Snapshots produced by one evict-and-rank pass
#[derive(Debug)]
pub struct CollectedSnapshots {
    pub snapshots: Vec<Snapshot>,
    pub evicted_entries: usize,
    pub retired_resources: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::FieldCount;
    use crate::sink::MemorySink;

    const SPAN: i64 = 10_000;

    fn event(resource: &str, field: &str, ts: i64) -> Event {
        Event::new(resource, field, ts).unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let mut agg = Aggregator::new(SPAN);
        let sink = MemorySink::new();

        agg.record(event("/index.html", "google", 0));
        agg.record(event("/index.html", "amazon", 1_000));
        agg.record(event("/index.html", "google", 2_000));

        let report = agg.flush(3_000, "host-a", &sink).await;

        assert!(report.fully_persisted());
        assert_eq!(report.persisted, 1);
        assert_eq!(
            sink.snapshots(),
            vec![Snapshot {
                resource: "/index.html".to_string(),
                timestamp: 3_000,
                host: "host-a".to_string(),
                field_counts: vec![FieldCount::new("google", 2), FieldCount::new("amazon", 1)],
            }]
        );
    }

    #[test]
    fn test_window_correctness() {
        let mut agg = Aggregator::new(SPAN);
        let timestamps = [0, 500, 2_000, 4_999, 5_000, 9_000, 14_000];
        for ts in timestamps {
            agg.record(event("/r", &format!("f{}", ts), ts));
        }

        let now = 15_000;
        let collected = agg.collect_snapshots(now, "h").unwrap();
        let ranked: Vec<String> = collected.snapshots[0]
            .field_counts
            .iter()
            .map(|fc| fc.field.clone())
            .collect();

        let expected: Vec<String> = timestamps
            .iter()
            .filter(|ts| now - **ts <= SPAN)
            .map(|ts| format!("f{}", ts))
            .collect();

        assert_eq!(ranked, expected);
        assert_eq!(collected.evicted_entries, 4);
    }

    #[tokio::test]
    async fn test_empty_window_is_retired_and_recreated() {
        let mut agg = Aggregator::new(SPAN);
        let sink = MemorySink::new();

        agg.record(event("/old", "x", 0));
        agg.record(event("/live", "y", 15_000));

        let report = agg.flush(15_000, "h", &sink).await;

        assert_eq!(report.retired_resources, 1);
        assert_eq!(report.persisted, 1);
        assert_eq!(agg.active_resources(), vec!["/live".to_string()]);
        assert!(sink.snapshots().iter().all(|s| s.resource != "/old"));

        // A new event recreates the resource from scratch
        agg.record(event("/old", "z", 16_000));
        let report = agg.flush(16_000, "h", &sink).await;

        assert_eq!(report.persisted, 2);
        let old = sink
            .snapshots()
            .into_iter()
            .find(|s| s.resource == "/old")
            .unwrap();
        assert_eq!(old.field_counts, vec![FieldCount::new("z", 1)]);
    }

    #[tokio::test]
    async fn test_failed_resource_does_not_abort_cycle() {
        let mut agg = Aggregator::new(SPAN);
        let sink = MemorySink::new();
        sink.fail_resource("/b");

        for resource in ["/a", "/b", "/c"] {
            agg.record(event(resource, "f", 1_000));
        }

        let report = agg.flush(2_000, "h", &sink).await;

        assert_eq!(report.snapshots, 3);
        assert_eq!(report.persisted, 2);
        assert_eq!(report.dropped, 1);
        assert!(!report.fully_persisted());
        // Buffer state is untouched by the failure
        assert_eq!(agg.buffer("/b").unwrap().len(), 1);

        sink.clear_failures();
        let report = agg.flush(3_000, "h", &sink).await;
        assert!(report.fully_persisted());
        assert_eq!(report.persisted, 3);
    }

    #[tokio::test]
    async fn test_clock_regression_emits_nothing() {
        let mut agg = Aggregator::new(SPAN);
        let sink = MemorySink::new();

        agg.record(event("/r", "f", 0));
        agg.flush(5_000, "h", &sink).await;

        agg.record(event("/r", "g", 1_000));
        let report = agg.flush(4_000, "h", &sink).await;

        assert!(report.clock_regression);
        assert!(!report.fully_persisted());
        assert_eq!(report.snapshots, 0);
        assert_eq!(sink.attempts(), 1);
        assert_eq!(agg.buffered_entries(), 2);

        // Flushing resumes once the clock passes the highest seen `now`
        let report = agg.flush(5_001, "h", &sink).await;
        assert!(!report.clock_regression);
        assert_eq!(report.persisted, 1);
    }

    #[tokio::test]
    async fn test_fatal_sink_error_stops_cycle() {
        let mut agg = Aggregator::new(SPAN);
        let sink = MemorySink::new();
        sink.set_unavailable();

        for resource in ["/a", "/b", "/c"] {
            agg.record(event(resource, "f", 1_000));
        }

        let report = agg.flush(2_000, "h", &sink).await;

        assert!(report.fatal.is_some());
        assert_eq!(report.dropped, 3);
        assert_eq!(sink.attempts(), 1);
    }

    #[test]
    fn test_duplicate_delivery_over_counts() {
        let mut agg = Aggregator::new(SPAN);
        let e = event("/r", "google", 100);
        agg.record(e.clone());
        agg.record(e);

        let collected = agg.collect_snapshots(200, "h").unwrap();
        assert_eq!(collected.snapshots[0].field_counts, vec![FieldCount::new("google", 2)]);
    }
}
