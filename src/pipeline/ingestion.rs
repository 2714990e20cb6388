//! Partition worker - drives one Aggregator against one partition
//!
//! Main loop (single task, so `record` and `flush` never race):
//! 1. Receives records from the partition transport and decodes them
//! 2. Records each event into the aggregator
//! 3. On every flush tick: evict, rank, persist, then checkpoint
//!
//! Checkpoint contract:
//! - The checkpoint position is the last record received before the tick
//! - It is issued only if every snapshot of that tick persisted
//! - A tick with dropped snapshots defers the checkpoint; the next clean
//!   tick recounts the whole window and checkpoints its own position
//!
//! A crash between persist and checkpoint can therefore only cause
//! redelivery (over-counting), never loss.

use super::config::PipelineConfig;
use super::engine::{Aggregator, FlushReport};
use super::error::WorkerError;
use super::transport::PartitionTransport;
use super::types::{now_millis, Event, RawRecord};
use crate::sink::SnapshotSink;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::time::{interval_at, Duration, MissedTickBehavior};

/// Counters reported when a worker stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub partition: String,
    pub events_recorded: u64,
    pub events_skipped: u64,
    pub flushes: u64,
    pub snapshots_persisted: u64,
    pub snapshots_dropped: u64,
    pub last_checkpoint: Option<u64>,
}

pub struct PartitionWorker<T: PartitionTransport> {
    transport: T,
    aggregator: Aggregator,
    sink: Arc<dyn SnapshotSink>,
    host: String,
    flush_interval: Duration,
    /// Timestamp function (for testing with mock time)
    now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
    last_position: Option<u64>,
    summary: WorkerSummary,
}

impl<T: PartitionTransport> PartitionWorker<T> {
    pub fn new(transport: T, sink: Arc<dyn SnapshotSink>, config: &PipelineConfig) -> Self {
        let partition = transport.partition_id().to_string();
        Self {
            transport,
            aggregator: Aggregator::new(config.window_span_ms),
            sink,
            host: config.host.clone(),
            flush_interval: config.flush_interval(),
            now_fn: Box::new(now_millis),
            last_position: None,
            summary: WorkerSummary {
                partition,
                ..WorkerSummary::default()
            },
        }
    }

    /// Replace the wall clock (for deterministic tests)
    pub fn with_now_fn(mut self, now_fn: Box<dyn Fn() -> i64 + Send + Sync>) -> Self {
        self.now_fn = now_fn;
        self
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn summary(&self) -> &WorkerSummary {
        &self.summary
    }

    /// Decode a record and feed it to the aggregator
    ///
    /// Undecodable records are skipped; their position still counts as
    /// processed.
    pub fn on_record(&mut self, record: RawRecord) {
        self.last_position = Some(record.position);

        match Event::from_json(&record.data, record.arrived_at) {
            Ok(event) => {
                self.aggregator.record(event);
                self.summary.events_recorded += 1;
            }
            Err(e) => {
                self.summary.events_skipped += 1;
                log::warn!(
                    "⚠️  Partition {} skipping record at {}: {}",
                    self.summary.partition,
                    record.position,
                    e
                );
            }
        }
    }

    /// Run one flush cycle and checkpoint if it fully persisted
    pub async fn flush_and_checkpoint(&mut self) -> Result<FlushReport, WorkerError> {
        let position = self.last_position;
        let now = (self.now_fn)();

        let mut report = self
            .aggregator
            .flush(now, &self.host, self.sink.as_ref())
            .await;

        self.summary.flushes += 1;
        self.summary.snapshots_persisted += report.persisted as u64;
        self.summary.snapshots_dropped += report.dropped as u64;

        if let Some(source) = report.fatal.take() {
            return Err(WorkerError::SinkUnavailable {
                partition: self.summary.partition.clone(),
                source,
            });
        }

        log::debug!(
            "📊 Partition {} flush @ {}: {} snapshots ({} persisted, {} dropped), {} evicted, {} resources active",
            self.summary.partition,
            now,
            report.snapshots,
            report.persisted,
            report.dropped,
            report.evicted_entries,
            self.aggregator.resource_count()
        );

        if !report.fully_persisted() {
            if report.dropped > 0 {
                log::warn!(
                    "⚠️  Partition {} deferring checkpoint: {} snapshot(s) dropped at {}",
                    self.summary.partition,
                    report.dropped,
                    now
                );
            }
            return Ok(report);
        }

        if let Some(position) = position {
            let advanced = self
                .summary
                .last_checkpoint
                .map_or(true, |last| position > last);

            if advanced {
                match self.transport.checkpoint(position).await {
                    Ok(()) => self.summary.last_checkpoint = Some(position),
                    Err(e) => {
                        log::warn!(
                            "⚠️  Partition {} checkpoint at {} failed: {}",
                            self.summary.partition,
                            position,
                            e
                        );
                    }
                }
            }
        }

        Ok(report)
    }

    /// Run until the transport ends, shutdown is signalled, or the sink
    /// becomes unavailable
    ///
    /// On shutdown no further records are read; one final flush persists
    /// what has been ranked and checkpoints if it fully succeeded.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<WorkerSummary, WorkerError> {
        log::info!(
            "🚀 Partition {} worker started (window: {}ms, flush: {}ms, sink: {})",
            self.summary.partition,
            self.aggregator.span_ms(),
            self.flush_interval.as_millis(),
            self.sink.backend_type()
        );

        let start = tokio::time::Instant::now() + self.flush_interval;
        let mut flush_timer = interval_at(start, self.flush_interval);
        flush_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut shutdown_open = true;
        let mut window_events = 0u64;
        let mut last_log_time = Instant::now();

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed(), if shutdown_open => {
                    if changed.is_err() {
                        // Sender gone: keep running until the transport ends
                        shutdown_open = false;
                    } else if *shutdown.borrow() {
                        log::info!("⚠️  Partition {} received shutdown", self.summary.partition);
                        break;
                    }
                }

                _ = flush_timer.tick() => {
                    self.flush_and_checkpoint().await?;
                }

                maybe_record = self.transport.next_record() => {
                    match maybe_record {
                        Some(record) => {
                            self.on_record(record);
                            window_events += 1;

                            // Log throughput every 10 seconds
                            if last_log_time.elapsed().as_secs() >= 10 {
                                let per_sec = window_events as f64 / last_log_time.elapsed().as_secs_f64();
                                log::info!(
                                    "📊 Partition {} ingestion rate: {:.1} events/sec ({} resources active)",
                                    self.summary.partition,
                                    per_sec,
                                    self.aggregator.resource_count()
                                );
                                last_log_time = Instant::now();
                                window_events = 0;
                            }
                        }
                        None => {
                            log::info!("⚠️  Partition {} stream ended", self.summary.partition);
                            break;
                        }
                    }
                }
            }
        }

        log::info!("🔄 Partition {} performing final flush...", self.summary.partition);
        self.flush_and_checkpoint().await?;

        log::info!(
            "✅ Partition {} stopped: {} events ({} skipped), {} snapshots persisted, {} dropped, checkpoint {:?}",
            self.summary.partition,
            self.summary.events_recorded,
            self.summary.events_skipped,
            self.summary.snapshots_persisted,
            self.summary.snapshots_dropped,
            self.summary.last_checkpoint
        );

        Ok(self.summary)
    }
}
