//! Partition set - one worker task per partition
//!
//! Workers share only the sink and a shutdown signal. A worker that stops
//! on a fatal sink error does not affect the others.

use super::config::PipelineConfig;
use super::error::WorkerError;
use super::ingestion::{PartitionWorker, WorkerSummary};
use super::transport::PartitionTransport;
use crate::sink::SnapshotSink;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct PartitionSet {
    handles: Vec<(String, JoinHandle<Result<WorkerSummary, WorkerError>>)>,
    shutdown_tx: watch::Sender<bool>,
}

impl PartitionSet {
    /// Spawn a worker for every transport
    pub fn spawn<T>(transports: Vec<T>, sink: Arc<dyn SnapshotSink>, config: &PipelineConfig) -> Self
    where
        T: PartitionTransport + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handles = transports
            .into_iter()
            .map(|transport| {
                let partition = transport.partition_id().to_string();
                let worker = PartitionWorker::new(transport, sink.clone(), config);
                let handle = tokio::spawn(worker.run(shutdown_rx.clone()));
                (partition, handle)
            })
            .collect::<Vec<_>>();

        log::info!(
            "✅ Spawned {} partition worker(s) (sink: {})",
            handles.len(),
            sink.backend_type()
        );

        Self {
            handles,
            shutdown_tx,
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Ask every worker to stop after a final flush
    pub fn shutdown(&self) {
        // Err only means every worker already exited
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for every worker to finish
    ///
    /// Returns one result per partition, in spawn order.
    pub async fn join(self) -> Vec<(String, Result<WorkerSummary, WorkerError>)> {
        let mut results = Vec::with_capacity(self.handles.len());

        for (partition, handle) in self.handles {
            match handle.await {
                Ok(result) => {
                    if let Err(e) = &result {
                        log::error!("❌ Partition {} worker failed: {}", partition, e);
                    }
                    results.push((partition, result));
                }
                Err(join_err) => {
                    log::error!("❌ Partition {} worker panicked: {}", partition, join_err);
                }
            }
        }

        // keep the sender alive until every worker has returned
        drop(self.shutdown_tx);
        results
    }

    /// Signal shutdown and wait for all workers
    pub async fn shutdown_and_join(self) -> Vec<(String, Result<WorkerSummary, WorkerError>)> {
        self.shutdown();
        self.join().await
    }
}
