//! fieldflow runtime
//!
//! Reads newline-delimited JSON events from stdin, routes them to partition
//! workers by resource, and persists ranked field-count snapshots every
//! flush interval.
//!
//! Usage:
//!   producer | cargo run --release --bin fieldflow
//!
//! Event format:
//!   {"resource": "/index.html", "field": "http://www.google.com", "observed_at": 1700000000000}
//!
//! Environment variables:
//!   FIELDFLOW_WINDOW_SPAN_MS - Trailing window (default: 10000)
//!   FIELDFLOW_FLUSH_INTERVAL_MS - Snapshot cadence (default: 1000)
//!   FIELDFLOW_PARTITIONS - Partition workers (default: 2)
//!   FIELDFLOW_BACKEND - sqlite | jsonl (default: sqlite)
//!   FIELDFLOW_DB_PATH - SQLite database path (default: data/fieldflow.db)
//!   FIELDFLOW_OUTPUT_PATH - JSONL output path (default: streams/snapshots.jsonl)
//!   RUST_LOG - Logging level (optional, default: info)

use dotenv::dotenv;
use fieldflow::pipeline::{types::now_millis, PartitionRouter, PartitionSet, PipelineConfig};
use fieldflow::sink::{SnapshotSink, SnapshotWriter};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 Starting fieldflow...");

    let config = PipelineConfig::from_env();
    config.validate()?;

    info!("📊 Configuration:");
    info!("   ├─ Window span: {}ms", config.window_span_ms);
    info!("   ├─ Flush interval: {}ms", config.flush_interval_ms);
    info!("   ├─ Partitions: {}", config.partitions);
    info!("   ├─ Backend: {}", config.backend.as_str());
    info!("   └─ Host: {}", config.host);

    let sink: Arc<dyn SnapshotSink> = Arc::new(SnapshotWriter::from_config(&config)?);

    let (mut router, transports) = PartitionRouter::new(config.partitions, config.channel_buffer);
    let workers = PartitionSet::spawn(transports, sink, &config);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut routed = 0u64;
    let mut undeliverable = 0u64;

    info!("🔄 Reading events from stdin (CTRL+C to stop)");

    let interrupted = loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match router.route(line.as_bytes().to_vec(), now_millis()).await {
                            Ok(_) => routed += 1,
                            Err(e) => {
                                undeliverable += 1;
                                warn!("⚠️  Dropping event for stopped partition: {}", e);
                                if router.open_partitions() == 0 {
                                    error!("❌ Every partition worker has stopped");
                                    break false;
                                }
                            }
                        }
                    }
                    Ok(None) => {
                        info!("📭 stdin closed after {} events", routed);
                        break false;
                    }
                    Err(e) => {
                        warn!("⚠️  Failed to read stdin: {}", e);
                        break false;
                    }
                }
            }

            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("❌ Failed to listen for CTRL+C: {}", e);
                }
                info!("⚠️  Received CTRL+C, shutting down...");
                break true;
            }
        }
    };

    if undeliverable > 0 {
        warn!("⚠️  {} event(s) were not delivered", undeliverable);
    }

    // Closing the router ends every partition stream
    drop(router);
    let results = if interrupted {
        workers.shutdown_and_join().await
    } else {
        workers.join().await
    };

    let mut failed = 0;
    for (partition, result) in results {
        match result {
            Ok(summary) => info!(
                "   ├─ {}: {} events, {} snapshots, checkpoint {:?}",
                partition, summary.events_recorded, summary.snapshots_persisted, summary.last_checkpoint
            ),
            Err(e) => {
                failed += 1;
                error!("   ├─ {}: {}", partition, e);
            }
        }
    }

    info!("✅ fieldflow stopped ({} partition(s) failed)", failed);
    Ok(())
}
