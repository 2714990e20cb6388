//! Partition transport interface and the in-process channel adapter
//!
//! The worker only needs three things from a transport: its partition id,
//! the next record, and a way to checkpoint progress. `ChannelTransport`
//! implements that over a tokio mpsc channel; `PartitionRouter` feeds a
//! set of them, using the event's resource as the partition key.

use super::error::TransportError;
use super::types::RawRecord;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[async_trait]
pub trait PartitionTransport: Send {
    fn partition_id(&self) -> &str;

    /// Next record, or `None` once the partition's stream has ended
    ///
    /// Must be cancel safe: the worker polls it inside `tokio::select!`
    /// alongside the flush timer.
    async fn next_record(&mut self) -> Option<RawRecord>;

    /// Mark every record up to and including `position` as processed
    async fn checkpoint(&mut self, position: u64) -> Result<(), TransportError>;
}

/// Shared record of checkpointed positions, oldest first
#[derive(Debug, Clone, Default)]
pub struct CheckpointLog {
    positions: Arc<Mutex<Vec<u64>>>,
}

impl CheckpointLog {
    pub fn positions(&self) -> Vec<u64> {
        self.positions
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<u64> {
        self.positions.lock().ok().and_then(|p| p.last().copied())
    }

    fn push(&self, position: u64) -> Result<(), TransportError> {
        self.positions
            .lock()
            .map(|mut p| p.push(position))
            .map_err(|_| TransportError::Checkpoint("checkpoint log poisoned".to_string()))
    }
}

pub struct ChannelTransport {
    partition_id: String,
    rx: mpsc::Receiver<RawRecord>,
    checkpoints: CheckpointLog,
}

impl ChannelTransport {
    pub fn new(partition_id: impl Into<String>, rx: mpsc::Receiver<RawRecord>) -> Self {
        Self {
            partition_id: partition_id.into(),
            rx,
            checkpoints: CheckpointLog::default(),
        }
    }

    /// Handle for observing checkpoints after the transport moves into a worker
    pub fn checkpoint_log(&self) -> CheckpointLog {
        self.checkpoints.clone()
    }
}

#[async_trait]
impl PartitionTransport for ChannelTransport {
    fn partition_id(&self) -> &str {
        &self.partition_id
    }

    async fn next_record(&mut self) -> Option<RawRecord> {
        self.rx.recv().await
    }

    async fn checkpoint(&mut self, position: u64) -> Result<(), TransportError> {
        self.checkpoints.push(position)?;
        log::debug!("📍 Partition {} checkpointed at {}", self.partition_id, position);
        Ok(())
    }
}

#[derive(Deserialize)]
struct PartitionKey {
    resource: String,
}

/// Routes raw payloads to partitions by resource
///
/// Positions are assigned per partition, starting at 0.
pub struct PartitionRouter {
    senders: Vec<mpsc::Sender<RawRecord>>,
    next_position: Vec<u64>,
}

impl PartitionRouter {
    /// Create a router and the transports it feeds, one per partition
    pub fn new(partitions: usize, buffer: usize) -> (Self, Vec<ChannelTransport>) {
        let mut senders = Vec::with_capacity(partitions);
        let mut transports = Vec::with_capacity(partitions);

        for i in 0..partitions {
            let (tx, rx) = mpsc::channel(buffer.max(1));
            senders.push(tx);
            transports.push(ChannelTransport::new(format!("partition-{}", i), rx));
        }

        (
            Self {
                senders,
                next_position: vec![0; partitions],
            },
            transports,
        )
    }

    pub fn partitions(&self) -> usize {
        self.senders.len()
    }

    /// Partitions whose worker is still receiving
    ///
    /// A stopped worker closes only its own partition; records for the
    /// others keep flowing.
    pub fn open_partitions(&self) -> usize {
        self.senders.iter().filter(|tx| !tx.is_closed()).count()
    }

    /// Stable partition index for a resource
    pub fn partition_for(&self, resource: &str) -> usize {
        if self.senders.is_empty() {
            return 0;
        }
        (fnv1a(resource.as_bytes()) % self.senders.len() as u64) as usize
    }

    /// Send a payload to its partition, returning the partition index
    ///
    /// Payloads without a readable resource go to partition 0, where the
    /// worker skips them as malformed. `Closed` means that partition's worker
    /// has stopped; the record was not delivered and no position was used.
    pub async fn route(&mut self, data: Vec<u8>, arrived_at: i64) -> Result<usize, TransportError> {
        let partition = serde_json::from_slice::<PartitionKey>(&data)
            .map(|key| self.partition_for(&key.resource))
            .unwrap_or(0);

        let sender = self.senders.get(partition).ok_or(TransportError::Closed)?;
        let position = self.next_position[partition];

        sender
            .send(RawRecord {
                position,
                data,
                arrived_at,
            })
            .await
            .map_err(|_| TransportError::Closed)?;

        self.next_position[partition] += 1;
        Ok(partition)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ *b as u64).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_router_is_sticky_per_resource() {
        let (mut router, mut transports) = PartitionRouter::new(4, 16);

        let payload = br#"{"resource":"/index.html","field":"google"}"#.to_vec();
        let first = router.route(payload.clone(), 0).await.unwrap();
        let second = router.route(payload, 1).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, router.partition_for("/index.html"));

        let transport = &mut transports[first];
        assert_eq!(transport.next_record().await.unwrap().position, 0);
        assert_eq!(transport.next_record().await.unwrap().position, 1);
    }

    #[tokio::test]
    async fn test_unreadable_payload_goes_to_partition_zero() {
        let (mut router, mut transports) = PartitionRouter::new(3, 4);

        let partition = router.route(b"garbage".to_vec(), 7).await.unwrap();

        assert_eq!(partition, 0);
        let record = transports[0].next_record().await.unwrap();
        assert_eq!(record.data, b"garbage".to_vec());
        assert_eq!(record.arrived_at, 7);
    }

    #[tokio::test]
    async fn test_channel_transport_records_checkpoints() {
        let (_tx, rx) = mpsc::channel(1);
        let mut transport = ChannelTransport::new("p0", rx);
        let log = transport.checkpoint_log();

        transport.checkpoint(3).await.unwrap();
        transport.checkpoint(9).await.unwrap();

        assert_eq!(log.positions(), vec![3, 9]);
        assert_eq!(log.last(), Some(9));
        assert_eq!(transport.partition_id(), "p0");
    }

    #[tokio::test]
    async fn test_closed_partition_does_not_block_others() {
        let (mut router, transports) = PartitionRouter::new(2, 4);
        let dead = router.partition_for("/x");
        let live_resource = (0..64)
            .map(|i| format!("/r{}", i))
            .find(|r| router.partition_for(r) != dead)
            .unwrap();

        let mut live = None;
        for (i, transport) in transports.into_iter().enumerate() {
            if i != dead {
                live = Some(transport);
            }
        }
        let mut live = live.unwrap();
        assert_eq!(router.open_partitions(), 1);

        let payload = br#"{"resource":"/x","field":"a"}"#.to_vec();
        assert!(matches!(
            router.route(payload, 0).await,
            Err(TransportError::Closed)
        ));

        let payload = format!(r#"{{"resource":"{}","field":"a"}}"#, live_resource).into_bytes();
        router.route(payload, 1).await.unwrap();
        let record = live.next_record().await.unwrap();
        assert_eq!(record.position, 0);
        assert_eq!(record.arrived_at, 1);
    }

    #[tokio::test]
    async fn test_transport_ends_when_router_dropped() {
        let (router, mut transports) = PartitionRouter::new(1, 4);
        drop(router);
        assert!(transports[0].next_record().await.is_none());
    }
}
