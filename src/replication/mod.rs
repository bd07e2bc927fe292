//! Asynchronous, best-effort replication of mutations to peer instances.
//!
//! Connection handlers push a [`ChangeRecord`] for every successful `SET` or
//! `DEL` onto a [`ChangeQueue`]. A single [`ReplicationPipeline`] task drains
//! the queue in order and forwards each record to every registered replica.
//! Delivery is fire-and-forget: no acknowledgment, no retry.

pub mod policy;

use crate::metrics::Metrics;
use crate::registry::ReplicaRegistry;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use policy::{EvictAfter, EvictionPolicy, NeverEvict};

/// Raw bytes of a successful mutating command, forwarded verbatim.
#[derive(Clone, PartialEq, Eq)]
pub struct ChangeRecord(Bytes);

impl ChangeRecord {
    pub fn new(raw: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(raw))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeRecord({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// Producer side of the change queue.
#[derive(Clone)]
pub enum ChangeQueue {
    Unbounded(mpsc::UnboundedSender<ChangeRecord>),
    Bounded(mpsc::Sender<ChangeRecord>),
}

/// Consumer side of the change queue.
pub enum ChangeReceiver {
    Unbounded(mpsc::UnboundedReceiver<ChangeRecord>),
    Bounded(mpsc::Receiver<ChangeRecord>),
}

impl ChangeQueue {
    /// Create a queue. `None` means unbounded; `Some(n)` makes producers wait
    /// once `n` records are pending.
    pub fn new(capacity: Option<usize>) -> (Self, ChangeReceiver) {
        match capacity {
            Some(capacity) => {
                let (tx, rx) = mpsc::channel(capacity);
                (ChangeQueue::Bounded(tx), ChangeReceiver::Bounded(rx))
            }
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (ChangeQueue::Unbounded(tx), ChangeReceiver::Unbounded(rx))
            }
        }
    }

    /// Queue a record for replication. Returns false if the pipeline is gone.
    pub async fn enqueue(&self, record: ChangeRecord) -> bool {
        let sent = match self {
            ChangeQueue::Unbounded(tx) => tx.send(record).is_ok(),
            ChangeQueue::Bounded(tx) => tx.send(record).await.is_ok(),
        };

        if sent {
            Metrics::get().record_change_enqueued();
        } else {
            warn!("Replication pipeline stopped, dropping change record");
        }
        sent
    }
}

impl ChangeReceiver {
    pub async fn recv(&mut self) -> Option<ChangeRecord> {
        match self {
            ChangeReceiver::Unbounded(rx) => rx.recv().await,
            ChangeReceiver::Bounded(rx) => rx.recv().await,
        }
    }
}

/// The single consumer of the change queue.
pub struct ReplicationPipeline {
    replicas: Arc<ReplicaRegistry>,
    changes: ChangeReceiver,
}

impl ReplicationPipeline {
    pub fn new(replicas: Arc<ReplicaRegistry>, changes: ChangeReceiver) -> Self {
        Self { replicas, changes }
    }

    /// Drain the queue until every producer is dropped.
    pub async fn run(mut self) {
        info!("Replication pipeline started");
        while let Some(record) = self.changes.recv().await {
            let report = self.replicas.fan_out(&record).await;
            debug!(
                ?record,
                delivered = report.delivered,
                failed = report.failed,
                "Replicated change"
            );
        }
        info!("Replication pipeline stopped");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_queue_preserves_order() {
        let (queue, mut rx) = ChangeQueue::new(None);
        assert!(queue.enqueue(ChangeRecord::new(b"SET a 1")).await);
        assert!(queue.enqueue(ChangeRecord::new(b"DEL a")).await);

        assert_eq!(rx.recv().await.unwrap().as_bytes(), b"SET a 1");
        assert_eq!(rx.recv().await.unwrap().as_bytes(), b"DEL a");
    }

    #[tokio::test]
    async fn test_bounded_queue_waits_for_capacity() {
        let (queue, mut rx) = ChangeQueue::new(Some(1));
        assert!(queue.enqueue(ChangeRecord::new(b"SET a 1")).await);

        let producer = queue.clone();
        let mut pending = tokio::spawn(async move {
            producer.enqueue(ChangeRecord::new(b"SET b 2")).await
        });

        // The queue is full, so the second producer has to wait.
        let waited = tokio::time::timeout(Duration::from_millis(50), &mut pending).await;
        assert!(waited.is_err());

        assert_eq!(rx.recv().await.unwrap().as_bytes(), b"SET a 1");
        assert!(pending.await.unwrap());
        assert_eq!(rx.recv().await.unwrap().as_bytes(), b"SET b 2");
    }

    #[tokio::test]
    async fn test_enqueue_after_pipeline_stops() {
        let (queue, rx) = ChangeQueue::new(None);
        drop(rx);
        assert!(!queue.enqueue(ChangeRecord::new(b"SET a 1")).await);
    }

    #[tokio::test]
    async fn test_pipeline_forwards_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let replicas = Arc::new(ReplicaRegistry::new());
        let stream = ReplicaRegistry::dial(&addr).await.unwrap();
        let (mut peer, _) = listener.accept().await.unwrap();
        replicas.insert(&addr, stream);

        let (queue, rx) = ChangeQueue::new(None);
        let pipeline = ReplicationPipeline::new(Arc::clone(&replicas), rx).spawn();

        queue.enqueue(ChangeRecord::new(b"SET a 1")).await;
        queue.enqueue(ChangeRecord::new(b"SET b 2")).await;
        queue.enqueue(ChangeRecord::new(b"DEL a")).await;
        drop(queue);

        let expected = b"SET a 1SET b 2DEL a";
        let mut buf = vec![0u8; expected.len()];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..], expected);

        pipeline.await.unwrap();
    }
}
