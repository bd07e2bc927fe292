use crate::error::ReplicationError;
use crate::metrics::Metrics;
use crate::replication::policy::{EvictionPolicy, NeverEvict};
use crate::replication::ChangeRecord;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// An outbound connection to a peer instance.
///
/// The peer answers every forwarded command with a reply of its own; a
/// background task reads and discards those so the peer never blocks on a
/// full send buffer.
pub struct Replica {
    addr: String,
    writer: Mutex<OwnedWriteHalf>,
    consecutive_failures: AtomicU32,
    drain: JoinHandle<()>,
}

impl Replica {
    fn new(addr: String, stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        let drain = tokio::spawn(drain_replies(addr.clone(), reader));
        Self {
            addr,
            writer: Mutex::new(writer),
            consecutive_failures: AtomicU32::new(0),
            drain,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn forward(&self, record: &ChangeRecord) -> Result<(), ReplicationError> {
        let mut writer = self.writer.lock().await;
        let result = async {
            writer.write_all(record.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        result.map_err(|source| ReplicationError::Write {
            addr: self.addr.clone(),
            source,
        })
    }
}

impl Drop for Replica {
    fn drop(&mut self) {
        self.drain.abort();
    }
}

async fn drain_replies(addr: String, mut reader: OwnedReadHalf) {
    let mut buffer = [0u8; 1024];
    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => {
                debug!(replica = %addr, "Replica closed its side of the connection");
                return;
            }
            Ok(n) => {
                let reply = String::from_utf8_lossy(&buffer[..n]);
                debug!(replica = %addr, "Replica replied: {}", reply);
            }
            Err(e) => {
                warn!(replica = %addr, "Error reading from replica: {}", e);
                return;
            }
        }
    }
}

/// Outcome of forwarding one change record to every replica.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOutReport {
    pub delivered: usize,
    pub failed: usize,
    pub evicted: usize,
}

/// Peer address -> outbound replication connection.
///
/// Keyed by the address string exactly as given to `ADDREPLICA`, so
/// `localhost:7000` and `127.0.0.1:7000` are distinct replicas.
pub struct ReplicaRegistry {
    replicas: DashMap<String, Arc<Replica>>,
    policy: Box<dyn EvictionPolicy>,
}

impl Default for ReplicaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicaRegistry {
    pub fn new() -> Self {
        Self::with_policy(Box::new(NeverEvict))
    }

    pub fn with_policy(policy: Box<dyn EvictionPolicy>) -> Self {
        Self {
            replicas: DashMap::new(),
            policy,
        }
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.replicas.contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Open a connection to a peer.
    pub async fn dial(addr: &str) -> Result<TcpStream, ReplicationError> {
        TcpStream::connect(addr)
            .await
            .map_err(|source| ReplicationError::Connect {
                addr: addr.to_string(),
                source,
            })
    }

    /// Register a connected peer. Returns false, dropping `stream`, if the
    /// address was registered in the meantime.
    pub fn insert(&self, addr: &str, stream: TcpStream) -> bool {
        match self.replicas.entry(addr.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Replica::new(addr.to_string(), stream)));
                info!(replica = addr, policy = self.policy.name(), "Added replica");
                true
            }
        }
    }

    /// Write `record` verbatim to every registered replica.
    ///
    /// Failures are logged and skipped. A replica the eviction policy gives
    /// up on is removed from the registry.
    pub async fn fan_out(&self, record: &ChangeRecord) -> FanOutReport {
        let targets: Vec<Arc<Replica>> = self
            .replicas
            .iter()
            .map(|replica| Arc::clone(replica.value()))
            .collect();

        let mut report = FanOutReport::default();
        if targets.is_empty() {
            debug!("No replicas available to replicate changes");
            return report;
        }

        let metrics = Metrics::get();
        for replica in targets {
            match replica.forward(record).await {
                Ok(()) => {
                    replica.consecutive_failures.store(0, Ordering::Relaxed);
                    metrics.record_replica_write(true);
                    report.delivered += 1;
                }
                Err(e) => {
                    let failures =
                        replica.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(failures, "Error sending command to replica: {}", e);
                    metrics.record_replica_write(false);
                    report.failed += 1;

                    if self.policy.should_evict(failures) && self.evict(&replica) {
                        warn!(
                            replica = replica.addr(),
                            failures,
                            "Evicted replica after repeated failures"
                        );
                        metrics.record_replica_evicted();
                        report.evicted += 1;
                    }
                }
            }
        }

        report
    }

    fn evict(&self, replica: &Arc<Replica>) -> bool {
        self.replicas
            .remove_if(replica.addr(), |_, current| Arc::ptr_eq(current, replica))
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::policy::EvictAfter;
    use tokio::net::TcpListener;

    async fn peer() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_addr() {
        let (listener, addr) = peer().await;
        let registry = ReplicaRegistry::new();

        let first = ReplicaRegistry::dial(&addr).await.unwrap();
        let _accepted = listener.accept().await.unwrap();
        assert!(registry.insert(&addr, first));

        let second = ReplicaRegistry::dial(&addr).await.unwrap();
        assert!(!registry.insert(&addr, second));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&addr));
    }

    #[tokio::test]
    async fn test_dial_failure() {
        let (listener, addr) = peer().await;
        drop(listener);

        let err = ReplicaRegistry::dial(&addr).await.unwrap_err();
        assert!(matches!(err, ReplicationError::Connect { .. }));
    }

    #[tokio::test]
    async fn test_fan_out_writes_raw_record() {
        let (listener, addr) = peer().await;
        let registry = ReplicaRegistry::new();

        let stream = ReplicaRegistry::dial(&addr).await.unwrap();
        let (mut accepted, _) = listener.accept().await.unwrap();
        registry.insert(&addr, stream);

        let record = ChangeRecord::new(b"SET k v");
        let report = registry.fan_out(&record).await;
        assert_eq!(report.delivered, 1);

        let mut buf = [0u8; 7];
        accepted.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"SET k v");
    }

    #[tokio::test]
    async fn test_fan_out_with_no_replicas() {
        let registry = ReplicaRegistry::new();
        let report = registry.fan_out(&ChangeRecord::new(b"DEL k")).await;
        assert_eq!(report, FanOutReport::default());
    }

    #[tokio::test]
    async fn test_failing_replica_is_evicted_by_policy() {
        let (listener, addr) = peer().await;
        let registry = ReplicaRegistry::with_policy(Box::new(EvictAfter(1)));

        let stream = ReplicaRegistry::dial(&addr).await.unwrap();
        let (accepted, _) = listener.accept().await.unwrap();
        registry.insert(&addr, stream);
        drop(accepted);
        drop(listener);

        // The first writes after a peer reset may still be buffered locally;
        // keep forwarding until the broken pipe surfaces.
        let record = ChangeRecord::new(b"SET k v");
        let mut evicted = 0;
        for _ in 0..50 {
            let report = registry.fan_out(&record).await;
            evicted += report.evicted;
            if registry.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert_eq!(evicted, 1);
        assert!(registry.is_empty());
    }
}
