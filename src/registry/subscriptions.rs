use super::{ClientHandle, ClientId};
use crate::metrics::Metrics;
use crate::protocol::update_notification;
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Key -> connections that asked to be told when the key changes.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscribers: DashMap<String, HashMap<ClientId, ClientHandle>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `client` for `key`. Returns false if it was already subscribed.
    pub fn subscribe(&self, key: &str, client: &ClientHandle) -> bool {
        self.subscribers
            .entry(key.to_string())
            .or_default()
            .insert(client.id(), client.clone())
            .is_none()
    }

    /// Snapshot of the subscribers of `key`, minus `exclude`.
    pub fn subscribers_except(&self, key: &str, exclude: ClientId) -> Vec<ClientHandle> {
        self.subscribers
            .get(key)
            .map(|clients| {
                clients
                    .values()
                    .filter(|client| client.id() != exclude)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.subscribers.get(key).map(|clients| clients.len()).unwrap_or(0)
    }

    /// Drop every subscription held by `id`. Returns how many keys it watched.
    pub fn remove_client(&self, id: ClientId) -> usize {
        let mut removed = 0;
        self.subscribers.retain(|_, clients| {
            if clients.remove(&id).is_some() {
                removed += 1;
            }
            !clients.is_empty()
        });
        removed
    }

    /// Push `Key <k> updated to <v>` to every subscriber of `key` except
    /// `origin`. A failed write is logged and skipped; the rest still get it.
    ///
    /// Returns the number of subscribers that received the push.
    pub async fn publish(&self, key: &str, value: &str, origin: ClientId) -> usize {
        let targets = self.subscribers_except(key, origin);
        if targets.is_empty() {
            return 0;
        }

        let metrics = Metrics::get();
        let message = update_notification(key, value);
        let mut delivered = 0;

        for client in targets {
            match client.send(message.as_bytes()).await {
                Ok(()) => {
                    debug!(key, client = %client.id(), "Notified subscriber");
                    metrics.record_notification(true);
                    delivered += 1;
                }
                Err(e) => {
                    warn!(
                        key,
                        client = %client.id(),
                        addr = %client.addr(),
                        "Error notifying client: {}",
                        e
                    );
                    metrics.record_notification(false);
                }
            }
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::AsyncReadExt;

    fn client() -> (ClientHandle, tokio::io::DuplexStream) {
        let (local, remote) = tokio::io::duplex(256);
        let addr: SocketAddr = "127.0.0.1:40001".parse().unwrap();
        (ClientHandle::new(addr, local), remote)
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let (a, _ra) = client();

        assert!(registry.subscribe("k", &a));
        assert!(!registry.subscribe("k", &a));
        assert_eq!(registry.subscriber_count("k"), 1);
    }

    #[test]
    fn test_subscribers_except_origin() {
        let registry = SubscriptionRegistry::new();
        let (a, _ra) = client();
        let (b, _rb) = client();
        registry.subscribe("k", &a);
        registry.subscribe("k", &b);

        let others = registry.subscribers_except("k", a.id());
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].id(), b.id());
        assert!(registry.subscribers_except("missing", a.id()).is_empty());
    }

    #[test]
    fn test_remove_client_prunes_empty_keys() {
        let registry = SubscriptionRegistry::new();
        let (a, _ra) = client();
        let (b, _rb) = client();
        registry.subscribe("k1", &a);
        registry.subscribe("k2", &a);
        registry.subscribe("k2", &b);

        assert_eq!(registry.remove_client(a.id()), 2);
        assert_eq!(registry.subscriber_count("k1"), 0);
        assert_eq!(registry.subscriber_count("k2"), 1);
    }

    #[tokio::test]
    async fn test_publish_skips_origin() {
        let registry = SubscriptionRegistry::new();
        let (a, mut ra) = client();
        let (b, _rb) = client();
        registry.subscribe("k", &a);
        registry.subscribe("k", &b);

        let delivered = registry.publish("k", "v2", b.id()).await;
        assert_eq!(delivered, 1);

        let expected = b"Key k updated to v2";
        let mut buf = vec![0u8; expected.len()];
        ra.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..], expected);
    }

    #[tokio::test]
    async fn test_publish_continues_past_dead_subscriber() {
        let registry = SubscriptionRegistry::new();
        let (dead, dead_remote) = client();
        let (alive, mut alive_remote) = client();
        let (origin, _ro) = client();
        registry.subscribe("k", &dead);
        registry.subscribe("k", &alive);
        drop(dead_remote);

        let delivered = registry.publish("k", "fresh", origin.id()).await;
        assert_eq!(delivered, 1);

        let expected = b"Key k updated to fresh";
        let mut buf = vec![0u8; expected.len()];
        alive_remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..], expected);
    }
}
