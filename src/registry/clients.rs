use dashmap::DashMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Write half of a client connection, type-erased so tests can swap in mocks.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Opaque, process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Shared handle to one client connection.
///
/// Replies from the connection's own loop and pushes from other connections
/// both go through [`ClientHandle::send`], which holds the write lock for the
/// whole message so the two never interleave mid-message.
#[derive(Clone)]
pub struct ClientHandle {
    id: ClientId,
    addr: SocketAddr,
    writer: Arc<Mutex<BoxedWriter>>,
}

impl ClientHandle {
    pub fn new<W>(addr: SocketAddr, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id: ClientId::next(),
            addr,
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Write one complete message and flush it.
    pub async fn send(&self, message: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(message).await?;
        writer.flush().await
    }

    /// Close the write side of the connection.
    pub async fn shutdown(&self) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .finish()
    }
}

/// Every live connection, keyed by id.
#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<ClientId, ClientHandle>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, client: ClientHandle) {
        self.clients.insert(client.id(), client);
    }

    pub fn remove(&self, id: ClientId) -> Option<ClientHandle> {
        self.clients.remove(&id).map(|(_, client)| client)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
