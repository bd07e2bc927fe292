//! TCP listener and the state shared by every connection.

pub mod dispatcher;
pub mod handler;

pub use dispatcher::{Dispatcher, Outcome};
pub use handler::Handler;

use crate::config::Config;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::registry::{ClientHandle, ClientRegistry, ReplicaRegistry, SubscriptionRegistry};
use crate::replication::{policy, ChangeQueue, ReplicationPipeline};
use crate::storage::MemoryStore;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Everything the connection handlers share.
pub struct ServerState {
    pub dispatcher: Dispatcher,
    pub clients: ClientRegistry,
    pub changes: ChangeQueue,
    pub prune_on_disconnect: bool,
}

impl ServerState {
    /// Build the shared state and the replication pipeline that consumes its
    /// change queue. The pipeline is not started.
    pub fn new(config: &Config) -> (Self, ReplicationPipeline) {
        let store = Arc::new(MemoryStore::new());
        let subscriptions = Arc::new(SubscriptionRegistry::new());
        let replicas = Arc::new(ReplicaRegistry::with_policy(policy::from_threshold(
            config.replication.max_consecutive_failures,
        )));

        let (changes, receiver) = ChangeQueue::new(config.replication.queue_capacity);
        let pipeline = ReplicationPipeline::new(Arc::clone(&replicas), receiver);

        let state = Self {
            dispatcher: Dispatcher::new(store, subscriptions, replicas),
            clients: ClientRegistry::new(),
            changes,
            prune_on_disconnect: config.subscriptions.prune_on_disconnect,
        };

        (state, pipeline)
    }
}

pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
    pipeline: ReplicationPipeline,
}

impl Server {
    pub async fn bind(config: &Config) -> Result<Self> {
        let listener = TcpListener::bind(config.server.listen_addr()).await?;
        let (state, pipeline) = ServerState::new(config);

        Ok(Self {
            listener,
            state: Arc::new(state),
            pipeline,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Start the replication pipeline and accept connections forever.
    ///
    /// A failed `accept` is logged and retried; it never stops the server.
    pub async fn run(self) {
        let Server {
            listener,
            state,
            pipeline,
        } = self;

        pipeline.spawn();

        loop {
            match listener.accept().await {
                Ok((socket, addr)) => {
                    let (reader, writer) = socket.into_split();
                    let client = ClientHandle::new(addr, writer);
                    let handler = Handler::new(Arc::clone(&state), client);

                    tokio::spawn(async move {
                        if let Err(e) = handler.run(reader).await {
                            error!(%addr, "Error handling connection: {}", e);
                        }
                    });
                }
                Err(e) => recover_from_accept_error(e).await,
            }
        }
    }

    /// Bind and run in a background task, returning the bound address and
    /// the shared state.
    pub async fn spawn(config: &Config) -> Result<(SocketAddr, Arc<ServerState>)> {
        let server = Self::bind(config).await?;
        let addr = server.local_addr()?;
        let state = server.state();
        info!(%addr, "Server started");
        tokio::spawn(server.run());
        Ok((addr, state))
    }
}

async fn recover_from_accept_error(e: io::Error) {
    error!("Error accepting connection: {}", e);
    Metrics::get().record_error("accept", None);
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}
