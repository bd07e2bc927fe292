use super::ServerState;
use crate::error::CommandError;
use crate::metrics::{Metrics, Timer};
use crate::protocol::{CommandParser, MAX_MESSAGE_SIZE};
use crate::registry::ClientHandle;
use crate::replication::ChangeRecord;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

/// Runs the read -> parse -> dispatch -> reply loop for one connection.
///
/// Commands on a connection are handled strictly one after another. For a
/// mutating command the store is updated and subscribers notified first,
/// then the reply is written, then the change is queued for replication,
/// all before the next read.
pub struct Handler {
    state: Arc<ServerState>,
    client: ClientHandle,
}

impl Handler {
    pub fn new(state: Arc<ServerState>, client: ClientHandle) -> Self {
        Self { state, client }
    }

    /// Process commands until the peer closes, a read or write fails, or the
    /// client sends `QUIT`. The connection is unregistered either way.
    pub async fn run<R>(self, mut reader: R) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
    {
        Metrics::get().increment_connections();
        self.state.clients.register(self.client.clone());
        info!(addr = %self.client.addr(), client = %self.client.id(), "Client connected");

        let result = self.read_loop(&mut reader).await;
        self.close().await;
        result
    }

    async fn read_loop<R>(&self, reader: &mut R) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut buffer = [0u8; MAX_MESSAGE_SIZE];

        loop {
            let n = match reader.read(&mut buffer).await {
                Ok(0) => {
                    info!(addr = %self.client.addr(), "Client closed connection");
                    return Ok(());
                }
                Ok(n) => n,
                Err(e) => {
                    warn!(addr = %self.client.addr(), "Error reading from client: {}", e);
                    return Err(e);
                }
            };

            if !self.process(&buffer[..n]).await? {
                return Ok(());
            }
        }
    }

    /// Handle one chunk. Returns false when the connection should close.
    async fn process(&self, chunk: &[u8]) -> io::Result<bool> {
        let metrics = Metrics::get();

        let Some(command) = CommandParser::parse(chunk) else {
            debug!(addr = %self.client.addr(), "Ignoring empty message");
            return Ok(true);
        };

        let Some(kind) = command.kind() else {
            warn!(addr = %self.client.addr(), "Error unknown command: {}", command.name);
            metrics.record_error("unknown_command", Some(command.name.as_str()));
            return Ok(true);
        };

        debug!(addr = %self.client.addr(), "Received command: {}", kind);

        let timer = Timer::new();
        let result = self.state.dispatcher.dispatch(&self.client, kind, &command).await;
        metrics.record_command(kind.as_str(), timer.elapsed_seconds());

        match result {
            Ok(outcome) => {
                let sent = match &outcome.reply {
                    Some(reply) => self.client.send(reply.as_bytes()).await,
                    None => Ok(()),
                };

                // The store already changed, so replicas get it even if the reply failed.
                if outcome.changed {
                    let record = ChangeRecord::new(CommandParser::truncate(chunk));
                    self.state.changes.enqueue(record).await;
                }

                sent?;
                Ok(!outcome.close)
            }
            Err(e) => {
                match e {
                    CommandError::KeyNotFound => debug!(command = %kind, "{}", e),
                    _ => warn!(command = %kind, addr = %self.client.addr(), "{}", e),
                }
                metrics.record_error(e.kind(), Some(kind.as_str()));
                self.client.send(e.to_string().as_bytes()).await?;
                Ok(true)
            }
        }
    }

    async fn close(&self) {
        let id = self.client.id();
        self.state.clients.remove(id);

        if self.state.prune_on_disconnect {
            let pruned = self.state.dispatcher.subscriptions().remove_client(id);
            if pruned > 0 {
                debug!(client = %id, pruned, "Pruned subscriptions of closed connection");
            }
        }

        if let Err(e) = self.client.shutdown().await {
            debug!(client = %id, "Error closing connection: {}", e);
        }

        Metrics::get().decrement_connections();
        info!(addr = %self.client.addr(), client = %id, "Client disconnected");
    }
}
