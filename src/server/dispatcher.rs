use crate::error::CommandError;
use crate::protocol::{reply, Command, CommandKind};
use crate::registry::{ClientHandle, ReplicaRegistry, SubscriptionRegistry};
use crate::storage::MemoryStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the connection loop should do after a command ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Text written back to the issuing connection, if any.
    pub reply: Option<String>,
    /// The command mutated the store and must be replicated.
    pub changed: bool,
    /// The issuing connection asked to be closed.
    pub close: bool,
}

impl Outcome {
    fn reply(text: impl Into<String>) -> Self {
        Self {
            reply: Some(text.into()),
            changed: false,
            close: false,
        }
    }

    fn changed(text: impl Into<String>) -> Self {
        Self {
            changed: true,
            ..Self::reply(text)
        }
    }

    fn silent() -> Self {
        Self {
            reply: None,
            changed: false,
            close: false,
        }
    }

    fn close() -> Self {
        Self {
            close: true,
            ..Self::silent()
        }
    }
}

/// Executes parsed commands against the store and the shared registries.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<MemoryStore>,
    subscriptions: Arc<SubscriptionRegistry>,
    replicas: Arc<ReplicaRegistry>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<MemoryStore>,
        subscriptions: Arc<SubscriptionRegistry>,
        replicas: Arc<ReplicaRegistry>,
    ) -> Self {
        Self {
            store,
            subscriptions,
            replicas,
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    pub fn replicas(&self) -> &ReplicaRegistry {
        &self.replicas
    }

    /// Run `command` on behalf of `client`.
    ///
    /// A `SET` that changes an existing value pushes the new value to every
    /// other subscriber of the key before this returns.
    pub async fn dispatch(
        &self,
        client: &ClientHandle,
        kind: CommandKind,
        command: &Command,
    ) -> Result<Outcome, CommandError> {
        match kind {
            CommandKind::Ping => Ok(Outcome::reply(reply::PONG)),
            CommandKind::Set => self.handle_set(client, command).await,
            CommandKind::Get => self.handle_get(command),
            CommandKind::Del => self.handle_del(command),
            CommandKind::Keys => Ok(self.handle_keys()),
            CommandKind::Notify => self.handle_notify(client, command),
            CommandKind::AddReplica => self.handle_add_replica(command).await,
            CommandKind::Quit => Ok(Outcome::close()),
        }
    }

    async fn handle_set(
        &self,
        client: &ClientHandle,
        command: &Command,
    ) -> Result<Outcome, CommandError> {
        let (Some(key), Some(value)) = (command.arg(0), command.arg(1)) else {
            return Err(CommandError::SetArguments);
        };

        let previous = self.store.set(key.to_string(), value.to_string());

        match previous {
            Some(previous) if previous.value != value => {
                debug!(key, "Key already exists, updating value");
                let notified = self.subscriptions.publish(key, value, client.id()).await;
                if notified > 0 {
                    debug!(key, notified, "Notified subscribers of update");
                }
            }
            Some(_) => debug!(key, "Key already holds this value"),
            None => debug!(key, "Created key"),
        }

        Ok(Outcome::changed(reply::OK))
    }

    fn handle_get(&self, command: &Command) -> Result<Outcome, CommandError> {
        let key = command.arg(0).ok_or(CommandError::GetArguments)?;

        match self.store.get(key) {
            Some((value, _)) => Ok(Outcome::reply(value)),
            None => {
                debug!(key, "Key not found");
                Err(CommandError::KeyNotFound)
            }
        }
    }

    fn handle_del(&self, command: &Command) -> Result<Outcome, CommandError> {
        let key = command.arg(0).ok_or(CommandError::DelArguments)?;

        if self.store.delete(key) {
            Ok(Outcome::changed(reply::OK))
        } else {
            debug!(key, "Key not found");
            Err(CommandError::KeyNotFound)
        }
    }

    fn handle_keys(&self) -> Outcome {
        let keys = self.store.keys();
        if keys.is_empty() {
            Outcome::reply(reply::NO_KEYS)
        } else {
            Outcome::reply(keys.join("\n"))
        }
    }

    fn handle_notify(
        &self,
        client: &ClientHandle,
        command: &Command,
    ) -> Result<Outcome, CommandError> {
        let key = command.arg(0).ok_or(CommandError::NotifyArguments)?;

        if !self.store.contains(key) {
            return Err(CommandError::SubscribeMissingKey(key.to_string()));
        }

        if self.subscriptions.subscribe(key, client) {
            info!(key, client = %client.id(), "Client subscribed to key");
        } else {
            debug!(key, client = %client.id(), "Client already subscribed to key");
        }

        Ok(Outcome::silent())
    }

    async fn handle_add_replica(&self, command: &Command) -> Result<Outcome, CommandError> {
        let addr = command.arg(0).ok_or(CommandError::AddReplicaArguments)?;

        if self.replicas.contains(addr) {
            return Err(CommandError::ReplicaExists(addr.to_string()));
        }

        let stream = ReplicaRegistry::dial(addr).await.map_err(|e| {
            warn!("{}", e);
            CommandError::ReplicaConnect(addr.to_string())
        })?;

        // Another connection may have registered the same address while we dialed.
        if !self.replicas.insert(addr, stream) {
            return Err(CommandError::ReplicaExists(addr.to_string()));
        }

        Ok(Outcome::silent())
    }
}
