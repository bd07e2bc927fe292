//! Application-level error types for the courier key-value server.

use thiserror::Error;

/// Top-level application error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("file error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("invalid listen address: {0}")]
    InvalidAddress(String),
}

/// Telemetry initialization errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("metrics initialization failed: {0}")]
    MetricsInit(String),
    #[error("logging initialization failed: {0}")]
    LoggingInit(String),
}

/// Protocol-level failures of a single command.
///
/// The `Display` output is the exact text written back to the issuing
/// connection, so these double as wire replies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Error: SET command requires a key and a value")]
    SetArguments,

    #[error("Error: GET command requires a key")]
    GetArguments,

    #[error("Error: DEL command requires a key")]
    DelArguments,

    #[error("Error: NOTIFY command requires a key to subscribe to")]
    NotifyArguments,

    #[error("Error: ADDREPLICA command requires a host and port")]
    AddReplicaArguments,

    #[error("Key not found")]
    KeyNotFound,

    #[error("Key {0} does not exist, cannot subscribe")]
    SubscribeMissingKey(String),

    #[error("Replica at {0} already exists")]
    ReplicaExists(String),

    #[error("Error connecting to replica {0}")]
    ReplicaConnect(String),
}

impl CommandError {
    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::SetArguments
            | CommandError::GetArguments
            | CommandError::DelArguments
            | CommandError::NotifyArguments
            | CommandError::AddReplicaArguments => "missing_arguments",
            CommandError::KeyNotFound => "key_not_found",
            CommandError::SubscribeMissingKey(_) => "subscribe_missing_key",
            CommandError::ReplicaExists(_) => "replica_exists",
            CommandError::ReplicaConnect(_) => "replica_connect",
        }
    }
}

/// Failures talking to a replication peer.
#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("failed to connect to replica {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write to replica {addr}: {source}")]
    Write {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_wire_text() {
        assert_eq!(
            CommandError::SetArguments.to_string(),
            "Error: SET command requires a key and a value"
        );
        assert_eq!(CommandError::KeyNotFound.to_string(), "Key not found");
        assert_eq!(
            CommandError::SubscribeMissingKey("k".to_string()).to_string(),
            "Key k does not exist, cannot subscribe"
        );
        assert_eq!(
            CommandError::ReplicaExists("localhost:7000".to_string()).to_string(),
            "Replica at localhost:7000 already exists"
        );
        assert_eq!(
            CommandError::ReplicaConnect("localhost:7000".to_string()).to_string(),
            "Error connecting to replica localhost:7000"
        );
    }
}
