pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod replication;
pub mod server;
pub mod storage;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, CommandError};
pub use protocol::{Command, CommandKind, CommandParser};
pub use server::{Dispatcher, Handler, Server, ServerState};
pub use storage::{MemoryStore, ValueType};
