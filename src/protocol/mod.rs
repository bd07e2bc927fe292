//! Raw text protocol: one socket read is one command.
//!
//! There is no delimiter and no framing. A chunk is truncated to
//! [`MAX_MESSAGE_SIZE`] bytes and split on whitespace.

pub mod command;

pub use command::{Command, CommandKind, CommandParser};

/// Largest chunk handled as a single command; longer reads are truncated.
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// Literal replies that are not errors.
pub mod reply {
    pub const PONG: &str = "PONG";
    pub const OK: &str = "OK";
    pub const NO_KEYS: &str = "No keys found";
}

/// Push message sent to subscribers when a watched key changes.
pub fn update_notification(key: &str, value: &str) -> String {
    format!("Key {} updated to {}", key, value)
}
