//! Whitespace-delimited command parser.
//!
//! Turns a raw chunk like `SET key some value` into a [`Command`].

use super::MAX_MESSAGE_SIZE;
use std::fmt;
use tracing::warn;

/// Commands understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Ping,
    Set,
    Get,
    Del,
    Keys,
    Notify,
    AddReplica,
    Quit,
}

impl CommandKind {
    /// Resolve a command name. Names are matched exactly, so `set` is unknown.
    pub fn from_name(name: &str) -> Option<Self> {
        const KINDS: [CommandKind; 8] = [
            CommandKind::Ping,
            CommandKind::Set,
            CommandKind::Get,
            CommandKind::Del,
            CommandKind::Keys,
            CommandKind::Notify,
            CommandKind::AddReplica,
            CommandKind::Quit,
        ];

        KINDS
            .into_iter()
            .find(|kind| kind.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Ping => "PING",
            CommandKind::Set => "SET",
            CommandKind::Get => "GET",
            CommandKind::Del => "DEL",
            CommandKind::Keys => "KEYS",
            CommandKind::Notify => "NOTIFY",
            CommandKind::AddReplica => "ADDREPLICA",
            CommandKind::Quit => "QUIT",
        }
    }

    /// Whether a successful run of this command is forwarded to replicas.
    pub fn is_mutation(&self) -> bool {
        matches!(self, CommandKind::Set | CommandKind::Del)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed command: the name as sent plus its arguments.
///
/// For `SET`, everything after the key is folded into a single value
/// argument joined by single spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn kind(&self) -> Option<CommandKind> {
        CommandKind::from_name(&self.name)
    }

    /// Argument at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

/// Parser for single-chunk text commands.
pub struct CommandParser;

impl CommandParser {
    /// Cap a chunk at [`MAX_MESSAGE_SIZE`] bytes.
    pub fn truncate(chunk: &[u8]) -> &[u8] {
        if chunk.len() > MAX_MESSAGE_SIZE {
            warn!(
                len = chunk.len(),
                max = MAX_MESSAGE_SIZE,
                "Received message exceeds buffer size, truncating"
            );
            &chunk[..MAX_MESSAGE_SIZE]
        } else {
            chunk
        }
    }

    /// Parse one chunk. Returns `None` when the chunk holds no tokens.
    ///
    /// Unknown command names still parse; the caller decides what to do with
    /// them via [`Command::kind`].
    pub fn parse(chunk: &[u8]) -> Option<Command> {
        let chunk = Self::truncate(chunk);
        let text = String::from_utf8_lossy(chunk);
        let mut tokens = text.split_ascii_whitespace();

        let name = tokens.next()?.to_string();
        let mut args: Vec<String> = tokens.map(str::to_string).collect();

        if CommandKind::from_name(&name) == Some(CommandKind::Set) && args.len() > 2 {
            let value = args[1..].join(" ");
            args.truncate(1);
            args.push(value);
        }

        Some(Command { name, args })
    }
}
