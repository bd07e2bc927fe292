use crate::error::ConfigError;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "courier-kv")]
#[command(about = "In-memory key-value server with change notifications and replication")]
#[command(
    long_about = "courier-kv serves a plain-text key-value protocol over TCP, pushes key \
                  updates to subscribers, and forwards every mutation to registered replicas"
)]
#[command(version)]
pub struct Cli {
    /// Address to listen on: a bare port (`6970`) or `host:port`
    pub addr: Option<String>,

    /// Server host to bind to
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Server port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Configuration file path (JSON format)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Bound the replication queue to this many pending changes (unbounded if unset)
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Drop a replica after this many failed deliveries in a row (never if unset)
    #[arg(long)]
    pub max_replica_failures: Option<u32>,

    /// Keep a connection's subscriptions registered after it disconnects
    #[arg(long)]
    pub keep_stale_subscriptions: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Host and port from the positional address, if one was given.
    pub fn listen_addr(&self) -> Result<(Option<String>, Option<u16>), ConfigError> {
        match &self.addr {
            Some(addr) => parse_listen_addr(addr).map(|(host, port)| (host, Some(port))),
            None => Ok((None, None)),
        }
    }
}

/// Split `port` or `host:port` into its parts.
pub fn parse_listen_addr(addr: &str) -> Result<(Option<String>, u16), ConfigError> {
    let invalid = || ConfigError::InvalidAddress(addr.to_string());

    match addr.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().map_err(|_| invalid())?;
            if host.is_empty() {
                Ok((None, port))
            } else {
                Ok((Some(host.to_string()), port))
            }
        }
        None => addr.parse().map(|port| (None, port)).map_err(|_| invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_port() {
        assert_eq!(parse_listen_addr("6970").unwrap(), (None, 6970));
    }

    #[test]
    fn test_parse_host_port() {
        assert_eq!(
            parse_listen_addr("0.0.0.0:7000").unwrap(),
            (Some("0.0.0.0".to_string()), 7000)
        );
        assert_eq!(parse_listen_addr(":7000").unwrap(), (None, 7000));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_listen_addr("localhost").is_err());
        assert!(parse_listen_addr("localhost:http").is_err());
        assert!(parse_listen_addr("99999").is_err());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "courier-kv",
            "localhost:7001",
            "--queue-capacity",
            "64",
            "--max-replica-failures",
            "3",
            "-v",
        ])
        .unwrap();

        assert_eq!(
            cli.listen_addr().unwrap(),
            (Some("localhost".to_string()), Some(7001))
        );
        assert_eq!(cli.queue_capacity, Some(64));
        assert_eq!(cli.max_replica_failures, Some(3));
        assert!(cli.verbose);
        assert!(!cli.keep_stale_subscriptions);
    }
}
