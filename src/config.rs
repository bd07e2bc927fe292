use crate::cli::Cli;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Main configuration combining server, replication, and subscription settings.
///
/// Can be loaded from files, env vars, or CLI args with precedence order:
/// CLI > File > Environment > Defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub replication: ReplicationConfig,
    #[serde(default)]
    pub subscriptions: SubscriptionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    6969
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Pending change records allowed before handlers wait. `None` is unbounded.
    #[serde(default)]
    pub queue_capacity: Option<usize>,
    /// Failed deliveries in a row before a replica is dropped. `None` keeps it forever.
    #[serde(default)]
    pub max_consecutive_failures: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    #[serde(default = "default_prune")]
    pub prune_on_disconnect: bool,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            prune_on_disconnect: default_prune(),
        }
    }
}

fn default_prune() -> bool {
    true
}

impl Config {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from any variable lookup (the process environment in
    /// production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("COURIER_HOST") {
            config.server.host = host;
        }

        if let Some(port) = parse_var(&lookup, "COURIER_PORT")? {
            config.server.port = port;
        }

        if let Some(capacity) = parse_var(&lookup, "COURIER_QUEUE_CAPACITY")? {
            config.replication.queue_capacity = Some(capacity);
        }

        if let Some(limit) = parse_var(&lookup, "COURIER_MAX_REPLICA_FAILURES")? {
            config.replication.max_consecutive_failures = Some(limit);
        }

        Ok(config)
    }

    /// Create config with CLI args taking precedence over file and environment.
    ///
    /// Precedence: CLI > File > Environment > Defaults
    pub fn from_sources(cli: &Cli) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;

        let file_config = cli
            .config
            .as_ref()
            .map(Self::load_from_file)
            .transpose()?;
        let base = file_config.unwrap_or(env_config);

        let (addr_host, addr_port) = cli.listen_addr()?;

        let server = ServerConfig {
            host: cli
                .host
                .clone()
                .or(addr_host)
                .unwrap_or_else(|| base.server.host.clone()),
            port: cli.port.or(addr_port).unwrap_or(base.server.port),
        };

        let replication = ReplicationConfig {
            queue_capacity: cli.queue_capacity.or(base.replication.queue_capacity),
            max_consecutive_failures: cli
                .max_replica_failures
                .or(base.replication.max_consecutive_failures),
        };

        let subscriptions = SubscriptionConfig {
            prune_on_disconnect: !cli.keep_stale_subscriptions
                && base.subscriptions.prune_on_disconnect,
        };

        let config = Config {
            server,
            replication,
            subscriptions,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Validation("host must not be empty".to_string()));
        }
        if self.replication.queue_capacity == Some(0) {
            return Err(ConfigError::Validation(
                "replication queue capacity must be greater than zero".to_string(),
            ));
        }
        if self.replication.max_consecutive_failures == Some(0) {
            return Err(ConfigError::Validation(
                "max consecutive replica failures must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            ConfigError::Validation(format!("{} has an invalid value: {}", name, raw))
        }),
        None => Ok(None),
    }
}
