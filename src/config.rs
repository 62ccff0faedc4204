//! Configuration
//!
//! Settings come from an optional TOML file, then the process environment:
//! `REDIS_HOST`, `REDIS_PORT` and `REDIS_PASSWORD` override the
//! `[connection]` section. Variables missing from the environment are also
//! looked up in `.env` in the working directory, if present. Missing
//! connection values are a startup error.
//!
//! ```toml
//! [connection]
//! host = "127.0.0.1"
//! port = 6379
//! password = "secret"
//!
//! [producer]
//! max_len = 10000
//!
//! [consumer]
//! block_ms = 2000
//!
//! [consumer.retry]
//! initial_backoff_ms = 100
//! max_backoff_ms = 30000
//!
//! [acknowledge]
//! trim_len = 1000
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ack::DEFAULT_TRIM_LEN;
use crate::connection::ConnectionConfig;
use crate::entry::Retention;
use crate::error::{Error, Result};
use crate::producer::DEFAULT_MAX_LEN;
use crate::reader::ReaderConfig;

/// Dotenv file consulted by [`Config::load`].
pub const ENV_FILE: &str = ".env";
/// Environment variable holding the broker host.
pub const ENV_HOST: &str = "REDIS_HOST";
/// Environment variable holding the broker port.
pub const ENV_PORT: &str = "REDIS_PORT";
/// Environment variable holding the broker password.
pub const ENV_PASSWORD: &str = "REDIS_PASSWORD";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker connection
    pub connection: ConnectionSettings,

    /// Append retention
    pub producer: ProducerConfig,

    /// Consumer group reader
    pub consumer: ReaderConfig,

    /// Acknowledge trimming
    pub acknowledge: AcknowledgeConfig,

    /// Logging
    pub logging: LoggingConfig,
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Broker host
    pub host: Option<String>,
    /// Broker port
    pub port: Option<u16>,
    /// ACL username
    pub username: Option<String>,
    /// Password for AUTH
    pub password: Option<String>,
    /// Refuse to start without a password
    pub require_password: bool,
    /// Database index
    pub database: u8,
    /// Connect plus handshake timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Maximum pooled connections
    pub pool_size: usize,
    /// Use TLS (requires the `tls` feature)
    pub tls: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            username: None,
            password: None,
            require_password: true,
            database: 0,
            connect_timeout_ms: 5_000,
            pool_size: 8,
            tls: false,
        }
    }
}

/// Producer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Approximate maximum stream length kept on append
    pub max_len: usize,
    /// Trim lazily (`MAXLEN ~`)
    pub approximate: bool,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            max_len: DEFAULT_MAX_LEN,
            approximate: true,
        }
    }
}

impl ProducerConfig {
    /// Retention applied on append.
    pub fn retention(&self) -> Retention {
        Retention {
            max_len: self.max_len,
            approximate: self.approximate,
        }
    }
}

/// Acknowledger settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcknowledgeConfig {
    /// Approximate stream length kept after acknowledging
    pub trim_len: usize,
    /// Trim lazily (`MAXLEN ~`)
    pub approximate: bool,
}

impl Default for AcknowledgeConfig {
    fn default() -> Self {
        Self {
            trim_len: DEFAULT_TRIM_LEN,
            approximate: true,
        }
    }
}

impl AcknowledgeConfig {
    /// Retention applied on acknowledge.
    pub fn retention(&self) -> Retention {
        Retention {
            max_len: self.trim_len,
            approximate: self.approximate,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (pretty, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format
    #[default]
    Pretty,

    /// JSON format
    Json,
}

/// Read `KEY=value` pairs from a dotenv file without touching the process
/// environment. A missing file yields no variables.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let invalid = |e: dotenvy::Error| Error::Config(format!("{}: {}", path.display(), e));
    match dotenvy::from_path_iter(path) {
        Ok(iter) => iter.collect::<std::result::Result<_, _>>().map_err(invalid),
        Err(e) if e.not_found() => Ok(HashMap::new()),
        Err(e) => Err(invalid(e)),
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file {:?}: {}", path, e)))?;

        Self::parse_str(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn parse_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load `path` if given, apply the environment (then `.env`) and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let dotenv = read_env_file(Path::new(ENV_FILE))?;
        config.apply_env(|name| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .or_else(|| dotenv.get(name).cloned())
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Override connection settings from `lookup` (normally the environment).
    /// Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(host) = var(ENV_HOST) {
            self.connection.host = Some(host);
        }
        if let Some(port) = var(ENV_PORT) {
            let port = port.parse().map_err(|_| {
                Error::Config(format!("{} is not a valid port: {:?}", ENV_PORT, port))
            })?;
            self.connection.port = Some(port);
        }
        if let Some(password) = var(ENV_PASSWORD) {
            self.connection.password = Some(password);
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let conn = &self.connection;
        match conn.host.as_deref() {
            None | Some("") => {
                return Err(Error::Config(format!(
                    "Broker host is not set (connection.host or {})",
                    ENV_HOST
                )))
            }
            _ => {}
        }
        match conn.port {
            None => {
                return Err(Error::Config(format!(
                    "Broker port is not set (connection.port or {})",
                    ENV_PORT
                )))
            }
            Some(0) => return Err(Error::Config("Port cannot be 0".to_string())),
            _ => {}
        }
        if conn.require_password && conn.password.as_deref().map_or(true, str::is_empty) {
            return Err(Error::Config(format!(
                "Broker password is not set (connection.password or {})",
                ENV_PASSWORD
            )));
        }
        if conn.pool_size == 0 {
            return Err(Error::Config("Pool size cannot be 0".to_string()));
        }

        if self.producer.max_len == 0 {
            return Err(Error::Config("producer.max_len cannot be 0".to_string()));
        }
        if self.acknowledge.trim_len == 0 {
            return Err(Error::Config("acknowledge.trim_len cannot be 0".to_string()));
        }

        // BLOCK 0 waits forever and would hide shutdown.
        if self.consumer.block_ms == 0 {
            return Err(Error::Config("consumer.block_ms cannot be 0".to_string()));
        }
        if self.consumer.channel_capacity == 0 {
            return Err(Error::Config(
                "consumer.channel_capacity cannot be 0".to_string(),
            ));
        }
        if self.consumer.batch_size == Some(0) {
            return Err(Error::Config("consumer.batch_size cannot be 0".to_string()));
        }
        let retry = &self.consumer.retry;
        if retry.multiplier < 1.0 {
            return Err(Error::Config(
                "consumer.retry.multiplier must be at least 1.0".to_string(),
            ));
        }
        if retry.initial_backoff_ms > retry.max_backoff_ms {
            return Err(Error::Config(
                "consumer.retry.initial_backoff_ms exceeds max_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Connection settings for [`StreamClient::connect`](crate::StreamClient::connect).
    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        self.validate()?;
        let conn = &self.connection;
        let (Some(host), Some(port)) = (conn.host.clone(), conn.port) else {
            return Err(Error::Config("Broker address is not set".to_string()));
        };
        Ok(ConnectionConfig {
            host,
            port,
            username: conn.username.clone(),
            password: conn.password.clone().filter(|p| !p.is_empty()),
            database: conn.database,
            connect_timeout: Duration::from_millis(conn.connect_timeout_ms),
            pool_size: conn.pool_size,
            tls: conn.tls,
            ..ConnectionConfig::default()
        })
    }
}
