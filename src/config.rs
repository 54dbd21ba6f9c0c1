//! Configuration parsing for enclave-ack.toml files.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::handler::ConnectionSettings;
use crate::request::{DEFAULT_MAX_BODY_BYTES, ParseLimits};
use crate::server::{DEFAULT_MAX_CONNECTIONS, ServerOptions};
use crate::transport::{Address, DEFAULT_PORT, ENCLAVE_CID};

/// Root configuration structure matching the enclave-ack.toml schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Context ID to bind (4294967295 = any)
    #[serde(default = "default_cid")]
    pub cid: u32,
    #[serde(default = "default_port")]
    pub port: u32,
    /// Maximum connections served at once
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            cid: default_cid(),
            port: default_port(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_cid() -> u32 {
    ENCLAVE_CID
}

fn default_port() -> u32 {
    DEFAULT_PORT
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Seconds allowed for a peer to deliver its request (0 = no limit)
    #[serde(default)]
    pub read_timeout_secs: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_timeout_secs: 0,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_max_body_bytes() -> u64 {
    DEFAULT_MAX_BODY_BYTES
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Seconds to wait for in-flight connections (0 = don't wait)
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

fn default_drain_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Multi-line events with source locations
    #[default]
    Pretty,
    /// One line per event
    Compact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// tracing-subscriber filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_filter() -> String {
    "enclave_ack=info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.listener.max_connections == 0 {
            bail!("listener.max_connections must be at least 1");
        }
        if self.listener.max_connections > u32::MAX as usize {
            bail!("listener.max_connections is too large");
        }
        if self.logging.filter.trim().is_empty() {
            bail!("logging.filter must not be empty");
        }
        Ok(())
    }

    /// The vsock address to bind.
    pub fn address(&self) -> Address {
        Address::new(self.listener.cid, self.listener.port)
    }

    /// Server options derived from this configuration.
    pub fn server_options(&self) -> ServerOptions {
        let read_timeout = match self.connection.read_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        ServerOptions {
            max_connections: self.listener.max_connections,
            drain_timeout: Duration::from_secs(self.shutdown.drain_timeout_secs),
            connection: ConnectionSettings {
                limits: ParseLimits {
                    max_body_bytes: self.connection.max_body_bytes,
                },
                read_timeout,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::CID_ANY;

    #[test]
    fn test_parse_empty_config() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.listener.cid, 16);
        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.listener.max_connections, 256);
        assert_eq!(config.connection.read_timeout_secs, 0);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [listener]
            cid = 4294967295
            port = 5005
            max_connections = 8

            [connection]
            read_timeout_secs = 30
            max_body_bytes = 1024

            [shutdown]
            drain_timeout_secs = 0

            [logging]
            filter = "enclave_ack=debug"
            format = "compact"
        "#;
        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.address(), Address::new(CID_ANY, 5005));
        assert_eq!(config.logging.format, LogFormat::Compact);

        let options = config.server_options();
        assert_eq!(options.max_connections, 8);
        assert_eq!(options.drain_timeout, Duration::ZERO);
        assert_eq!(
            options.connection.read_timeout,
            Some(Duration::from_secs(30))
        );
        assert_eq!(options.connection.limits.max_body_bytes, 1024);
    }

    #[test]
    fn test_zero_read_timeout_means_none() {
        let config = Config::default();
        assert_eq!(config.server_options().connection.read_timeout, None);
    }

    #[test]
    fn test_reject_zero_connections() {
        let err = Config::from_str("[listener]\nmax_connections = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_connections"));
    }

    #[test]
    fn test_reject_unknown_log_format() {
        assert!(Config::from_str("[logging]\nformat = \"xml\"\n").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enclave-ack.toml");
        std::fs::write(&path, "[listener]\nport = 9000\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.listener.port, 9000);
        assert_eq!(config.listener.cid, 16);
    }

    #[test]
    fn test_from_missing_file() {
        let err = Config::from_file(Path::new("/nonexistent/enclave-ack.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
