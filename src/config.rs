//! Server configuration.
//!
//! [`ServerConfig`] is a plain value handed to [`Server::new`](crate::Server::new)
//! and from there to the dispatch loop and codec; nothing reads it from
//! process-wide state. It deserializes with serde (every field optional,
//! falling back to [`ServerConfig::default`]) and is checked by
//! [`ServerConfig::validate`] before anything starts serving.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::Format;

/// Default URL path the upgrade route listens on.
pub const DEFAULT_PATH: &str = "/";

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default bind host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default connection pool capacity.
pub const DEFAULT_POOL_CAPACITY: usize = 128;

/// Errors raised while validating configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Port outside 1-65535.
    #[error("invalid port {0}: must be between 1 and 65535")]
    InvalidPort(u32),

    /// Format name other than json/msgpack/binary.
    #[error("unsupported format {0:?}: expected \"json\" or \"msgpack\"")]
    UnsupportedFormat(String),

    /// Route path that is not absolute or contains captures or wildcards.
    #[error("invalid path {0:?}: must start with '/' and contain no captures or wildcards")]
    InvalidPath(String),

    /// Host/port pair that does not form a socket address.
    #[error("invalid bind address {0:?}")]
    InvalidAddress(String),
}

/// Configuration for one server instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// URL path that accepts WebSocket upgrades.
    pub path: String,
    /// TCP port.
    pub port: u16,
    /// Log per-connection activity.
    pub verbose: bool,
    /// Wire format for requests and responses.
    pub format: Format,
    /// Number of pooled connection slots; `0` disables pooling.
    pub pool_capacity: usize,
    /// Close a connection when no frame arrives within this many seconds.
    #[serde(rename = "read_timeout_secs", with = "secs_opt")]
    pub read_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            path: DEFAULT_PATH.to_string(),
            port: DEFAULT_PORT,
            verbose: false,
            format: Format::default(),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            read_timeout: None,
        }
    }
}

impl ServerConfig {
    /// Check the configuration before the server starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(0));
        }
        if !is_plain_path(&self.path) {
            return Err(ConfigError::InvalidPath(self.path.clone()));
        }
        self.bind_addr()?;
        Ok(())
    }

    /// Socket address built from `host` and `port`.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|_| ConfigError::InvalidAddress(raw))
    }

    /// Default tracing filter for this configuration.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "wsrpc=debug,info"
        } else {
            "info"
        }
    }

    /// Parse a port given as text, as it arrives from flags or environment.
    pub fn parse_port(raw: &str) -> Result<u16, ConfigError> {
        let value: u32 = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidPort(0))?;
        match u16::try_from(value) {
            Ok(port) if port != 0 => Ok(port),
            _ => Err(ConfigError::InvalidPort(value)),
        }
    }
}

/// A literal route: absolute, with no captures or wildcards for the router
/// to interpret.
fn is_plain_path(path: &str) -> bool {
    path.starts_with('/')
        && !path.contains(['{', '}'])
        && !path
            .split('/')
            .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
}

mod secs_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}
