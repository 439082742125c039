//! Tracing subscriber setup.

use std::io::{self, IsTerminal};

use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise the filter comes from
/// [`ServerConfig::log_filter`]. Calling this more than once is harmless: only
/// the first call installs a subscriber, later calls report `false`.
pub fn init(config: &ServerConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .try_init()
        .is_ok()
}
