//! Node configuration loaded from environment variables.
//!
//! All settings come from environment variables (or a `.env` file via
//! `dotenvy`). A started websocket server takes a [`ServerConfig`]
//! snapshot derived from [`NodeConfig`] and the requested port.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Port used when an `open_websocket` command carries no usable `port`.
pub const DEFAULT_PORT: u16 = 9090;

/// Top-level node configuration.
///
/// Loaded once per host instance via [`NodeConfig::from_env`].
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Port used when a start request does not name one.
    pub default_port: u16,

    /// Interface the websocket server binds to.
    pub bind_host: IpAddr,

    /// Outbound frames buffered per connection before broadcasts drop.
    pub outbound_buffer: usize,

    /// Worker threads for the server runtime (`0` = tokio default).
    pub worker_threads: usize,

    /// How long browsers may cache a CORS preflight answer.
    pub cors_max_age: Duration,
}

impl NodeConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set or invalid.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `WS_BIND_HOST` is set but cannot be parsed as
    /// an [`IpAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let bind_host: IpAddr = match std::env::var("WS_BIND_HOST") {
            Ok(raw) => raw.parse()?,
            Err(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        Ok(Self {
            default_port: parse_env("WS_DEFAULT_PORT", DEFAULT_PORT),
            bind_host,
            outbound_buffer: parse_env("WS_OUTBOUND_BUFFER", 256_usize).max(1),
            worker_threads: parse_env("WS_WORKER_THREADS", 0),
            cors_max_age: Duration::from_secs(parse_env("WS_CORS_MAX_AGE_SECS", 600)),
        })
    }

    /// Builds the immutable settings for one server started on `port`.
    #[must_use]
    pub fn server_config(&self, port: u16) -> ServerConfig {
        ServerConfig {
            host: self.bind_host,
            port,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_PORT,
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            outbound_buffer: 256,
            worker_threads: 0,
            cors_max_age: Duration::from_secs(600),
        }
    }
}

/// Listening settings of a single websocket server. Fixed once started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: IpAddr,
    /// Requested port; `0` asks the OS for an ephemeral one.
    pub port: u16,
}

impl ServerConfig {
    /// Socket address the listener binds to.
    #[must_use]
    pub const fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
