//! Server configuration.
//!
//! Everything is read once at startup. [`ServerConfig::new`] takes the one
//! setting with no sensible default (the token config, which carries the
//! signing secret) and fills in the rest; fields are public so callers can
//! override them before building the server.

use std::time::Duration;

use gatehouse_auth::{ConfigError, TokenConfig};

/// Environment variable holding the listen address.
pub const BIND_ADDR_ENV: &str = "GATEHOUSE_BIND_ADDR";
/// Environment variable holding the WebSocket path.
pub const ENDPOINT_ENV: &str = "GATEHOUSE_ENDPOINT";
/// Environment variable holding the comma-separated origin allow list.
pub const ALLOWED_ORIGINS_ENV: &str = "GATEHOUSE_ALLOWED_ORIGINS";
/// Environment variable holding the idle read timeout in seconds.
pub const IDLE_TIMEOUT_ENV: &str = "GATEHOUSE_IDLE_TIMEOUT_SECS";

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
/// Default WebSocket path.
pub const DEFAULT_ENDPOINT: &str = "/ws";
/// Default upper bound on the upgrade handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Which browser origins may open a connection.
///
/// Only consulted when the upgrade request carries an `Origin` header;
/// non-browser clients that send none are not affected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AllowedOrigins {
    /// Every origin is accepted (`*`).
    #[default]
    Any,
    /// Only these exact origins are accepted.
    List(Vec<String>),
}

impl AllowedOrigins {
    /// Parses `*` or a comma-separated list. Blank entries are skipped.
    pub fn parse(raw: &str) -> Self {
        let entries: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_owned)
            .collect();
        if entries.iter().any(|entry| entry == "*") {
            Self::Any
        } else {
            Self::List(entries)
        }
    }

    /// Returns `true` if `origin` may connect.
    pub fn permits(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(list) => list.iter().any(|allowed| allowed == origin),
        }
    }
}

/// Settings for a [`GatehouseServer`](crate::GatehouseServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on, e.g. `0.0.0.0:8080`.
    pub bind_addr: String,
    /// Request path the WebSocket endpoint is served on.
    pub endpoint: String,
    /// Browser origins allowed to connect.
    pub allowed_origins: AllowedOrigins,
    /// Close a connection after this long without an inbound frame.
    /// `None` waits forever.
    pub idle_timeout: Option<Duration>,
    /// Upper bound on the upgrade handshake of a single peer.
    pub handshake_timeout: Duration,
    /// Signing secret and token lifetime.
    pub token: TokenConfig,
}

impl ServerConfig {
    /// Creates a config with default network settings.
    pub fn new(token: TokenConfig) -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_owned(),
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            allowed_origins: AllowedOrigins::Any,
            idle_timeout: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            token,
        }
    }

    /// Reads the whole configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a caller-supplied lookup.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::new(TokenConfig::from_lookup(&lookup)?);

        if let Some(addr) = lookup(BIND_ADDR_ENV) {
            config.bind_addr = addr.trim().to_owned();
        }
        if let Some(endpoint) = lookup(ENDPOINT_ENV) {
            let endpoint = endpoint.trim();
            if !endpoint.starts_with('/') {
                return Err(ConfigError::Invalid {
                    key: ENDPOINT_ENV,
                    reason: "path must start with '/'".to_owned(),
                });
            }
            config.endpoint = endpoint.to_owned();
        }
        if let Some(origins) = lookup(ALLOWED_ORIGINS_ENV) {
            config.allowed_origins = AllowedOrigins::parse(&origins);
        }
        if let Some(raw) = lookup(IDLE_TIMEOUT_ENV) {
            let secs: u64 =
                raw.trim().parse().map_err(|e| ConfigError::Invalid {
                    key: IDLE_TIMEOUT_ENV,
                    reason: format!("{e}"),
                })?;
            config.idle_timeout =
                (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(config)
    }
}
