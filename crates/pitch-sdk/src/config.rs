//! Process configuration.
//!
//! Configuration is loaded from environment variables. Tokens are redacted
//! in Debug output.
//!
//! | Variable | Used by | Default |
//! |----------|---------|---------|
//! | `PITCH_BIND_HOST` | authority | `0.0.0.0` |
//! | `PITCH_SERVER_HOST` | peer | `localhost` |
//! | `PITCH_CONTROL_PORT` | both | `14514` |
//! | `PITCH_STREAMING_PORT` | both | `14515` |
//! | `PITCH_CLIENTS` | authority | required, `token=team,...` |
//! | `PITCH_TOKEN` | peer | required |
//! | `PITCH_QUEUE_CAPACITY` | authority | `10` |
//! | `PITCH_WIRE_FORMAT` | both | `bson` |
//! | `PITCH_CONTROL_POLL_MS` | peer | `50` |
//! | `PITCH_STREAMING_POLL_MS` | peer | `50` |
//! | `PITCH_HEARTBEAT_MS` | peer | `1000` |
//! | `PITCH_REQUEST_TEAM_INFO` | peer | `false` |
//! | `PITCH_MATCH_SECONDS` | authority | `600` |
//! | `PITCH_METRICS_BIND_ADDRESS` | authority | unset (no exporter) |

use crate::registry::ClientRegistry;
use common::secret::SecretString;
use pitch_protocol::WireFormat;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;

/// Default control channel port.
pub const DEFAULT_CONTROL_PORT: u16 = 14514;

/// Default streaming channel port.
pub const DEFAULT_STREAMING_PORT: u16 = 14515;

/// Default per-token queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Default polling interval in milliseconds, both channels.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Default heartbeat interval in milliseconds.
pub const DEFAULT_HEARTBEAT_MS: u64 = 1000;

/// Default match length in seconds.
pub const DEFAULT_MATCH_SECONDS: u64 = 600;

/// Default authority host for peers.
pub const DEFAULT_SERVER_HOST: &str = "localhost";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid port configuration: {0}")]
    InvalidPort(String),

    #[error("Invalid client registry: {0}")]
    InvalidRegistry(String),

    #[error("Invalid queue capacity: {0}")]
    InvalidQueueCapacity(String),

    #[error("Invalid interval configuration: {0}")]
    InvalidInterval(String),

    #[error("Invalid wire format: {0}")]
    InvalidWireFormat(String),

    #[error("Invalid boolean configuration: {0}")]
    InvalidBool(String),

    #[error("Invalid address configuration: {0}")]
    InvalidAddress(String),

    #[error("Invalid match duration: {0}")]
    InvalidMatchDuration(String),
}

/// Authority configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface both channels listen on (default: all interfaces).
    pub bind_host: IpAddr,

    /// Control channel port (default: 14514).
    pub control_port: u16,

    /// Streaming channel port (default: 14515).
    pub streaming_port: u16,

    /// Registered clients.
    pub registry: ClientRegistry,

    /// Per-token queue capacity (default: 10).
    pub queue_capacity: usize,

    /// Body encoding (default: BSON).
    pub wire_format: WireFormat,

    /// Match length used by the referee binary (default: 600s).
    pub match_duration: Duration,

    /// Prometheus exporter address; no exporter when unset.
    pub metrics_bind_address: Option<SocketAddr>,
}

impl ServerConfig {
    /// Configuration with defaults for everything but the registry.
    #[must_use]
    pub fn new(registry: ClientRegistry) -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            control_port: DEFAULT_CONTROL_PORT,
            streaming_port: DEFAULT_STREAMING_PORT,
            registry,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            wire_format: WireFormat::default(),
            match_duration: Duration::from_secs(DEFAULT_MATCH_SECONDS),
            metrics_bind_address: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`ServerConfig::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `PITCH_CLIENTS` is missing or any value
    /// fails validation.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let registry = ClientRegistry::parse(
            vars.get("PITCH_CLIENTS")
                .ok_or_else(|| ConfigError::MissingEnvVar("PITCH_CLIENTS".to_string()))?,
        )?;

        let bind_host = match vars.get("PITCH_BIND_HOST") {
            Some(value) => value.parse().map_err(|e| {
                ConfigError::InvalidAddress(format!(
                    "PITCH_BIND_HOST must be an IP address, got '{value}': {e}"
                ))
            })?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        let (control_port, streaming_port) = parse_ports(vars)?;

        let queue_capacity = if let Some(value_str) = vars.get("PITCH_QUEUE_CAPACITY") {
            let value: usize = value_str.parse().map_err(|e| {
                ConfigError::InvalidQueueCapacity(format!(
                    "PITCH_QUEUE_CAPACITY must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidQueueCapacity(
                    "PITCH_QUEUE_CAPACITY must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_QUEUE_CAPACITY
        };

        let match_duration = if let Some(value_str) = vars.get("PITCH_MATCH_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidMatchDuration(format!(
                    "PITCH_MATCH_SECONDS must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidMatchDuration(
                    "PITCH_MATCH_SECONDS must be greater than 0".to_string(),
                ));
            }

            Duration::from_secs(value)
        } else {
            Duration::from_secs(DEFAULT_MATCH_SECONDS)
        };

        let metrics_bind_address = vars
            .get("PITCH_METRICS_BIND_ADDRESS")
            .map(|value| {
                value.parse().map_err(|e| {
                    ConfigError::InvalidAddress(format!(
                        "PITCH_METRICS_BIND_ADDRESS must be host:port, got '{value}': {e}"
                    ))
                })
            })
            .transpose()?;

        Ok(Self {
            bind_host,
            control_port,
            streaming_port,
            registry,
            queue_capacity,
            wire_format: parse_wire_format(vars)?,
            match_duration,
            metrics_bind_address,
        })
    }

    /// Listening address of the control channel.
    #[must_use]
    pub fn control_address(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.control_port)
    }

    /// Listening address of the streaming channel.
    #[must_use]
    pub fn streaming_address(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.streaming_port)
    }
}

/// Peer configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Authority host name or address (default: "localhost").
    pub server_host: String,

    /// Control channel port (default: 14514).
    pub control_port: u16,

    /// Streaming channel port (default: 14515).
    pub streaming_port: u16,

    /// Bearer token for both channels.
    /// Protected by `SecretString` to prevent accidental logging.
    pub token: SecretString,

    /// Body encoding (default: BSON).
    pub wire_format: WireFormat,

    /// Control channel polling interval (default: 50ms).
    pub control_poll_interval: Duration,

    /// Streaming channel polling interval (default: 50ms).
    pub streaming_poll_interval: Duration,

    /// Interval between game info requests (default: 1s).
    pub heartbeat_interval: Duration,

    /// Whether each heartbeat also requests team info (default: false).
    pub request_team_info: bool,
}

impl ClientConfig {
    /// Configuration with defaults for everything but the token.
    #[must_use]
    pub fn new(token: SecretString) -> Self {
        Self {
            server_host: DEFAULT_SERVER_HOST.to_string(),
            control_port: DEFAULT_CONTROL_PORT,
            streaming_port: DEFAULT_STREAMING_PORT,
            token,
            wire_format: WireFormat::default(),
            control_poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            streaming_poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
            request_team_info: false,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `PITCH_TOKEN` is missing or any value
    /// fails validation.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let token = vars
            .get("PITCH_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .map(|t| SecretString::from(t.trim().to_string()))
            .ok_or_else(|| ConfigError::MissingEnvVar("PITCH_TOKEN".to_string()))?;

        let server_host = vars
            .get("PITCH_SERVER_HOST")
            .cloned()
            .unwrap_or_else(|| DEFAULT_SERVER_HOST.to_string());

        let (control_port, streaming_port) = parse_ports(vars)?;

        let request_team_info = match vars.get("PITCH_REQUEST_TEAM_INFO") {
            Some(value) => parse_bool("PITCH_REQUEST_TEAM_INFO", value)?,
            None => false,
        };

        Ok(Self {
            server_host,
            control_port,
            streaming_port,
            token,
            wire_format: parse_wire_format(vars)?,
            control_poll_interval: parse_millis(vars, "PITCH_CONTROL_POLL_MS", DEFAULT_POLL_INTERVAL_MS)?,
            streaming_poll_interval: parse_millis(
                vars,
                "PITCH_STREAMING_POLL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )?,
            heartbeat_interval: parse_millis(vars, "PITCH_HEARTBEAT_MS", DEFAULT_HEARTBEAT_MS)?,
            request_team_info,
        })
    }

    /// Check the fields `from_vars` would have rejected.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidInterval`] if any interval is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, interval) in [
            ("control_poll_interval", self.control_poll_interval),
            ("streaming_poll_interval", self.streaming_poll_interval),
            ("heartbeat_interval", self.heartbeat_interval),
        ] {
            if interval.is_zero() {
                return Err(ConfigError::InvalidInterval(format!(
                    "{name} must be greater than 0"
                )));
            }
        }
        Ok(())
    }

    /// Control channel endpoint.
    #[must_use]
    pub fn control_url(&self) -> String {
        format!("http://{}:{}/", self.server_host, self.control_port)
    }

    /// Streaming channel endpoint.
    #[must_use]
    pub fn streaming_url(&self) -> String {
        format!("http://{}:{}/", self.server_host, self.streaming_port)
    }
}

/// Custom Debug implementation that redacts the token.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server_host", &self.server_host)
            .field("control_port", &self.control_port)
            .field("streaming_port", &self.streaming_port)
            .field("token", &"[REDACTED]")
            .field("wire_format", &self.wire_format)
            .field("control_poll_interval", &self.control_poll_interval)
            .field("streaming_poll_interval", &self.streaming_poll_interval)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("request_team_info", &self.request_team_info)
            .finish()
    }
}

fn parse_ports(vars: &HashMap<String, String>) -> Result<(u16, u16), ConfigError> {
    let control_port = parse_port(vars, "PITCH_CONTROL_PORT", DEFAULT_CONTROL_PORT)?;
    let streaming_port = parse_port(vars, "PITCH_STREAMING_PORT", DEFAULT_STREAMING_PORT)?;

    if control_port == streaming_port && control_port != 0 {
        return Err(ConfigError::InvalidPort(format!(
            "control and streaming channels must use different ports, both are {control_port}"
        )));
    }

    Ok((control_port, streaming_port))
}

fn parse_port(vars: &HashMap<String, String>, key: &str, default: u16) -> Result<u16, ConfigError> {
    match vars.get(key) {
        Some(value_str) => value_str.parse().map_err(|e| {
            ConfigError::InvalidPort(format!(
                "{key} must be a port number, got '{value_str}': {e}"
            ))
        }),
        None => Ok(default),
    }
}

fn parse_millis(
    vars: &HashMap<String, String>,
    key: &str,
    default_ms: u64,
) -> Result<Duration, ConfigError> {
    let Some(value_str) = vars.get(key) else {
        return Ok(Duration::from_millis(default_ms));
    };

    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidInterval(format!(
            "{key} must be a valid positive integer, got '{value_str}': {e}"
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidInterval(format!(
            "{key} must be greater than 0"
        )));
    }

    Ok(Duration::from_millis(value))
}

fn parse_wire_format(vars: &HashMap<String, String>) -> Result<WireFormat, ConfigError> {
    match vars.get("PITCH_WIRE_FORMAT") {
        Some(value) => value.parse().map_err(ConfigError::InvalidWireFormat),
        None => Ok(WireFormat::default()),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool(format!(
            "{key} must be true or false, got '{value}'"
        ))),
    }
}
