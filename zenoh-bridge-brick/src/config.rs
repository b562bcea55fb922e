//! Configuration for the brick bridge.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Zenoh connection settings
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Brick daemon connection settings
    #[serde(default)]
    pub bus: BusConfig,

    /// Upstream identity and publish settings
    pub cloud: CloudConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Zenoh connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZenohConfig {
    /// Zenoh mode: "client", "peer", or "router".
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Endpoints to connect to. When empty in client mode, an endpoint is
    /// derived from the connection string's host.
    #[serde(default)]
    pub connect: Vec<String>,

    /// Endpoints to listen on.
    #[serde(default)]
    pub listen: Vec<String>,
}

fn default_mode() -> String {
    "peer".to_string()
}

impl Default for ZenohConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            connect: Vec::new(),
            listen: Vec::new(),
        }
    }
}

/// Where the brick daemon lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_bus_host")]
    pub host: String,

    #[serde(default = "default_bus_port")]
    pub port: u16,
}

fn default_bus_host() -> String {
    "localhost".to_string()
}

fn default_bus_port() -> u16 {
    4223
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host: default_bus_host(),
            port: default_bus_port(),
        }
    }
}

/// Upstream settings: identity, key space and publish behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Device identity of the shape
    /// `HostName=<host>;DeviceId=<id>;SharedAccessKey=<key>;`
    pub connection_string: String,

    /// Key expression prefix (default: "brick")
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Sampling period in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// How long an in-flight reading may wait for its publish confirmation
    /// before it is counted as lost, in milliseconds
    #[serde(default = "default_message_expiry_ms")]
    pub message_expiry_ms: u64,

    /// Log full outbound payloads
    #[serde(default)]
    pub verbose_trace: bool,
}

fn default_key_prefix() -> String {
    "brick".to_string()
}

fn default_interval_secs() -> u64 {
    60
}

fn default_message_expiry_ms() -> u64 {
    10_000
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl BridgeConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration. Runs before anything connects, so a bad
    /// connection string aborts startup without touching either transport.
    pub fn validate(&self) -> Result<(), ConfigError> {
        DeviceIdentity::parse(&self.cloud.connection_string)?;

        if self.cloud.key_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "key_prefix cannot be empty".to_string(),
            ));
        }

        if self.cloud.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "interval_secs must be at least 1".to_string(),
            ));
        }

        match self.zenoh.mode.as_str() {
            "client" | "peer" | "router" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "invalid zenoh mode '{other}' (use client, peer, or router)"
            ))),
        }
    }
}

/// Identity of this device towards the broker, parsed from the connection
/// string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub host: String,
    pub device_id: String,
    pub shared_access_key: String,
}

impl DeviceIdentity {
    /// Parse and validate a connection string of the fixed shape
    /// `HostName=<host>;DeviceId=<id>;SharedAccessKey=<key>;`.
    pub fn parse(connection_string: &str) -> Result<Self, ConfigError> {
        let pattern = Regex::new(r"^HostName=([^;]+);DeviceId=([^;]+);SharedAccessKey=([^;]+);$")
            .map_err(|e| ConfigError::Validation(format!("identity pattern: {e}")))?;

        let captures = pattern.captures(connection_string).ok_or_else(|| {
            ConfigError::Validation(
                "connection string must match HostName=<host>;DeviceId=<id>;SharedAccessKey=<key>;"
                    .to_string(),
            )
        })?;

        Ok(Self {
            host: captures[1].to_string(),
            device_id: captures[2].to_string(),
            shared_access_key: captures[3].to_string(),
        })
    }
}
