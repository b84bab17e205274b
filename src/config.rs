//! Configuration management
//!
//! Handles loading and validating connection options from TOML files.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionOptions,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Options used to establish a session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionOptions {
    /// Server host name or address
    #[serde(default = "default_host")]
    pub host: String,
    /// X Protocol port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Unix socket path (empty = TCP)
    #[serde(default)]
    pub socket: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Default schema
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub ssl: SslOptions,
    /// Hostname resolution mode
    #[serde(default)]
    pub ip_mode: IpMode,
    /// Skip waiting for the server to drop the connection after `Ok(bye!)`
    #[serde(default)]
    pub dont_wait_for_disconnect: bool,
    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Read timeout in milliseconds (0 = block)
    #[serde(default)]
    pub read_timeout_ms: u64,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            socket: String::new(),
            user: String::new(),
            password: String::new(),
            schema: String::new(),
            ssl: SslOptions::default(),
            ip_mode: IpMode::default(),
            dont_wait_for_disconnect: false,
            connect_timeout_ms: default_connect_timeout(),
            read_timeout_ms: 0,
        }
    }
}

/// TLS material and policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SslOptions {
    /// One of "", DISABLED, PREFERRED, REQUIRED, VERIFY_CA, VERIFY_IDENTITY
    #[serde(default)]
    pub ssl_mode: String,
    #[serde(default)]
    pub ssl_ca: String,
    #[serde(default)]
    pub ssl_ca_path: String,
    #[serde(default)]
    pub ssl_cert: String,
    #[serde(default)]
    pub ssl_key: String,
    #[serde(default)]
    pub ssl_cipher: String,
    /// Comma separated protocol versions, e.g. "TLSv1.2,TLSv1.3"
    #[serde(default)]
    pub allowed_tls: String,
}

impl SslOptions {
    /// Forget every TLS setting
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Any certificate material configured
    pub fn has_material(&self) -> bool {
        !(self.ssl_ca.is_empty()
            && self.ssl_ca_path.is_empty()
            && self.ssl_cert.is_empty()
            && self.ssl_key.is_empty())
    }
}

pub const SSL_MODES: [&str; 6] = [
    "",
    "DISABLED",
    "PREFERRED",
    "REQUIRED",
    "VERIFY_CA",
    "VERIFY_IDENTITY",
];

/// Address family used when resolving the host name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpMode {
    Ip4,
    Ip6,
    #[default]
    Any,
}

impl IpMode {
    /// Wire name of the resolution mode
    pub fn as_str(&self) -> &'static str {
        match self {
            IpMode::Ip4 => "IP4",
            IpMode::Ip6 => "IP6",
            IpMode::Any => "ANY",
        }
    }
}

impl fmt::Display for IpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IpMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ip4" | "ipv4" => Ok(IpMode::Ip4),
            "ip6" | "ipv6" => Ok(IpMode::Ip6),
            "any" => Ok(IpMode::Any),
            other => Err(format!("unknown ip mode: {}", other)),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    33060
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config =
            toml::from_str(&contents).with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let conn = &self.connection;
        if conn.socket.is_empty() && conn.port == 0 {
            anyhow::bail!("connection.port must be > 0 when no socket is given");
        }
        if !SSL_MODES.contains(&conn.ssl.ssl_mode.to_ascii_uppercase().as_str()) {
            anyhow::bail!("unknown connection.ssl.ssl_mode: {}", conn.ssl.ssl_mode);
        }
        if conn.connect_timeout_ms == 0 {
            anyhow::bail!("connection.connect_timeout_ms must be > 0");
        }
        Ok(())
    }
}
