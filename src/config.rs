//! Configuration loading and constants.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file, then
//! command-line overrides (see [`crate::cli`]). `ServerConfig` is the root struct
//! and is passed by reference into the server; there is no global state.

use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// Defaults
// =============================================================================

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Default HTTPS port
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// Default directory to serve
pub const DEFAULT_SERVED_DIR: &str = ".";

/// Default certificate path (generated in memory if not found)
pub const DEFAULT_CERT_PATH: &str = "cert.crt";

/// Default private key path (generated in memory if not found)
pub const DEFAULT_KEY_PATH: &str = "cert.key";

/// Default log filter when neither --log-level nor RUST_LOG is set
pub const DEFAULT_LOG_FILTER: &str = "moose=info,tower_http=info";

// =============================================================================
// Timeouts
// =============================================================================

/// Upper bound on handling a single request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace period for in-flight connections on shutdown
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory to serve
    pub dir: PathBuf,
    /// Plain HTTP listener
    pub http: HttpConfig,
    /// HTTPS listener and certificate files
    pub tls: TlsConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_SERVED_DIR),
            http: HttpConfig::default(),
            tls: TlsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Plain HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    /// Empty means all interfaces
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: String::new(),
            port: DEFAULT_HTTP_PORT,
        }
    }
}

/// HTTPS listener configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    /// Empty means all interfaces
    pub host: String,
    /// Port 0 disables HTTPS
    pub port: u16,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// Write a generated certificate and key back to `cert_path`/`key_path`
    pub save_generated: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: String::new(),
            port: DEFAULT_HTTPS_PORT,
            cert_path: PathBuf::from(DEFAULT_CERT_PATH),
            key_path: PathBuf::from(DEFAULT_KEY_PATH),
            save_generated: false,
        }
    }
}

impl TlsConfig {
    /// HTTPS runs only when enabled and bound to a non-zero port.
    pub fn is_active(&self) -> bool {
        self.enabled && self.port > 0
    }
}

/// Logging output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file. Missing keys take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Check that the configuration describes something to serve.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.http.enabled && !self.tls.is_active() {
            return Err(ConfigError::Validation(
                "Both HTTP and HTTPS are disabled; nothing to serve".to_string(),
            ));
        }
        Ok(())
    }

    /// Socket address for the HTTP listener, if enabled.
    pub fn http_addr(&self) -> Result<Option<SocketAddr>, ConfigError> {
        if !self.http.enabled {
            return Ok(None);
        }
        resolve_listen_addr(&self.http.host, self.http.port).map(Some)
    }

    /// Socket address for the HTTPS listener, if active.
    pub fn https_addr(&self) -> Result<Option<SocketAddr>, ConfigError> {
        if !self.tls.is_active() {
            return Ok(None);
        }
        resolve_listen_addr(&self.tls.host, self.tls.port).map(Some)
    }
}

fn resolve_listen_addr(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let host = if host.is_empty() { "0.0.0.0" } else { host };
    (host, port)
        .to_socket_addrs()
        .map_err(|e| ConfigError::Validation(format!("Invalid listen address {host}:{port}: {e}")))?
        .next()
        .ok_or_else(|| ConfigError::Validation(format!("No address found for {host}:{port}")))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}
