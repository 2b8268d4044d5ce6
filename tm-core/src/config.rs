//! Application configuration management.
//!
//! Handles loading, saving, and accessing the client configuration:
//! websocket endpoint, socket reconnect/heartbeat policy, and logging
//! settings. Configuration is persisted as TOML on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::constants;
use crate::error::{TmError, TmResult};

/// Shared, mutable handle to the application configuration.
pub type ConfigHandle = Arc<RwLock<AppConfig>>;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server connection settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Socket reconnect and heartbeat policy.
    #[serde(default)]
    pub socket: SocketConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// WebSocket endpoint, e.g. "wss://api.twoman.app/ws".
    #[serde(default)]
    pub ws_url: String,

    /// Client version string sent in the authorization payload.
    #[serde(default = "default_client_version")]
    pub client_version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_url: String::new(),
            client_version: default_client_version(),
        }
    }
}

/// Reconnect and heartbeat policy for the connection manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Base delay for exponential backoff, in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Maximum backoff delay, in milliseconds.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,

    /// Automatic reconnect attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_reconnect_attempts: u32,

    /// Seconds between liveness probes while connected.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Seconds without a liveness ack before the socket is force-closed.
    #[serde(default = "default_liveness_timeout")]
    pub liveness_timeout_secs: u64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            max_reconnect_attempts: default_max_attempts(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            liveness_timeout_secs: default_liveness_timeout(),
        }
    }
}

impl SocketConfig {
    /// Base backoff delay as a Duration.
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Backoff cap as a Duration.
    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }

    /// Heartbeat probe interval as a Duration.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Liveness timeout as a Duration.
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses the default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output for the file layer.
    #[serde(default)]
    pub json_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

fn default_client_version() -> String {
    constants::CLIENT_VERSION.to_string()
}

fn default_backoff_base_ms() -> u64 {
    constants::DEFAULT_BACKOFF_BASE_MS
}

fn default_backoff_cap_ms() -> u64 {
    constants::DEFAULT_BACKOFF_CAP_MS
}

fn default_max_attempts() -> u32 {
    constants::DEFAULT_MAX_RECONNECT_ATTEMPTS
}

fn default_heartbeat_interval() -> u64 {
    constants::DEFAULT_HEARTBEAT_INTERVAL_SECS
}

fn default_liveness_timeout() -> u64 {
    constants::DEFAULT_LIVENESS_TIMEOUT_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> TmResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save_to_file(&self, path: &Path) -> TmResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| TmError::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Load from the default location, falling back to defaults if the
    /// file does not exist yet.
    pub fn load_or_default() -> TmResult<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Default config file path under the platform config directory.
    pub fn default_path() -> TmResult<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| TmError::Config("no config directory for platform".into()))?;
        Ok(dir.join("twoman").join("config.toml"))
    }

    /// Wrap this config in a shared handle.
    pub fn into_handle(self) -> ConfigHandle {
        Arc::new(RwLock::new(self))
    }
}
