//! Server configuration.
//!
//! Configuration can be loaded from:
//! - TOML configuration file
//! - Environment variables (HUDDLE_*, nested keys separated by `__`)

use anyhow::{Context, Result};
use huddle_core::HubConfig;
use huddle_transport::PumpConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket endpoint configuration.
    #[serde(default)]
    pub websocket: WebSocketConfig,

    /// Hub queue sizes.
    #[serde(default)]
    pub hub: HubSettings,

    /// Heartbeat configuration.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Identity configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// WebSocket endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// Path of the upgrade endpoint.
    #[serde(default = "default_ws_path")]
    pub path: String,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Hub queue sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSettings {
    /// Capacity of each client's outbound queue.
    #[serde(default = "default_client_queue_capacity")]
    pub client_queue_capacity: usize,

    /// Capacity of the hub's message intake queue.
    #[serde(default = "default_message_queue_capacity")]
    pub message_queue_capacity: usize,

    /// Capacity of the hub's join intake queue.
    #[serde(default = "default_join_queue_capacity")]
    pub join_queue_capacity: usize,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Idle-read deadline in milliseconds. Pings go out at 9/10 of this.
    #[serde(default = "default_pong_wait")]
    pub pong_wait_ms: u64,

    /// Per-write deadline in milliseconds.
    #[serde(default = "default_write_wait")]
    pub write_wait_ms: u64,
}

/// Identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Header carrying the user id verified by the upstream auth layer.
    #[serde(default = "default_user_header")]
    pub user_header: String,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws/chat".to_string()
}

fn default_max_message_size() -> usize {
    512 * 1024 // 512 KiB
}

fn default_client_queue_capacity() -> usize {
    256
}

fn default_message_queue_capacity() -> usize {
    256
}

fn default_join_queue_capacity() -> usize {
    64
}

fn default_pong_wait() -> u64 {
    60_000 // 60 seconds
}

fn default_write_wait() -> u64 {
    10_000 // 10 seconds
}

fn default_user_header() -> String {
    "x-user-id".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            websocket: WebSocketConfig::default(),
            hub: HubSettings::default(),
            heartbeat: HeartbeatConfig::default(),
            auth: AuthConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            path: default_ws_path(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            client_queue_capacity: default_client_queue_capacity(),
            message_queue_capacity: default_message_queue_capacity(),
            join_queue_capacity: default_join_queue_capacity(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            pong_wait_ms: default_pong_wait(),
            write_wait_ms: default_write_wait(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            user_header: default_user_header(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, with
    /// environment overrides applied on top.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or an
    /// override has the wrong type.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "huddle.toml",
            "/etc/huddle/huddle.toml",
            "~/.config/huddle/huddle.toml",
        ];

        let mut builder = ::config::Config::builder();

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            let path = Path::new(expanded.as_ref());
            if path.exists() {
                builder = builder.add_source(
                    ::config::File::from(path).format(::config::FileFormat::Toml),
                );
                break;
            }
        }

        builder
            .add_source(
                ::config::Environment::with_prefix("HUDDLE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Hub settings in the form the hub expects.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            client_queue_capacity: self.hub.client_queue_capacity,
            join_queue_capacity: self.hub.join_queue_capacity,
            message_queue_capacity: self.hub.message_queue_capacity,
        }
    }

    /// Pump deadlines and limits.
    #[must_use]
    pub fn pump_config(&self) -> PumpConfig {
        PumpConfig::new(
            Duration::from_millis(self.heartbeat.write_wait_ms),
            Duration::from_millis(self.heartbeat.pong_wait_ms),
            self.websocket.max_message_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.websocket.path, "/ws/chat");
        assert_eq!(config.websocket.max_message_size, 512 * 1024);
        assert_eq!(config.hub.client_queue_capacity, 256);
        assert_eq!(config.auth.user_header, "x-user-id");
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config::default();
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), 8080);

        let bad = Config {
            host: "not a host".into(),
            ..Config::default()
        };
        assert!(bad.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [hub]
            client_queue_capacity = 32

            [heartbeat]
            pong_wait_ms = 20000
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.hub.client_queue_capacity, 32);
        assert_eq!(config.hub.message_queue_capacity, 256);

        let pump = config.pump_config();
        assert_eq!(pump.pong_wait, Duration::from_secs(20));
        assert_eq!(pump.ping_period, Duration::from_secs(18));
        assert_eq!(pump.write_wait, Duration::from_secs(10));
        assert_eq!(config.hub_config().client_queue_capacity, 32);
    }

    #[test]
    fn test_config_from_file() {
        let path = std::env::temp_dir().join(format!("huddle-test-{}.toml", std::process::id()));
        std::fs::write(&path, "port = 7000\n[websocket]\npath = \"/chat\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.port, 7000);
        assert_eq!(config.websocket.path, "/chat");
        assert!(Config::from_file(&path).is_err());
    }
}
