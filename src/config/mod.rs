//! # Configuration Management Module
//!
//! All runtime settings for smsrelay live in one TOML file (default
//! `config.toml`). Every field has a default, so a partial file, or a file that
//! only sets the Telegram token, is valid.
//!
//! ## Configuration Structure
//!
//! - [`ModemConfig`] - Endpoint, baud rate, discovery candidates and per-command waits
//! - [`MonitorConfig`] - Call monitor polling and retry behaviour
//! - [`RelayConfig`] - Message check scheduling and outgoing text limits
//! - [`StorageConfig`] - Location of the persisted identifier sets
//! - [`TelegramConfig`] - Notification transport credentials
//! - [`LoggingConfig`] - Log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use smsrelay::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Modem port: {}", config.modem.port);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [modem]
//! port = "/dev/ttyUSB2"
//! baud_rate = 115200
//! device_pattern = "/dev/ttyUSB*"
//!
//! [monitor]
//! enabled = true
//! poll_interval_ms = 500
//!
//! [relay]
//! check_interval_secs = 30
//!
//! [telegram]
//! enabled = true
//! bot_token = "123456:ABC..."
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub modem: ModemConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial endpoint and AT exchange timing.
///
/// The `*_wait_ms` values are fixed sleeps between writing a command and reading
/// whatever the modem produced. They are per command class because list commands
/// on a full SIM take far longer than a bare `AT`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    /// Endpoint used when discovery finds nothing responsive.
    pub port: String,
    pub baud_rate: u32,
    /// Glob-style pattern (`*` suffix only) enumerated for the call monitor.
    pub device_pattern: String,
    /// Ordered candidates probed for the command endpoint.
    pub preferred_ports: Vec<String>,
    /// Serial read/write timeout.
    pub io_timeout_ms: u64,
    /// Pause after opening the port before the first command.
    pub open_settle_ms: u64,
    pub command_wait_ms: u64,
    pub init_wait_ms: u64,
    pub list_wait_ms: u64,
    /// Wait after the Ctrl-Z that submits an SMS body.
    pub sms_submit_wait_ms: u64,
    pub probe_settle_ms: u64,
    pub probe_wait_ms: u64,
    /// Host processes killed (best-effort) before connecting, e.g. a stray `screen`.
    pub kill_blocking_processes: Vec<String>,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB2".to_string(),
            baud_rate: 115200,
            device_pattern: "/dev/ttyUSB*".to_string(),
            preferred_ports: vec![
                "/dev/ttyUSB2".to_string(),
                "/dev/ttyUSB3".to_string(),
                "/dev/ttyUSB1".to_string(),
                "/dev/ttyUSB0".to_string(),
            ],
            io_timeout_ms: 2000,
            open_settle_ms: 500,
            command_wait_ms: 1000,
            init_wait_ms: 500,
            list_wait_ms: 2000,
            sms_submit_wait_ms: 2000,
            probe_settle_ms: 300,
            probe_wait_ms: 500,
            kill_blocking_processes: vec!["screen".to_string()],
        }
    }
}

impl ModemConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn probe_timing(&self) -> crate::modem::discovery::ProbeTiming {
        crate::modem::discovery::ProbeTiming {
            settle: Duration::from_millis(self.probe_settle_ms),
            response: Duration::from_millis(self.probe_wait_ms),
            io_timeout: Duration::from_millis(self.io_timeout_ms.min(1000)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    /// Interval between checks for unsolicited bytes. Also bounds stop latency.
    pub poll_interval_ms: u64,
    /// Backoff after a transport error before reconnecting.
    pub retry_delay_secs: u64,
    /// Capacity of the bounded call-event queue.
    pub event_queue: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 500,
            retry_delay_secs: 10,
            event_queue: 16,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    /// Backoff between reconnect attempts, never shorter than one poll interval.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs).max(self.poll_interval())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub check_interval_secs: u64,
    pub first_check_delay_secs: u64,
    /// Outgoing notifications longer than this are split into several sends.
    pub max_chunk_chars: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 30,
            first_check_delay_secs: 10,
            max_chunk_chars: 4000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
    pub seen_file: String,
    pub recipients_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            seen_file: "seen_messages.json".to_string(),
            recipients_file: "authorized_users.json".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn seen_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.seen_file)
    }

    pub fn recipients_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.recipients_file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_token: String,
    pub api_base: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false, // Disabled until a bot token is provided
            bot_token: String::new(),
            api_base: "https://api.telegram.org".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.bot_token.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some("smsrelay.log".to_string()),
        }
    }
}

impl LoggingConfig {
    /// Parse `level`, falling back to `Info` for unknown values.
    pub fn level_filter(&self) -> log::LevelFilter {
        match self.level.to_ascii_lowercase().as_str() {
            "off" => log::LevelFilter::Off,
            "error" => log::LevelFilter::Error,
            "warn" | "warning" => log::LevelFilter::Warn,
            "debug" => log::LevelFilter::Debug,
            "trace" => log::LevelFilter::Trace,
            _ => log::LevelFilter::Info,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }
}
