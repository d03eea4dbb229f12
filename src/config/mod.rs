//! Server configuration: typed sections with compiled-in defaults, loaded
//! from `config.json` and `WEBPARTY__`-prefixed environment overrides.

pub mod loader;

pub use loader::load;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::flow::FlowTimings;
use crate::room::{ManagerConfig, RoomConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port the WebSocket front end listens on.
    pub port: u16,
    /// Directory the filesystem script store reads from.
    pub scripts_dir: String,
    pub manager: ManagerSection,
    pub flow: FlowSection,
    /// Defaults applied to newly created rooms.
    pub room: RoomConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3541,
            scripts_dir: "scripts".to_string(),
            manager: ManagerSection::default(),
            flow: FlowSection::default(),
            room: RoomConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSection {
    pub code_length: usize,
    pub allocation_retry_limit: usize,
}

impl Default for ManagerSection {
    fn default() -> Self {
        let defaults = ManagerConfig::default();
        Self {
            code_length: defaults.code_length,
            allocation_retry_limit: defaults.allocation_retry_limit,
        }
    }
}

impl From<ManagerSection> for ManagerConfig {
    fn from(section: ManagerSection) -> Self {
        Self {
            code_length: section.code_length,
            allocation_retry_limit: section.allocation_retry_limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSection {
    pub initial_delay_ms: u64,
    pub settle_delay_ms: u64,
}

impl Default for FlowSection {
    fn default() -> Self {
        let defaults = FlowTimings::default();
        Self {
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            settle_delay_ms: defaults.settle_delay.as_millis() as u64,
        }
    }
}

impl FlowSection {
    pub fn timings(&self) -> FlowTimings {
        FlowTimings {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Optional level directive; falls back to `RUST_LOG`, then `info`.
    pub level: Option<String>,
    /// Rendered format for logs.
    pub format: LogFormat,
    /// Enable rolling file logging in addition to stdout.
    pub enable_file_logging: bool,
    /// Directory for log files.
    pub dir: String,
    /// Log file base name.
    pub filename: String,
    /// Rotation policy: "daily" (default), "hourly", or "never".
    pub rotation: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: LogFormat::Text,
            enable_file_logging: false,
            dir: "logs".to_string(),
            filename: "server.log".to_string(),
            rotation: "daily".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
