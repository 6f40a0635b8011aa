// File: warden/src/config/mod.rs
pub mod manager;
pub mod secrets;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::defaults;
use crate::errors::ConfigError;
use crate::scheduler::ScheduleRegistry;
use crate::sessions::ReconnectPolicy;

pub use manager::ConfigManager;
pub use secrets::SecretsLoader;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_activity_capacity")]
    pub activity_capacity: usize,
    pub console: ConsoleConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub schedules: Vec<ScheduleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    pub host: String,
    #[serde(default = "default_console_port")]
    pub port: u16,
    // Filled from secrets.toml or WARDEN_RCON_PASSWORD
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default = "default_console_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_broadcast_command")]
    pub broadcast_command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    #[serde(default = "default_log_directory")]
    pub directory: String,
    #[serde(default = "default_live_file")]
    pub live_file: String,
    #[serde(default = "default_archive_pattern")]
    pub archive_pattern: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_true")]
    pub import_archives: bool,
    #[serde(default = "default_true")]
    pub resume_from_checkpoint: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default)]
    pub reconnect_policy: ReconnectPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default)]
    pub cancel_in_flight_on_replace: bool,
    #[serde(default = "default_schedule_refresh")]
    pub schedule_refresh_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleConfig {
    pub cron_expression: String,
    pub label: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_database_path() -> String {
    defaults::DATABASE_PATH.to_string()
}

fn default_activity_capacity() -> usize {
    defaults::ACTIVITY_CAPACITY
}

fn default_console_port() -> u16 {
    crate::constants::console::DEFAULT_PORT
}

fn default_console_timeout() -> u64 {
    defaults::CONSOLE_TIMEOUT_SECONDS
}

fn default_broadcast_command() -> String {
    defaults::BROADCAST_COMMAND.to_string()
}

fn default_log_directory() -> String {
    defaults::LOG_DIRECTORY.to_string()
}

fn default_live_file() -> String {
    defaults::LIVE_LOG_FILE.to_string()
}

fn default_archive_pattern() -> String {
    defaults::ARCHIVE_PATTERN.to_string()
}

fn default_poll_interval_ms() -> u64 {
    defaults::POLL_INTERVAL_MS
}

fn default_schedule_refresh() -> u64 {
    defaults::SCHEDULE_REFRESH_SECONDS
}

fn default_true() -> bool {
    true
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            live_file: default_live_file(),
            archive_pattern: default_archive_pattern(),
            poll_interval_ms: default_poll_interval_ms(),
            import_archives: true,
            resume_from_checkpoint: true,
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            cancel_in_flight_on_replace: false,
            schedule_refresh_seconds: default_schedule_refresh(),
        }
    }
}

impl ConsoleConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl LogsConfig {
    pub fn live_path(&self) -> PathBuf {
        PathBuf::from(&self.directory).join(&self.live_file)
    }

    pub fn archive_glob(&self) -> String {
        PathBuf::from(&self.directory)
            .join(&self.archive_pattern)
            .to_string_lossy()
            .into_owned()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Reject values that would make a background loop spin or never run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.console.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "console.host".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.console.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "console.port".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if self.console.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "console.timeout_seconds".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if self.logs.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "logs.poll_interval_ms".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if self.activity_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "activity_capacity".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if self.maintenance.schedule_refresh_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "maintenance.schedule_refresh_seconds".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }

        for (index, schedule) in self.schedules.iter().enumerate() {
            if let Err(e) = ScheduleRegistry::parse_expression(&schedule.cron_expression) {
                return Err(ConfigError::InvalidValue {
                    field: format!("schedules[{}].cron_expression", index),
                    reason: e.to_string(),
                });
            }
        }

        Ok(())
    }
}
