//! Custom error types for warden
//!
//! Provides structured error handling with context for the console link,
//! schedule parsing and configuration loading.

use std::fmt;

/// Main error type for warden
#[derive(Debug)]
pub enum WardenError {
    /// Configuration-related errors
    Config(ConfigError),

    /// Remote console transport errors
    Console(ConsoleError),

    /// Cron schedule errors
    Schedule(ScheduleError),

    /// Other errors with context
    Other(String),
}

/// Configuration error variants
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to load configuration file
    LoadFailed { path: String, reason: String },

    /// Invalid configuration value
    InvalidValue { field: String, reason: String },

    /// Configuration parsing error
    ParseError { reason: String },
}

/// Remote console transport failures.
///
/// Every variant is a transport failure from the caller's point of view: the
/// command may or may not have reached the server.
#[derive(Debug)]
pub enum ConsoleError {
    /// TCP connect to the console port failed
    ConnectFailed { address: String, reason: String },

    /// Server rejected the console password
    AuthenticationFailed { address: String },

    /// Read or write on an established connection failed
    Io { address: String, reason: String },

    /// Connect or exchange exceeded the transport timeout
    Timeout { address: String, operation: String },

    /// Server sent a packet that does not follow the console wire format
    Protocol { address: String, reason: String },
}

/// Schedule error variants
#[derive(Debug)]
pub enum ScheduleError {
    /// Cron expression could not be parsed
    InvalidCron { expression: String, reason: String },

    /// The underlying job scheduler refused an operation
    SchedulerFailed { reason: String },
}

impl fmt::Display for WardenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WardenError::Config(e) => write!(f, "Configuration error: {}", e),
            WardenError::Console(e) => write!(f, "Console error: {}", e),
            WardenError::Schedule(e) => write!(f, "Schedule error: {}", e),
            WardenError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::LoadFailed { path, reason } => {
                write!(f, "Failed to load config from '{}': {}", path, reason)
            }
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
            ConfigError::ParseError { reason } => {
                write!(f, "Failed to parse config: {}", reason)
            }
        }
    }
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::ConnectFailed { address, reason } => {
                write!(f, "Connection to {} failed: {}", address, reason)
            }
            ConsoleError::AuthenticationFailed { address } => {
                write!(f, "Authentication failed for {}", address)
            }
            ConsoleError::Io { address, reason } => {
                write!(f, "I/O error talking to {}: {}", address, reason)
            }
            ConsoleError::Timeout { address, operation } => {
                write!(f, "Timeout while {} on {}", operation, address)
            }
            ConsoleError::Protocol { address, reason } => {
                write!(f, "Malformed reply from {}: {}", address, reason)
            }
        }
    }
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::InvalidCron { expression, reason } => {
                write!(f, "Invalid cron expression '{}': {}", expression, reason)
            }
            ScheduleError::SchedulerFailed { reason } => {
                write!(f, "Job scheduler failure: {}", reason)
            }
        }
    }
}

impl std::error::Error for WardenError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for ConsoleError {}
impl std::error::Error for ScheduleError {}

impl From<anyhow::Error> for WardenError {
    fn from(err: anyhow::Error) -> Self {
        WardenError::Other(err.to_string())
    }
}

impl From<ConfigError> for WardenError {
    fn from(err: ConfigError) -> Self {
        WardenError::Config(err)
    }
}

impl From<ConsoleError> for WardenError {
    fn from(err: ConsoleError) -> Self {
        WardenError::Console(err)
    }
}

impl From<ScheduleError> for WardenError {
    fn from(err: ScheduleError) -> Self {
        WardenError::Schedule(err)
    }
}
