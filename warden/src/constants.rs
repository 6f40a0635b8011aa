//! Central repository for timeouts, intervals, stage timings and limits
//!
//! Constants are grouped by concern so call sites read as
//! `constants::console::CONNECT_TIMEOUT` rather than bare numbers.

use std::time::Duration;

/// Remote console wire and timeout constants
pub mod console {
    use super::Duration;

    /// Default timeout for connecting to the console port
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Default port of the remote console listener
    pub const DEFAULT_PORT: u16 = 25575;

    /// Largest packet body the server is allowed to send in one reply
    pub const MAX_PACKET_SIZE: i32 = 4096 + 10;

    /// Roster listing command, reply carries `name (id)` pairs
    pub const ROSTER_COMMAND: &str = "list uuids";

    /// Player ban list command
    pub const BANNED_PLAYERS_COMMAND: &str = "banlist players";

    /// Address ban list command
    pub const BANNED_ADDRESSES_COMMAND: &str = "banlist ips";

    /// Shutdown command
    pub const STOP_COMMAND: &str = "stop";
}

/// Log tailing constants
pub mod tail {
    /// Capacity of the channel between the tailer and the session tracker
    pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

    /// Largest delta read in a single wake-up; the rest is picked up next tick
    pub const MAX_READ_CHUNK: u64 = 8 * 1024 * 1024;
}

/// Maintenance countdown stage timings
pub mod stages {
    use super::Duration;

    pub const AFTER_TEN_MINUTE_WARNING: Duration = Duration::from_secs(5 * 60);
    pub const AFTER_FIVE_MINUTE_WARNING: Duration = Duration::from_secs(4 * 60);
    pub const AFTER_ONE_MINUTE_WARNING: Duration = Duration::from_secs(30);
    pub const AFTER_THIRTY_SECOND_WARNING: Duration = Duration::from_secs(25);
    pub const AFTER_FIVE_SECOND_WARNING: Duration = Duration::from_secs(5);
}

/// Default configuration values
pub mod defaults {
    /// Default database location
    pub const DATABASE_PATH: &str = "data/warden.db";

    /// Default capacity of each activity feed queue
    pub const ACTIVITY_CAPACITY: usize = 256;

    /// Default console timeout in seconds
    pub const CONSOLE_TIMEOUT_SECONDS: u64 = 10;

    /// Default broadcast command prefix
    pub const BROADCAST_COMMAND: &str = "broadcast";

    /// Default log directory
    pub const LOG_DIRECTORY: &str = "logs";

    /// Default live log file name
    pub const LIVE_LOG_FILE: &str = "latest.log";

    /// Default glob for compressed archives inside the log directory
    pub const ARCHIVE_PATTERN: &str = "*.log.gz";

    /// Default poll interval for the live log in milliseconds
    pub const POLL_INTERVAL_MS: u64 = 1000;

    /// Default interval between schedule reloads from the store
    pub const SCHEDULE_REFRESH_SECONDS: u64 = 60;
}

/// Cleanup constants
pub mod cleanup {
    /// Hours after which an in-flight maintenance cycle is considered stuck
    pub const MAINTENANCE_MAX_HOURS: i64 = 2;

    /// Cleanup interval in seconds
    pub const CLEANUP_INTERVAL_SECONDS: u64 = 3600;
}
