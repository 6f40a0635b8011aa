//! Common test data and log line builders

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Fixed base instant so durations are exact
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
}

/// `base_time()` plus `seconds`
pub fn at(seconds: i64) -> DateTime<Utc> {
    base_time() + Duration::seconds(seconds)
}

/// Current wall clock in the `HH:MM:SS` form the server prefixes lines with
pub fn clock_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

/// Pin a log file's modification time
pub fn set_written_at(path: &std::path::Path, at: DateTime<Utc>) {
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(at.into())
        .unwrap();
}

/// Common player names
pub mod players {
    pub const STEVE: &str = "Steve";
    pub const ALEX: &str = "Alex";
    pub const NOTCH: &str = "Notch";
}

pub const STEVE_UUID: &str = "069a79f4-44e9-4726-a5be-fca90e38aaf5";

pub fn login_line(clock: &str, username: &str, address: &str) -> String {
    format!(
        "[{}] [Server thread/INFO]: {}[/{}:54321] logged in with entity id 5 at (0.5, 64.0, 0.5)\n",
        clock, username, address
    )
}

pub fn identity_line(clock: &str, username: &str, id: &str) -> String {
    format!(
        "[{}] [User Authenticator #1/INFO]: UUID of player {} is {}\n",
        clock, username, id
    )
}

pub fn lost_connection_line(clock: &str, username: &str) -> String {
    format!(
        "[{}] [Server thread/INFO]: {} lost connection: Disconnected\n",
        clock, username
    )
}

pub fn left_game_line(clock: &str, username: &str) -> String {
    format!("[{}] [Server thread/INFO]: {} left the game\n", clock, username)
}

pub fn command_line(clock: &str, username: &str, command: &str) -> String {
    format!(
        "[{}] [Server thread/INFO]: {} issued server command: {}\n",
        clock, username, command
    )
}

pub fn noise_line(clock: &str) -> String {
    format!(
        "[{}] [Server thread/INFO]: Saving the game (this may take a moment!)\n",
        clock
    )
}
