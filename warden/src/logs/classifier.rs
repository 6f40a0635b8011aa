//! Maps one raw server log line to at most one typed event.
//!
//! Shapes are tried in a fixed order and the first match wins. Every shape
//! anchors the username right after the `]: ` that ends the log prefix (or at
//! the start of the line), so chat lines such as `<Steve> Alex left the game`
//! never classify as events for another player.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const USER: &str = r"(?P<user>[A-Za-z0-9_]{3,16})";
const PREFIX: &str = r"(?:^|\]: )";

static LOGIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"{PREFIX}{USER}\[/\[?(?P<addr>[0-9A-Za-z.:%]+?)\]?:(?P<port>\d+)\] logged in"
    ))
    .expect("login pattern")
});

static IDENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"{PREFIX}UUID of player {USER} is (?P<id>[0-9A-Fa-f]{{8}}-?[0-9A-Fa-f]{{4}}-?[0-9A-Fa-f]{{4}}-?[0-9A-Fa-f]{{4}}-?[0-9A-Fa-f]{{12}})"
    ))
    .expect("identity pattern")
});

static LOST_CONNECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{PREFIX}{USER} lost connection")).expect("lost connection pattern")
});

static LEFT_GAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{PREFIX}{USER} left the game\s*$")).expect("left game pattern")
});

static COMMAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"{PREFIX}{USER} issued server command: (?P<cmd>.+?)\s*$"
    ))
    .expect("command pattern")
});

/// A classified log event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogEvent {
    LoginWithAddress { username: String, address: String },
    IdentityBound { username: String, stable_id: String },
    Logout { username: String },
    CommandIssued { username: String, command: String },
}

impl LogEvent {
    pub fn username(&self) -> &str {
        match self {
            LogEvent::LoginWithAddress { username, .. }
            | LogEvent::IdentityBound { username, .. }
            | LogEvent::Logout { username }
            | LogEvent::CommandIssued { username, .. } => username,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LogEvent::LoginWithAddress { .. } => "login",
            LogEvent::IdentityBound { .. } => "identity",
            LogEvent::Logout { .. } => "logout",
            LogEvent::CommandIssued { .. } => "command",
        }
    }
}

/// Classify a single line. `None` is the normal outcome for most lines.
pub fn classify_line(line: &str) -> Option<LogEvent> {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(caps) = LOGIN.captures(line) {
        return Some(LogEvent::LoginWithAddress {
            username: caps["user"].to_string(),
            address: caps["addr"].to_string(),
        });
    }

    if let Some(caps) = IDENTITY.captures(line) {
        return Some(LogEvent::IdentityBound {
            username: caps["user"].to_string(),
            stable_id: caps["id"].to_string(),
        });
    }

    if let Some(caps) = LOST_CONNECTION
        .captures(line)
        .or_else(|| LEFT_GAME.captures(line))
    {
        return Some(LogEvent::Logout {
            username: caps["user"].to_string(),
        });
    }

    if let Some(caps) = COMMAND.captures(line) {
        return Some(LogEvent::CommandIssued {
            username: caps["user"].to_string(),
            command: caps["cmd"].to_string(),
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn login(user: &str, addr: &str) -> Option<LogEvent> {
        Some(LogEvent::LoginWithAddress {
            username: user.to_string(),
            address: addr.to_string(),
        })
    }

    fn logout(user: &str) -> Option<LogEvent> {
        Some(LogEvent::Logout {
            username: user.to_string(),
        })
    }

    #[rstest]
    #[case("[INFO]: Steve[/192.168.1.5:54321] logged in with entity id 5", login("Steve", "192.168.1.5"))]
    #[case(
        "[12:01:02] [Server thread/INFO]: Alex_99[/10.0.0.7:60000] logged in with entity id 118 at ([world]1.5, 64.0, -3.2)",
        login("Alex_99", "10.0.0.7")
    )]
    #[case(
        "[12:01:02] [Server thread/INFO]: Bob[/0:0:0:0:0:0:0:1:51000] logged in with entity id 2",
        login("Bob", "0:0:0:0:0:0:0:1")
    )]
    #[case(
        "[12:01:02] [Server thread/INFO]: Bob[/[fe80::1%2]:51000] logged in with entity id 2",
        login("Bob", "fe80::1%2")
    )]
    #[case("[INFO]: Steve lost connection: Disconnected", logout("Steve"))]
    #[case("[INFO]: Steve left the game", logout("Steve"))]
    #[case("Steve left the game", logout("Steve"))]
    fn test_classifies_session_lines(#[case] line: &str, #[case] expected: Option<LogEvent>) {
        assert_eq!(classify_line(line), expected);
    }

    #[test]
    fn test_identity_binding() {
        let line = "[12:00:59] [User Authenticator #1/INFO]: UUID of player Steve is 069a79f4-44e9-4726-a5be-fca90e38aaf5";
        assert_eq!(
            classify_line(line),
            Some(LogEvent::IdentityBound {
                username: "Steve".to_string(),
                stable_id: "069a79f4-44e9-4726-a5be-fca90e38aaf5".to_string(),
            })
        );
    }

    #[test]
    fn test_command_issued_keeps_full_command() {
        let line = "[13:37:00] [Server thread/INFO]: Steve issued server command: /tp Alex 10 64 -20\r";
        assert_eq!(
            classify_line(line),
            Some(LogEvent::CommandIssued {
                username: "Steve".to_string(),
                command: "/tp Alex 10 64 -20".to_string(),
            })
        );
    }

    #[rstest]
    #[case("[12:00:00] [Server thread/INFO]: Starting minecraft server version 1.20.4")]
    #[case("[12:00:00] [Server thread/INFO]: <Steve> Alex left the game")]
    #[case("[12:00:00] [Server thread/INFO]: <Steve> hi: Alex lost connection")]
    #[case("[12:00:00] [Server thread/INFO]: St[/1.2.3.4:5] logged in with entity id 1")]
    #[case("[12:00:00] [Server thread/INFO]: ThisNameIsWayTooLong[/1.2.3.4:5] logged in")]
    #[case("")]
    fn test_irrelevant_lines_are_ignored(#[case] line: &str) {
        assert_eq!(classify_line(line), None);
    }

    #[test]
    fn test_event_accessors() {
        let event = classify_line("[INFO]: Steve issued server command: /help").unwrap();
        assert_eq!(event.username(), "Steve");
        assert_eq!(event.kind(), "command");
    }
}
