//! Typed wrappers over the administrative console commands.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::client::RemoteConsole;
use crate::constants::console;
use crate::errors::ConsoleError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub username: String,
    pub id: String,
}

/// Parse the `name (id), name (id)` list that follows the first colon of a
/// roster reply. Fragments that do not have that shape are skipped.
pub fn parse_roster(reply: &str) -> Vec<RosterEntry> {
    let Some((_, list)) = reply.split_once(':') else {
        return Vec::new();
    };

    list.split(',')
        .filter_map(|fragment| {
            let fragment = fragment.trim();
            let (name, rest) = fragment.split_once(" (")?;
            let id = rest.strip_suffix(')')?;
            let name = name.trim();
            if name.is_empty() || id.is_empty() {
                return None;
            }
            Some(RosterEntry {
                username: name.to_string(),
                id: id.to_string(),
            })
        })
        .collect()
}

/// Who is online right now.
pub struct RosterQuery {
    console: Arc<dyn RemoteConsole>,
}

impl RosterQuery {
    pub fn new(console: Arc<dyn RemoteConsole>) -> Self {
        Self { console }
    }

    /// Transport failures are logged and reported as an empty roster.
    pub async fn roster(&self) -> Vec<RosterEntry> {
        match self.console.send(console::ROSTER_COMMAND).await {
            Ok(reply) => parse_roster(&reply),
            Err(e) => {
                warn!("Roster query failed: {}", e);
                Vec::new()
            }
        }
    }
}

/// Ban lists, address bans, broadcasts and shutdown.
pub struct ConsoleCommands {
    console: Arc<dyn RemoteConsole>,
    broadcast_command: String,
}

impl ConsoleCommands {
    pub fn new(console: Arc<dyn RemoteConsole>, broadcast_command: impl Into<String>) -> Self {
        Self {
            console,
            broadcast_command: broadcast_command.into(),
        }
    }

    pub async fn banned_players(&self) -> Result<String, ConsoleError> {
        self.console.send(console::BANNED_PLAYERS_COMMAND).await
    }

    pub async fn banned_addresses(&self) -> Result<String, ConsoleError> {
        self.console.send(console::BANNED_ADDRESSES_COMMAND).await
    }

    pub async fn ban_ip(&self, address: &str, reason: Option<&str>) -> Result<String, ConsoleError> {
        let command = match reason.map(str::trim).filter(|r| !r.is_empty()) {
            Some(reason) => format!("ban-ip {} {}", address, reason),
            None => format!("ban-ip {}", address),
        };
        info!("Banning address {}", address);
        self.console.send(&command).await
    }

    pub async fn broadcast(&self, text: &str) -> Result<String, ConsoleError> {
        self.console
            .send(&format!("{} {}", self.broadcast_command, text))
            .await
    }

    pub async fn stop(&self) -> Result<String, ConsoleError> {
        self.console.send(console::STOP_COMMAND).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rstest::rstest;
    use tokio::sync::Mutex;

    struct Recording {
        reply: Result<String, ()>,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RemoteConsole for Recording {
        async fn send(&self, command: &str) -> Result<String, ConsoleError> {
            self.sent.lock().await.push(command.to_string());
            self.reply.clone().map_err(|_| ConsoleError::ConnectFailed {
                address: "127.0.0.1:25575".to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    fn recording(reply: Result<&str, ()>) -> Arc<Recording> {
        Arc::new(Recording {
            reply: reply.map(str::to_string),
            sent: Mutex::new(Vec::new()),
        })
    }

    #[rstest]
    #[case("There are 0 of a max of 20 players online: ", 0)]
    #[case("There are 1 of a max of 20 players online: Steve (069a79f4-44e9-4726-a5be-fca90e38aaf5)", 1)]
    #[case("There are 2 of a max of 20 players online: Steve (a), Alex (b)", 2)]
    #[case("no colon here", 0)]
    #[case("online: garbage, Alex (b)", 1)]
    fn test_parse_roster_counts(#[case] reply: &str, #[case] expected: usize) {
        assert_eq!(parse_roster(reply).len(), expected);
    }

    #[test]
    fn test_parse_roster_entries() {
        let roster = parse_roster("players online: Steve (id-1), Alex (id-2)");
        assert_eq!(
            roster,
            vec![
                RosterEntry {
                    username: "Steve".to_string(),
                    id: "id-1".to_string()
                },
                RosterEntry {
                    username: "Alex".to_string(),
                    id: "id-2".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_roster_failure_is_empty() {
        let console = recording(Err(()));
        let query = RosterQuery::new(console.clone());

        assert!(query.roster().await.is_empty());
        assert_eq!(*console.sent.lock().await, vec!["list uuids".to_string()]);
    }

    #[tokio::test]
    async fn test_command_shapes() {
        let console = recording(Ok(""));
        let commands = ConsoleCommands::new(console.clone(), "say");

        commands.broadcast("Restart in 10 minutes").await.unwrap();
        commands.ban_ip("10.0.0.9", Some("griefing")).await.unwrap();
        commands.ban_ip("10.0.0.10", Some("  ")).await.unwrap();
        commands.banned_players().await.unwrap();
        commands.banned_addresses().await.unwrap();
        commands.stop().await.unwrap();

        assert_eq!(
            *console.sent.lock().await,
            vec![
                "say Restart in 10 minutes",
                "ban-ip 10.0.0.9 griefing",
                "ban-ip 10.0.0.10",
                "banlist players",
                "banlist ips",
                "stop",
            ]
        );
    }

    #[tokio::test]
    async fn test_ban_list_failure_propagates() {
        let commands = ConsoleCommands::new(recording(Err(())), "broadcast");
        assert!(commands.banned_players().await.is_err());
    }
}
