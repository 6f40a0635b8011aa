//! Remote console client against an in-process RCON server

mod common;

use common::fixtures::*;
use std::sync::Arc;
use std::time::Duration;
use warden::console::{ConsoleCommands, RconClient, RemoteConsole, RosterQuery};
use warden::errors::ConsoleError;

const ROSTER_REPLY: &str = "There are 2 of a max of 20 players online: \
Steve (069a79f4-44e9-4726-a5be-fca90e38aaf5), Alex (ec561538-f3fd-461d-aff5-086b22154bce)";

fn client(address: &str, password: &str) -> Arc<RconClient> {
    Arc::new(RconClient::new(address, password, Duration::from_secs(5)))
}

#[tokio::test]
async fn test_roster_over_the_wire() {
    let server = MockRconServer::start("secret", ROSTER_REPLY).await;
    let roster = RosterQuery::new(client(server.address(), "secret"));

    let online = roster.roster().await;
    assert_eq!(online.len(), 2);
    assert_eq!(online[0].username, players::STEVE);
    assert_eq!(online[1].id, "ec561538-f3fd-461d-aff5-086b22154bce");
    assert_eq!(server.commands().await, vec!["list uuids"]);
}

#[tokio::test]
async fn test_roster_is_empty_when_server_unreachable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let roster = RosterQuery::new(client(&address, "secret"));
    assert!(roster.roster().await.is_empty());
}

#[tokio::test]
async fn test_each_send_uses_a_fresh_connection() {
    let server = MockRconServer::start("secret", "ok").await;
    let commands = ConsoleCommands::new(client(server.address(), "secret"), "broadcast");

    commands.broadcast("Restart soon").await.unwrap();
    commands.ban_ip("203.0.113.7", Some("spam")).await.unwrap();
    commands.banned_addresses().await.unwrap();

    assert_eq!(server.connections(), 3);
    assert_eq!(
        server.commands().await,
        vec!["broadcast Restart soon", "ban-ip 203.0.113.7 spam", "banlist ips"]
    );
}

#[tokio::test]
async fn test_bad_password_is_reported() {
    let server = MockRconServer::start("secret", "ok").await;
    let console = client(server.address(), "guess");

    let err = console.send("stop").await.unwrap_err();
    assert!(matches!(err, ConsoleError::AuthenticationFailed { .. }));
    assert!(err.to_string().contains("Authentication failed"));
    assert!(server.commands().await.is_empty());
}
