pub mod client;
pub mod commands;

pub use client::{RconClient, RemoteConsole};
pub use commands::{parse_roster, ConsoleCommands, RosterEntry, RosterQuery};
