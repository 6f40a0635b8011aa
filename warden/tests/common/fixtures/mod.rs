//! This module provides reusable test utilities:
//! - Scripted remote consoles (in-process and over TCP)
//! - Test configuration directories
//! - In-memory test databases and failing store wrappers
//! - Common log lines and timestamps

// Allow unused code in test fixtures - not every test binary uses every helper
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod mock_console;
pub mod test_config;
pub mod test_data;
pub mod test_database;

// Re-export commonly used items
pub use mock_console::{MockRconServer, ScriptedConsole};
pub use test_config::TestConfigBuilder;
pub use test_data::*;
pub use test_database::{FailingPlayerStore, TestDatabase};
