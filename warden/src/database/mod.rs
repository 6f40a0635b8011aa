//! Database layer for warden.
//!
//! This module provides SQLite persistence for:
//! - Players, sessions, address observations and command records
//! - Tail checkpoints and the set of already imported log archives
//! - Schedules and the maintenance run audit trail
//!
//! The module is organized into submodules:
//! - `records` - All record types (entities)
//! - `store` - Store traits consumed by the core components
//! - `players` - Player and session operations
//! - `tail` - Checkpoint and archive bookkeeping
//! - `maintenance` - Schedules and maintenance runs

mod maintenance;
mod players;
mod records;
mod store;
mod tail;

pub use records::*;
pub use store::{MaintenanceStore, PlayerStore, TailStore};

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;
use tracing::{debug, error, info, warn};

pub struct Database {
    pool: Pool<Sqlite>,
}

const SCHEMA: &[(&str, &str)] = &[
    (
        "players",
        r#"
        CREATE TABLE IF NOT EXISTS players (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            identifier TEXT,
            first_seen DATETIME NOT NULL,
            last_seen DATETIME NOT NULL,
            last_known_address TEXT,
            cumulative_play_seconds INTEGER NOT NULL DEFAULT 0
        )
        "#,
    ),
    (
        "sessions",
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            player_id INTEGER NOT NULL REFERENCES players(id),
            login_time DATETIME NOT NULL,
            logout_time DATETIME,
            duration_seconds INTEGER
        )
        "#,
    ),
    (
        "sessions player index",
        "CREATE INDEX IF NOT EXISTS idx_sessions_player ON sessions(player_id, login_time DESC)",
    ),
    (
        "sessions single open index",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_one_open ON sessions(player_id) WHERE logout_time IS NULL",
    ),
    (
        "address_observations",
        r#"
        CREATE TABLE IF NOT EXISTS address_observations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            player_id INTEGER NOT NULL REFERENCES players(id),
            address TEXT NOT NULL,
            observed_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "command_records",
        r#"
        CREATE TABLE IF NOT EXISTS command_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            player_id INTEGER NOT NULL REFERENCES players(id),
            command TEXT NOT NULL,
            executed_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "schedules",
        r#"
        CREATE TABLE IF NOT EXISTS schedules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cron_expression TEXT NOT NULL,
            label TEXT,
            enabled BOOLEAN NOT NULL DEFAULT 1
        )
        "#,
    ),
    (
        "tail_checkpoints",
        r#"
        CREATE TABLE IF NOT EXISTS tail_checkpoints (
            path TEXT PRIMARY KEY,
            byte_offset INTEGER NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "imported_archives",
        r#"
        CREATE TABLE IF NOT EXISTS imported_archives (
            name TEXT PRIMARY KEY,
            imported_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "maintenance_runs",
        r#"
        CREATE TABLE IF NOT EXISTS maintenance_runs (
            id TEXT PRIMARY KEY,
            schedule_label TEXT NOT NULL,
            cron_expression TEXT NOT NULL,
            status TEXT NOT NULL,
            stages_completed INTEGER NOT NULL DEFAULT 0,
            started_at DATETIME NOT NULL,
            completed_at DATETIME,
            error_message TEXT
        )
        "#,
    ),
    (
        "maintenance_runs status index",
        "CREATE INDEX IF NOT EXISTS idx_maintenance_runs_status ON maintenance_runs(status, started_at DESC)",
    ),
];

impl Database {
    /// Expose pool for integration test queries
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn new(database_path: &str) -> Result<Self> {
        info!("Database path: {}", database_path);

        if let Some(parent) = Path::new(database_path).parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                error!("FAILED to create parent directory {:?}: {}", parent, e);
                return Err(e.into());
            }
        }

        let database_url = format!("sqlite:{}?mode=rwc", database_path);
        let pool = match SqlitePool::connect(&database_url).await {
            Ok(pool) => pool,
            Err(e) => {
                error!("FAILED to connect to database: {}", e);
                error!("   Connection URL: {}", database_url);
                return Err(e.into());
            }
        };

        let database = Self { pool };
        database.initialize_tables().await?;

        // Runs left in 'started' belong to a previous process
        match database.cleanup_interrupted_runs().await {
            Ok(0) => debug!("No interrupted maintenance runs found"),
            Ok(count) => warn!("Marked {} interrupted maintenance runs as failed", count),
            Err(e) => {
                error!("Failed to cleanup interrupted maintenance runs: {}", e);
                warn!("Continuing with startup despite cleanup failure");
            }
        }

        info!("Database initialized at {}", database_path);
        Ok(database)
    }

    /// Single-connection in-memory database, used by tests and dry runs.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let database = Self { pool };
        database.initialize_tables().await?;
        Ok(database)
    }

    async fn initialize_tables(&self) -> Result<()> {
        for (name, sql) in SCHEMA {
            if let Err(e) = sqlx::query(sql).execute(&self.pool).await {
                error!("FAILED to create {}: {}", name, e);
                return Err(e.into());
            }
            debug!("{} ready", name);
        }

        debug!("Database tables initialized");
        Ok(())
    }
}
