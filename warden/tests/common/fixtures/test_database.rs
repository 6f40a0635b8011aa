//! Test database utilities for in-memory SQLite testing

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use warden::database::{Database, PlayerRecord, PlayerStore, SessionRecord};

/// Test database wrapper for in-memory SQLite
pub struct TestDatabase {
    database: Arc<Database>,
}

impl TestDatabase {
    /// Create a new in-memory test database with the full schema
    pub async fn new() -> Result<Self> {
        Ok(Self {
            database: Arc::new(Database::in_memory().await?),
        })
    }

    pub fn database(&self) -> Arc<Database> {
        self.database.clone()
    }

    /// Player by name, panicking when missing
    pub async fn player(&self, username: &str) -> PlayerRecord {
        self.database
            .find_player(username)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("player {} not found", username))
    }

    pub async fn sessions(&self, username: &str) -> Vec<SessionRecord> {
        let player = self.player(username).await;
        self.database.sessions_for_player(player.id).await.unwrap()
    }

    pub async fn open_sessions(&self, username: &str) -> usize {
        self.sessions(username)
            .await
            .iter()
            .filter(|s| s.logout_time.is_none())
            .count()
    }
}

/// Delegates to a real database but fails every `open_session` for one
/// player, simulating a store write failure.
pub struct FailingPlayerStore {
    inner: Arc<Database>,
    failing_player: String,
}

impl FailingPlayerStore {
    pub fn new(inner: Arc<Database>, failing_player: &str) -> Self {
        Self {
            inner,
            failing_player: failing_player.to_string(),
        }
    }
}

#[async_trait]
impl PlayerStore for FailingPlayerStore {
    async fn upsert_player_login(
        &self,
        username: &str,
        address: &str,
        at: DateTime<Utc>,
    ) -> Result<PlayerRecord> {
        self.inner.upsert_player_login(username, address, at).await
    }

    async fn find_player(&self, username: &str) -> Result<Option<PlayerRecord>> {
        self.inner.find_player(username).await
    }

    async fn set_player_identifier(
        &self,
        username: &str,
        identifier: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.inner.set_player_identifier(username, identifier, at).await
    }

    async fn touch_player(&self, player_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.inner.touch_player(player_id, at).await
    }

    async fn record_address(&self, player_id: i64, address: &str, at: DateTime<Utc>) -> Result<()> {
        self.inner.record_address(player_id, address, at).await
    }

    async fn record_command(&self, player_id: i64, command: &str, at: DateTime<Utc>) -> Result<()> {
        self.inner.record_command(player_id, command, at).await
    }

    async fn find_open_session(&self, player_id: i64) -> Result<Option<SessionRecord>> {
        self.inner.find_open_session(player_id).await
    }

    async fn open_session(&self, player_id: i64, login_time: DateTime<Utc>) -> Result<i64> {
        let failing = self.inner.find_player(&self.failing_player).await?;
        if failing.map(|p| p.id) == Some(player_id) {
            return Err(anyhow!("disk I/O error"));
        }
        self.inner.open_session(player_id, login_time).await
    }

    async fn close_session(
        &self,
        session: &SessionRecord,
        logout_time: DateTime<Utc>,
        duration_seconds: i64,
    ) -> Result<()> {
        self.inner
            .close_session(session, logout_time, duration_seconds)
            .await
    }
}
