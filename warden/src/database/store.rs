//! Store traits consumed by the session tracker, the tailer and the
//! maintenance orchestrator. `Database` implements all of them; tests swap in
//! wrappers that fail on demand.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::records::{MaintenanceRun, PlayerRecord, ScheduleRecord, SessionRecord};

#[async_trait]
pub trait PlayerStore: Send + Sync {
    /// Create the player on first login, otherwise widen `first_seen` and
    /// `last_seen` to include `at`. The address is replaced only by a login
    /// that is not older than `last_seen`.
    async fn upsert_player_login(
        &self,
        username: &str,
        address: &str,
        at: DateTime<Utc>,
    ) -> Result<PlayerRecord>;

    async fn find_player(&self, username: &str) -> Result<Option<PlayerRecord>>;

    /// Returns `false` when the player is unknown.
    async fn set_player_identifier(
        &self,
        username: &str,
        identifier: &str,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn touch_player(&self, player_id: i64, at: DateTime<Utc>) -> Result<()>;

    async fn record_address(&self, player_id: i64, address: &str, at: DateTime<Utc>) -> Result<()>;

    async fn record_command(&self, player_id: i64, command: &str, at: DateTime<Utc>) -> Result<()>;

    /// Most recently opened session without a logout time.
    async fn find_open_session(&self, player_id: i64) -> Result<Option<SessionRecord>>;

    async fn open_session(&self, player_id: i64, login_time: DateTime<Utc>) -> Result<i64>;

    /// Close the session and add `duration_seconds` to the player's playtime
    /// in one transaction.
    async fn close_session(
        &self,
        session: &SessionRecord,
        logout_time: DateTime<Utc>,
        duration_seconds: i64,
    ) -> Result<()>;
}

#[async_trait]
pub trait TailStore: Send + Sync {
    async fn load_checkpoint(&self, path: &str) -> Result<Option<u64>>;

    async fn save_checkpoint(&self, path: &str, offset: u64) -> Result<()>;

    async fn is_archive_imported(&self, name: &str) -> Result<bool>;

    async fn mark_archive_imported(&self, name: &str) -> Result<()>;
}

#[async_trait]
pub trait MaintenanceStore: Send + Sync {
    async fn enabled_schedules(&self) -> Result<Vec<ScheduleRecord>>;

    async fn store_maintenance_run(&self, run: &MaintenanceRun) -> Result<()>;
}
