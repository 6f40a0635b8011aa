//! Player, session, address and command persistence.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use super::records::{PlayerRecord, SessionRecord};
use super::store::PlayerStore;
use super::Database;

const PLAYER_COLUMNS: &str = "id, username, identifier, first_seen, last_seen, last_known_address, cumulative_play_seconds";

fn player_from_row(row: &SqliteRow) -> Result<PlayerRecord> {
    Ok(PlayerRecord {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        identifier: row.try_get("identifier")?,
        first_seen: row.try_get("first_seen")?,
        last_seen: row.try_get("last_seen")?,
        last_known_address: row.try_get("last_known_address")?,
        cumulative_play_seconds: row.try_get("cumulative_play_seconds")?,
    })
}

fn session_from_row(row: &SqliteRow) -> Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.try_get("id")?,
        player_id: row.try_get("player_id")?,
        login_time: row.try_get("login_time")?,
        logout_time: row.try_get("logout_time")?,
        duration_seconds: row.try_get("duration_seconds")?,
    })
}

#[async_trait]
impl PlayerStore for Database {
    async fn upsert_player_login(
        &self,
        username: &str,
        address: &str,
        at: DateTime<Utc>,
    ) -> Result<PlayerRecord> {
        debug!("Upserting player {} from {}", username, address);

        let sql = format!(
            r#"
            INSERT INTO players (username, first_seen, last_seen, last_known_address)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(username) DO UPDATE SET
                first_seen = MIN(players.first_seen, excluded.first_seen),
                last_seen = MAX(players.last_seen, excluded.last_seen),
                last_known_address = CASE
                    WHEN excluded.last_seen >= players.last_seen THEN excluded.last_known_address
                    ELSE players.last_known_address
                END
            RETURNING {}
            "#,
            PLAYER_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(username)
            .bind(at)
            .bind(at)
            .bind(address)
            .fetch_one(&self.pool)
            .await?;

        player_from_row(&row)
    }

    async fn find_player(&self, username: &str) -> Result<Option<PlayerRecord>> {
        let sql = format!("SELECT {} FROM players WHERE username = ?", PLAYER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(player_from_row).transpose()
    }

    async fn set_player_identifier(
        &self,
        username: &str,
        identifier: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result =
            sqlx::query("UPDATE players SET identifier = ?, last_seen = MAX(last_seen, ?) WHERE username = ?")
                .bind(identifier)
                .bind(at)
                .bind(username)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn touch_player(&self, player_id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE players SET last_seen = MAX(last_seen, ?) WHERE id = ?")
            .bind(at)
            .bind(player_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_address(&self, player_id: i64, address: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO address_observations (player_id, address, observed_at) VALUES (?, ?, ?)",
        )
        .bind(player_id)
        .bind(address)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_command(&self, player_id: i64, command: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO command_records (player_id, command, executed_at) VALUES (?, ?, ?)",
        )
        .bind(player_id)
        .bind(command)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_open_session(&self, player_id: i64) -> Result<Option<SessionRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, player_id, login_time, logout_time, duration_seconds
            FROM sessions
            WHERE player_id = ? AND logout_time IS NULL
            ORDER BY login_time DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(player_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn open_session(&self, player_id: i64, login_time: DateTime<Utc>) -> Result<i64> {
        let result = sqlx::query("INSERT INTO sessions (player_id, login_time) VALUES (?, ?)")
            .bind(player_id)
            .bind(login_time)
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    async fn close_session(
        &self,
        session: &SessionRecord,
        logout_time: DateTime<Utc>,
        duration_seconds: i64,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE sessions SET logout_time = ?, duration_seconds = ? WHERE id = ?")
            .bind(logout_time)
            .bind(duration_seconds)
            .bind(session.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            UPDATE players
            SET cumulative_play_seconds = cumulative_play_seconds + ?,
                last_seen = MAX(last_seen, ?)
            WHERE id = ?
            "#,
        )
        .bind(duration_seconds)
        .bind(logout_time)
        .bind(session.player_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

impl Database {
    pub async fn sessions_for_player(&self, player_id: i64) -> Result<Vec<SessionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, player_id, login_time, logout_time, duration_seconds
            FROM sessions
            WHERE player_id = ?
            ORDER BY login_time ASC, id ASC
            "#,
        )
        .bind(player_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(session_from_row).collect()
    }

    pub async fn addresses_for_player(&self, player_id: i64) -> Result<Vec<super::AddressObservation>> {
        let rows = sqlx::query(
            "SELECT player_id, address, observed_at FROM address_observations WHERE player_id = ? ORDER BY id ASC",
        )
        .bind(player_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(super::AddressObservation {
                    player_id: row.try_get("player_id")?,
                    address: row.try_get("address")?,
                    observed_at: row.try_get("observed_at")?,
                })
            })
            .collect()
    }

    pub async fn commands_for_player(&self, player_id: i64) -> Result<Vec<super::CommandRecord>> {
        let rows = sqlx::query(
            "SELECT player_id, command, executed_at FROM command_records WHERE player_id = ? ORDER BY id ASC",
        )
        .bind(player_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(super::CommandRecord {
                    player_id: row.try_get("player_id")?,
                    command: row.try_get("command")?,
                    executed_at: row.try_get("executed_at")?,
                })
            })
            .collect()
    }

    /// Count of sessions without a logout time across all players.
    pub async fn open_session_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE logout_time IS NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
