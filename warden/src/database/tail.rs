//! Tail checkpoint and archive import bookkeeping.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use super::store::TailStore;
use super::Database;

#[async_trait]
impl TailStore for Database {
    async fn load_checkpoint(&self, path: &str) -> Result<Option<u64>> {
        let offset: Option<i64> =
            sqlx::query_scalar("SELECT byte_offset FROM tail_checkpoints WHERE path = ?")
                .bind(path)
                .fetch_optional(&self.pool)
                .await?;

        Ok(offset.map(|o| o.max(0) as u64))
    }

    async fn save_checkpoint(&self, path: &str, offset: u64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tail_checkpoints (path, byte_offset, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                byte_offset = excluded.byte_offset,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(path)
        .bind(offset as i64)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_archive_imported(&self, name: &str) -> Result<bool> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT name FROM imported_archives WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn mark_archive_imported(&self, name: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO imported_archives (name, imported_at) VALUES (?, ?)")
            .bind(name)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
