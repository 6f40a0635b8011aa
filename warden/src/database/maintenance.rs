//! Schedule records and maintenance run tracking.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use tracing::{debug, error, info};

use super::records::{MaintenanceRun, ScheduleRecord};
use super::store::MaintenanceStore;
use super::Database;

#[async_trait]
impl MaintenanceStore for Database {
    async fn enabled_schedules(&self) -> Result<Vec<ScheduleRecord>> {
        Ok(self
            .list_schedules()
            .await?
            .into_iter()
            .filter(|s| s.enabled)
            .collect())
    }

    async fn store_maintenance_run(&self, run: &MaintenanceRun) -> Result<()> {
        debug!("Storing maintenance run: {} ({})", run.id, run.status);

        match sqlx::query(
            r#"
            INSERT OR REPLACE INTO maintenance_runs (
                id, schedule_label, cron_expression, status, stages_completed,
                started_at, completed_at, error_message
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.schedule_label)
        .bind(&run.cron_expression)
        .bind(&run.status)
        .bind(run.stages_completed)
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(&run.error_message)
        .execute(&self.pool)
        .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Failed to store maintenance run {}: {}", run.id, e);
                Err(e.into())
            }
        }
    }
}

impl Database {
    pub async fn list_schedules(&self) -> Result<Vec<ScheduleRecord>> {
        let rows = sqlx::query("SELECT id, cron_expression, label, enabled FROM schedules ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(ScheduleRecord {
                    id: row.try_get("id")?,
                    cron_expression: row.try_get("cron_expression")?,
                    label: row.try_get("label")?,
                    enabled: row.try_get("enabled")?,
                })
            })
            .collect()
    }

    pub async fn insert_schedule(
        &self,
        cron_expression: &str,
        label: Option<&str>,
        enabled: bool,
    ) -> Result<i64> {
        let result =
            sqlx::query("INSERT INTO schedules (cron_expression, label, enabled) VALUES (?, ?, ?)")
                .bind(cron_expression)
                .bind(label)
                .bind(enabled)
                .execute(&self.pool)
                .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn set_schedule_enabled(&self, id: i64, enabled: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE schedules SET enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_maintenance_run(&self, id: &str) -> Result<Option<MaintenanceRun>> {
        let row = sqlx::query(
            r#"
            SELECT id, schedule_label, cron_expression, status, stages_completed,
                   started_at, completed_at, error_message
            FROM maintenance_runs
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(MaintenanceRun {
                id: row.try_get("id")?,
                schedule_label: row.try_get("schedule_label")?,
                cron_expression: row.try_get("cron_expression")?,
                status: row.try_get("status")?,
                stages_completed: row.try_get("stages_completed")?,
                started_at: row.try_get("started_at")?,
                completed_at: row.try_get("completed_at")?,
                error_message: row.try_get("error_message")?,
            })),
            None => Ok(None),
        }
    }

    pub(super) async fn cleanup_interrupted_runs(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE maintenance_runs
            SET status = 'failed',
                completed_at = ?,
                error_message = 'Interrupted by restart'
            WHERE status = 'started'
            "#,
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            info!(
                "These runs were left in 'started' state and have been marked as 'failed'"
            );
        }

        Ok(result.rows_affected())
    }
}
