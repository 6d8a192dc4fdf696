// Task repository: PostgreSQL implementation of the Task Store

use crate::db::DbPool;
use crate::errors::StorageError;
use crate::models::{Cadence, DueTasks, DueWindow, Task, TaskStatus, TaskSummary};
use crate::schedule::due_window_bounds;
use crate::store::TaskStore;
use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::instrument;

const TASK_COLUMNS: &str = r#"
    t.task_id, t.user_id, t.title, t.description, t.assigned,
    t.start_time, t.end_time, t.status, t.repeat, t.scheduled_date,
    t.created_at, t.updated_at
"#;

/// Task Store backed by the `tasks` and `notification_tokens` tables
pub struct PgTaskStore {
    pool: DbPool,
    timezone: Tz,
}

impl PgTaskStore {
    /// Create a new PgTaskStore; `timezone` decides where "today" ends
    pub fn new(pool: DbPool, timezone: Tz) -> Self {
        Self { pool, timezone }
    }

    fn task_from_row(row: &PgRow) -> Result<Task, StorageError> {
        let status: String = row.try_get("status")?;
        let status = status.parse::<TaskStatus>().map_err(StorageError::InvalidData)?;

        Ok(Task {
            task_id: row.try_get("task_id")?,
            user_id: row.try_get("user_id")?,
            title: row.try_get("title")?,
            description: row.try_get::<Option<String>, _>("description")?.unwrap_or_default(),
            assigned: row
                .try_get::<Option<String>, _>("assigned")?
                .filter(|a| !a.is_empty()),
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            status,
            repeat: row.try_get::<Option<String>, _>("repeat")?.unwrap_or_default(),
            scheduled_date: row
                .try_get::<Option<String>, _>("scheduled_date")?
                .filter(|d| !d.is_empty()),
            created_at: row.try_get::<Option<String>, _>("created_at")?.unwrap_or_default(),
            updated_at: row.try_get::<Option<String>, _>("updated_at")?.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    #[instrument(skip(self, task), fields(task_id = %task.task_id, user_id = %task.user_id))]
    async fn create_occurrence(&self, task: &Task) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO tasks (
                task_id, user_id, title, description, assigned,
                start_time, end_time, status, repeat, scheduled_date,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&task.task_id)
        .bind(&task.user_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.assigned)
        .bind(&task.start_time)
        .bind(&task.end_time)
        .bind(task.status.to_string())
        .bind(&task.repeat)
        .bind(&task.scheduled_date)
        .bind(&task.created_at)
        .bind(&task.updated_at)
        .execute(self.pool.pool())
        .await?;

        tracing::info!(end_time = %task.end_time, "Task occurrence created");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_all_pending_tasks(&self) -> Result<Vec<TaskSummary>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT t.task_id, t.user_id, t.end_time, n.device_id
            FROM tasks t
            INNER JOIN notification_tokens n ON t.user_id = n.user_id
            WHERE t.status = 'PENDING'
            "#,
        )
        .fetch_all(self.pool.pool())
        .await?;

        rows.iter()
            .map(|row| -> Result<TaskSummary, StorageError> {
                Ok(TaskSummary {
                    task_id: row.try_get("task_id")?,
                    user_id: row.try_get("user_id")?,
                    end_time: row.try_get("end_time")?,
                    device_id: row.try_get("device_id")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(window = %window))]
    async fn list_tasks_due_within(&self, window: DueWindow) -> Result<DueTasks, StorageError> {
        let (from, until) = due_window_bounds(window, Utc::now(), self.timezone);

        let query = format!(
            r#"
            SELECT n.device_id AS recipient, {TASK_COLUMNS}
            FROM tasks t
            INNER JOIN notification_tokens n ON t.user_id = n.user_id
            WHERE t.status = 'PENDING'
              AND t.end_time::timestamptz >= $1
              AND t.end_time::timestamptz < $2
            ORDER BY t.end_time::timestamptz
            "#
        );

        let rows = sqlx::query(&query)
            .bind(from)
            .bind(until)
            .fetch_all(self.pool.pool())
            .await?;

        let mut grouped = DueTasks::new();
        for row in &rows {
            let recipient: String = row.try_get("recipient")?;
            grouped
                .entry(recipient)
                .or_default()
                .push(Self::task_from_row(row)?);
        }

        tracing::debug!(recipients = grouped.len(), rows = rows.len(), "Due tasks aggregated");
        Ok(grouped)
    }

    #[instrument(skip(self))]
    async fn list_schedulable_tasks(&self) -> Result<Vec<Task>, StorageError> {
        let query = format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks t
            WHERE t.status = 'PENDING'
              AND t.repeat IS NOT NULL AND t.repeat <> ''
              AND t.end_time::timestamptz > $1
            "#
        );

        let rows = sqlx::query(&query)
            .bind(Utc::now())
            .fetch_all(self.pool.pool())
            .await?;

        let tasks = rows
            .iter()
            .map(Self::task_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tasks
            .into_iter()
            .filter(|task| Cadence::from_repeat(&task.repeat).is_some())
            .collect())
    }
}
