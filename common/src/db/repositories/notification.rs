// Notification repository: device tokens and in-app notification rows

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{NotificationRecord, RecipientTokens};
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

/// Repository for notification-related database operations
pub struct NotificationRepository {
    pool: DbPool,
}

impl NotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Device tokens registered by a user
    #[instrument(skip(self))]
    pub async fn device_tokens(&self, user_id: &str) -> Result<Vec<String>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT device_id
            FROM notification_tokens
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool.pool())
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("device_id").map_err(DatabaseError::from))
            .collect()
    }

    /// Resolve the owner's display name, delegate and the device tokens of both.
    ///
    /// A missing owner row yields empty tokens and no names rather than an error.
    #[instrument(skip(self))]
    pub async fn owner_and_delegate_tokens(
        &self,
        user_id: &str,
    ) -> Result<RecipientTokens, DatabaseError> {
        let owner = sqlx::query(
            r#"
            SELECT first_name, virtual_assistant_id
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool.pool())
        .await?;

        let Some(owner) = owner else {
            return Ok(RecipientTokens::default());
        };

        let owner_name = owner
            .try_get::<Option<String>, _>("first_name")?
            .filter(|name| !name.is_empty());
        let delegate_id = owner
            .try_get::<Option<String>, _>("virtual_assistant_id")?
            .filter(|id| !id.is_empty());

        let mut tokens = self.device_tokens(user_id).await?;
        if let Some(delegate) = &delegate_id {
            tokens.extend(self.device_tokens(delegate).await?);
        }

        Ok(RecipientTokens {
            tokens,
            delegate_id,
            owner_name,
        })
    }

    /// Insert a notification row for a recipient's feed
    #[instrument(skip(self, record), fields(recipient = %record.recipient_id))]
    pub async fn create(&self, record: &NotificationRecord) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (
                notification_id, user_id, title, content, color, created_at, task_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&record.recipient_id)
        .bind(&record.title)
        .bind(&record.body)
        .bind(record.color.hex())
        .bind(&record.timestamp)
        .bind(&record.correlation_id)
        .execute(self.pool.pool())
        .await?;

        tracing::debug!(task_id = %record.correlation_id, "Notification row created");
        Ok(())
    }
}
