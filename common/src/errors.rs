// Error handling framework for the reminder engine

use thiserror::Error;

/// Schedule-related errors, returned synchronously from arm calls and
/// from digest schedule construction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid schedule for task '{task_id}': {reason}")]
    InvalidSchedule { task_id: String, reason: String },

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid time of day '{0}', expected HH:MM")]
    InvalidTimeOfDay(String),
}

impl ScheduleError {
    pub fn invalid(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        ScheduleError::InvalidSchedule {
            task_id: task_id.into(),
            reason: reason.into(),
        }
    }
}

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key violation: {0}")]
    DuplicateKey(String),
}

/// Task Store errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Invalid stored value: {0}")]
    InvalidData(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

/// Notification Gateway errors
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Failed to resolve device tokens for user {user_id}: {reason}")]
    TokenResolution { user_id: String, reason: String },

    #[error("Failed to persist notification: {0}")]
    PersistFailed(String),

    #[error("Push delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Push service rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Failures surfaced by firings, polls and digest runs.
///
/// None of these stop a timer loop; they abort at most the current unit of work.
#[derive(Error, Debug)]
pub enum ReminderError {
    #[error("Failed to persist task occurrence: {0}")]
    Persistence(#[source] StorageError),

    #[error("Notification failed: {0}")]
    Notification(#[from] NotificationError),

    #[error("Failed to aggregate tasks: {0}")]
    Aggregation(#[source] StorageError),
}

impl ReminderError {
    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ReminderError::Persistence(_) => "persistence",
            ReminderError::Notification(_) => "notification",
            ReminderError::Aggregation(_) => "aggregation",
        }
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    match code.as_ref() {
                        "23505" => DatabaseError::DuplicateKey(db_err.message().to_string()),
                        _ => DatabaseError::QueryFailed(db_err.message().to_string()),
                    }
                } else {
                    DatabaseError::QueryFailed(db_err.message().to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::ConnectionFailed(err.to_string())
            }
            _ => StorageError::DatabaseError(err.to_string()),
        }
    }
}

impl From<DatabaseError> for StorageError {
    fn from(err: DatabaseError) -> Self {
        StorageError::DatabaseError(err.to_string())
    }
}

impl From<reqwest::Error> for NotificationError {
    fn from(err: reqwest::Error) -> Self {
        NotificationError::DeliveryFailed(err.to_string())
    }
}
