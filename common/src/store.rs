// Task Store seam consumed by the scheduler, pollers and digests

use crate::errors::StorageError;
use crate::models::{DueTasks, DueWindow, Task, TaskSummary};
use async_trait::async_trait;

/// TaskStore is the persistence boundary for task rows
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new task occurrence produced by a recurring firing
    async fn create_occurrence(&self, task: &Task) -> Result<(), StorageError>;

    /// All pending tasks across every user, joined with the owner's device
    async fn list_all_pending_tasks(&self) -> Result<Vec<TaskSummary>, StorageError>;

    /// Pending tasks due inside `window`, grouped by recipient
    async fn list_tasks_due_within(&self, window: DueWindow) -> Result<DueTasks, StorageError>;

    /// Pending tasks with a repeat cadence and a future due time
    async fn list_schedulable_tasks(&self) -> Result<Vec<Task>, StorageError>;
}
