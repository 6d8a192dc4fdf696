// In-memory task store and recording gateway shared by the engine tests

#![allow(dead_code)]

use async_trait::async_trait;
use reminder_common::errors::{NotificationError, StorageError};
use reminder_common::models::{
    DueTasks, DueWindow, NotificationBody, NotificationRecord, RecipientTokens, Task, TaskStatus,
    TaskSummary,
};
use reminder_common::notification::NotificationGateway;
use reminder_common::store::TaskStore;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub fn task(task_id: &str, end_time: &str, repeat: &str) -> Task {
    Task {
        task_id: task_id.to_string(),
        user_id: "user-1".to_string(),
        title: "Renew passport".to_string(),
        description: String::new(),
        assigned: None,
        start_time: end_time.to_string(),
        end_time: end_time.to_string(),
        status: TaskStatus::Pending,
        repeat: repeat.to_string(),
        scheduled_date: None,
        created_at: String::new(),
        updated_at: String::new(),
    }
}

pub fn summary(task_id: &str, end_time: &str, device_id: &str) -> TaskSummary {
    TaskSummary {
        task_id: task_id.to_string(),
        user_id: "user-1".to_string(),
        end_time: end_time.to_string(),
        device_id: device_id.to_string(),
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    pub created: Mutex<Vec<Task>>,
    pub pending: Mutex<Vec<TaskSummary>>,
    pub due: Mutex<DueTasks>,
    pub windows: Mutex<Vec<DueWindow>>,
    pub schedulable: Mutex<Vec<Task>>,
    pub fail_creates: AtomicBool,
    pub fail_listing: AtomicBool,
}

impl InMemoryStore {
    pub fn created(&self) -> Vec<Task> {
        self.created.lock().unwrap().clone()
    }

    pub fn set_fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    fn check_listing(&self) -> Result<(), StorageError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StorageError::ConnectionFailed("store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn create_occurrence(&self, task: &Task) -> Result<(), StorageError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(StorageError::DatabaseError("insert rejected".to_string()));
        }
        self.created.lock().unwrap().push(task.clone());
        Ok(())
    }

    async fn list_all_pending_tasks(&self) -> Result<Vec<TaskSummary>, StorageError> {
        self.check_listing()?;
        Ok(self.pending.lock().unwrap().clone())
    }

    async fn list_tasks_due_within(&self, window: DueWindow) -> Result<DueTasks, StorageError> {
        self.check_listing()?;
        self.windows.lock().unwrap().push(window);
        Ok(self.due.lock().unwrap().clone())
    }

    async fn list_schedulable_tasks(&self) -> Result<Vec<Task>, StorageError> {
        self.check_listing()?;
        Ok(self.schedulable.lock().unwrap().clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentSingle {
    pub device_id: String,
    pub title: String,
    pub body: String,
    pub correlation_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentBatch {
    pub tokens: Vec<String>,
    pub title: String,
    pub bodies: Vec<NotificationBody>,
    pub payload: serde_json::Value,
}

#[derive(Default)]
pub struct RecordingGateway {
    pub recipients: Mutex<RecipientTokens>,
    pub fail_resolve: AtomicBool,
    /// Devices whose sends are rejected
    pub failing_devices: Mutex<HashSet<String>>,
    pub persisted: Mutex<Vec<NotificationRecord>>,
    pub singles: Mutex<Vec<SentSingle>>,
    pub batches: Mutex<Vec<SentBatch>>,
}

impl RecordingGateway {
    pub fn with_recipients(recipients: RecipientTokens) -> Self {
        Self {
            recipients: Mutex::new(recipients),
            ..Self::default()
        }
    }

    pub fn fail_device(&self, device_id: &str) {
        self.failing_devices
            .lock()
            .unwrap()
            .insert(device_id.to_string());
    }

    pub fn singles(&self) -> Vec<SentSingle> {
        self.singles.lock().unwrap().clone()
    }

    pub fn batches(&self) -> Vec<SentBatch> {
        self.batches.lock().unwrap().clone()
    }

    pub fn persisted(&self) -> Vec<NotificationRecord> {
        self.persisted.lock().unwrap().clone()
    }

    fn rejects(&self, device_id: &str) -> bool {
        self.failing_devices.lock().unwrap().contains(device_id)
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn resolve_owner_and_delegate_tokens(
        &self,
        user_id: &str,
    ) -> Result<RecipientTokens, NotificationError> {
        if self.fail_resolve.load(Ordering::SeqCst) {
            return Err(NotificationError::TokenResolution {
                user_id: user_id.to_string(),
                reason: "lookup failed".to_string(),
            });
        }
        Ok(self.recipients.lock().unwrap().clone())
    }

    async fn persist_notification(
        &self,
        record: &NotificationRecord,
    ) -> Result<(), NotificationError> {
        self.persisted.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn send_single(
        &self,
        device_id: &str,
        title: &str,
        body: &str,
        correlation_id: &str,
    ) -> Result<(), NotificationError> {
        if self.rejects(device_id) {
            return Err(NotificationError::Rejected {
                status: 400,
                body: "InvalidRegistration".to_string(),
            });
        }
        self.singles.lock().unwrap().push(SentSingle {
            device_id: device_id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            correlation_id: correlation_id.to_string(),
        });
        Ok(())
    }

    async fn send_batch(
        &self,
        tokens: &[String],
        title: &str,
        bodies: &[NotificationBody],
        payload: &serde_json::Value,
    ) -> Result<(), NotificationError> {
        if tokens.iter().any(|token| self.rejects(token)) {
            return Err(NotificationError::Rejected {
                status: 400,
                body: "InvalidRegistration".to_string(),
            });
        }
        self.batches.lock().unwrap().push(SentBatch {
            tokens: tokens.to_vec(),
            title: title.to_string(),
            bodies: bodies.to_vec(),
            payload: payload.clone(),
        });
        Ok(())
    }
}
