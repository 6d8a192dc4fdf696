// Notification Gateway seam: token resolution, feed persistence and push delivery

pub mod push;

use crate::errors::NotificationError;
use crate::models::{NotificationBody, NotificationRecord, RecipientTokens};
use async_trait::async_trait;

pub use push::PushNotificationGateway;

/// NotificationGateway delivers notifications produced by the reminder engine
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Device tokens of a user and their delegate, plus the delegate id and owner name
    async fn resolve_owner_and_delegate_tokens(
        &self,
        user_id: &str,
    ) -> Result<RecipientTokens, NotificationError>;

    /// Persist a notification row for a recipient
    async fn persist_notification(&self, record: &NotificationRecord)
        -> Result<(), NotificationError>;

    /// Push one message to one device
    async fn send_single(
        &self,
        device_id: &str,
        title: &str,
        body: &str,
        correlation_id: &str,
    ) -> Result<(), NotificationError>;

    /// Push the same bodies and payload to many devices
    async fn send_batch(
        &self,
        tokens: &[String],
        title: &str,
        bodies: &[NotificationBody],
        payload: &serde_json::Value,
    ) -> Result<(), NotificationError>;
}
