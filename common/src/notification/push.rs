// Push notification gateway: PostgreSQL for tokens and feed rows, HTTP for delivery

use crate::config::PushConfig;
use crate::db::repositories::NotificationRepository;
use crate::errors::NotificationError;
use crate::models::{NotificationBody, NotificationRecord, RecipientTokens};
use crate::notification::NotificationGateway;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::instrument;

/// Gateway delivering through a legacy-protocol push endpoint authorised by server key
pub struct PushNotificationGateway {
    client: Client,
    endpoint: String,
    server_key: String,
    repo: NotificationRepository,
}

impl PushNotificationGateway {
    pub fn new(config: &PushConfig, repo: NotificationRepository) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| {
                NotificationError::DeliveryFailed(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            server_key: config.server_key.clone(),
            repo,
        })
    }

    async fn deliver(&self, message: &Value) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Message addressed to a single device
pub fn single_message(device_id: &str, title: &str, body: &str, correlation_id: &str) -> Value {
    json!({
        "to": device_id,
        "notification": {
            "title": title,
            "body": body,
        },
        "data": {
            "task_id": correlation_id,
        },
    })
}

/// Message addressed to many devices; the first body doubles as the visible text
pub fn batch_message(
    tokens: &[String],
    title: &str,
    bodies: &[NotificationBody],
    payload: &Value,
) -> Value {
    let visible = bodies.first().map(|b| b.content.as_str()).unwrap_or_default();
    json!({
        "registration_ids": tokens,
        "notification": {
            "title": title,
            "body": visible,
        },
        "data": {
            "bodies": bodies,
            "payload": payload,
        },
    })
}

#[async_trait]
impl NotificationGateway for PushNotificationGateway {
    #[instrument(skip(self))]
    async fn resolve_owner_and_delegate_tokens(
        &self,
        user_id: &str,
    ) -> Result<RecipientTokens, NotificationError> {
        self.repo
            .owner_and_delegate_tokens(user_id)
            .await
            .map_err(|e| NotificationError::TokenResolution {
                user_id: user_id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn persist_notification(
        &self,
        record: &NotificationRecord,
    ) -> Result<(), NotificationError> {
        self.repo
            .create(record)
            .await
            .map_err(|e| NotificationError::PersistFailed(e.to_string()))
    }

    #[instrument(skip(self, body))]
    async fn send_single(
        &self,
        device_id: &str,
        title: &str,
        body: &str,
        correlation_id: &str,
    ) -> Result<(), NotificationError> {
        self.deliver(&single_message(device_id, title, body, correlation_id))
            .await
    }

    #[instrument(skip(self, tokens, bodies, payload), fields(recipients = tokens.len()))]
    async fn send_batch(
        &self,
        tokens: &[String],
        title: &str,
        bodies: &[NotificationBody],
        payload: &Value,
    ) -> Result<(), NotificationError> {
        if tokens.is_empty() {
            return Ok(());
        }
        self.deliver(&batch_message(tokens, title, bodies, payload))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationColor;

    #[test]
    fn test_single_message_shape() {
        let message = single_message("device-1", "Heads up", "due soon", "task-9");
        assert_eq!(message["to"], "device-1");
        assert_eq!(message["notification"]["title"], "Heads up");
        assert_eq!(message["notification"]["body"], "due soon");
        assert_eq!(message["data"]["task_id"], "task-9");
    }

    #[test]
    fn test_batch_message_shape() {
        let tokens = vec!["a".to_string(), "b".to_string()];
        let bodies = vec![NotificationBody {
            content: "You Have 2 tasks due today".to_string(),
            color: NotificationColor::Due,
            time: "2024-01-01T00:00:00Z".to_string(),
        }];
        let message = batch_message(&tokens, "Due Today", &bodies, &json!({"n": 2}));

        assert_eq!(message["registration_ids"], json!(["a", "b"]));
        assert_eq!(message["notification"]["body"], "You Have 2 tasks due today");
        assert_eq!(message["data"]["bodies"][0]["color"], "due");
        assert_eq!(message["data"]["payload"]["n"], 2);
    }

    #[test]
    fn test_batch_message_without_bodies() {
        let message = batch_message(&["a".to_string()], "Expired", &[], &Value::Null);
        assert_eq!(message["notification"]["body"], "");
    }
}
