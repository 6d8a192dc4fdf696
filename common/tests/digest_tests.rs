// Digest aggregation, grouping and failure handling

mod support;

use async_trait::async_trait;
use mockall::mock;
use reminder_common::config::DigestConfig;
use reminder_common::digest::{DigestKind, DigestScheduler};
use reminder_common::errors::{NotificationError, ReminderError};
use reminder_common::models::{
    DueWindow, NotificationBody, NotificationColor, NotificationRecord, RecipientTokens,
};
use reminder_common::notification::NotificationGateway;
use std::sync::Arc;
use support::{task, InMemoryStore, RecordingGateway};

mock! {
    pub Gateway {}

    #[async_trait]
    impl NotificationGateway for Gateway {
        async fn resolve_owner_and_delegate_tokens(
            &self,
            user_id: &str,
        ) -> Result<RecipientTokens, NotificationError>;

        async fn persist_notification(
            &self,
            record: &NotificationRecord,
        ) -> Result<(), NotificationError>;

        async fn send_single(
            &self,
            device_id: &str,
            title: &str,
            body: &str,
            correlation_id: &str,
        ) -> Result<(), NotificationError>;

        async fn send_batch(
            &self,
            tokens: &[String],
            title: &str,
            bodies: &[NotificationBody],
            payload: &serde_json::Value,
        ) -> Result<(), NotificationError>;
    }
}

fn digest_config() -> DigestConfig {
    DigestConfig {
        daily_at: "00:00".to_string(),
        timezone: "Africa/Lagos".to_string(),
        six_hour_interval_hours: 6,
        due_soon_window_hours: 6,
    }
}

fn silent_gateway() -> MockGateway {
    let mut gateway = MockGateway::new();
    gateway.expect_send_batch().never();
    gateway.expect_send_single().never();
    gateway
}

#[tokio::test]
async fn test_no_due_tasks_sends_nothing() {
    let store = Arc::new(InMemoryStore::default());
    let digests =
        DigestScheduler::new(store.clone(), Arc::new(silent_gateway()), &digest_config()).unwrap();

    let daily = digests.run_daily_digest().await.unwrap();
    let six_hour = digests.run_six_hour_digest().await.unwrap();

    assert_eq!(daily.recipients, 0);
    assert_eq!(six_hour.recipients, 0);
    assert_eq!(
        *store.windows.lock().unwrap(),
        vec![DueWindow::Today, DueWindow::NextHours(6)]
    );
}

#[tokio::test]
async fn test_aggregation_failure_returns_error_without_sends() {
    let store = Arc::new(InMemoryStore::default());
    store.set_fail_listing(true);
    let digests =
        DigestScheduler::new(store, Arc::new(silent_gateway()), &digest_config()).unwrap();

    let err = digests.run_digest(DigestKind::Daily).await.unwrap_err();
    assert!(matches!(err, ReminderError::Aggregation(_)));
}

#[tokio::test]
async fn test_one_summary_per_recipient_with_count() {
    let store = Arc::new(InMemoryStore::default());
    {
        let mut due = store.due.lock().unwrap();
        due.insert(
            "device-a".to_string(),
            vec![
                task("a1", "2124-01-01T10:00:00Z", ""),
                task("a2", "2124-01-01T11:00:00Z", ""),
            ],
        );
        due.insert(
            "device-b".to_string(),
            vec![task("b1", "2124-01-01T12:00:00Z", "")],
        );
    }
    let gateway = Arc::new(RecordingGateway::default());
    let digests = DigestScheduler::new(store, gateway.clone(), &digest_config()).unwrap();

    let report = digests.run_daily_digest().await.unwrap();
    assert_eq!(report.recipients, 2);
    assert_eq!(report.notified, 2);

    let mut batches = gateway.batches();
    batches.sort_by(|a, b| a.tokens.cmp(&b.tokens));
    assert_eq!(batches.len(), 2);

    assert_eq!(batches[0].tokens, vec!["device-a"]);
    assert_eq!(batches[0].title, "Due Today");
    assert_eq!(batches[0].bodies[0].content, "You Have 2 tasks due today");
    assert_eq!(batches[0].bodies[0].color, NotificationColor::Due);
    assert_eq!(batches[0].payload.as_array().map(Vec::len), Some(2));

    assert_eq!(batches[1].tokens, vec!["device-b"]);
    assert_eq!(batches[1].bodies[0].content, "You Have 1 tasks due today");
}

#[tokio::test]
async fn test_six_hour_digest_wording() {
    let store = Arc::new(InMemoryStore::default());
    store.due.lock().unwrap().insert(
        "device-a".to_string(),
        vec![task("a1", "2124-01-01T10:00:00Z", "")],
    );

    let mut gateway = MockGateway::new();
    gateway
        .expect_send_batch()
        .withf(|tokens, title, bodies, _payload| {
            tokens.len() == 1
                && tokens[0] == "device-a"
                && title == "Due Shortly"
                && bodies[0].content == "You Have 1 tasks due in a few hours"
        })
        .times(1)
        .returning(|_, _, _, _| Ok(()));

    let digests = DigestScheduler::new(store, Arc::new(gateway), &digest_config()).unwrap();
    let report = digests.run_six_hour_digest().await.unwrap();
    assert_eq!(report.notified, 1);
}

#[tokio::test]
async fn test_send_failure_for_one_recipient_continues() {
    let store = Arc::new(InMemoryStore::default());
    {
        let mut due = store.due.lock().unwrap();
        due.insert("device-a".to_string(), vec![task("a1", "2124-01-01T10:00:00Z", "")]);
        due.insert("device-b".to_string(), vec![task("b1", "2124-01-01T12:00:00Z", "")]);
    }
    let gateway = Arc::new(RecordingGateway::default());
    gateway.fail_device("device-a");
    let digests = DigestScheduler::new(store, gateway.clone(), &digest_config()).unwrap();

    let report = digests.run_daily_digest().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.notified, 1);
    assert_eq!(gateway.batches()[0].tokens, vec!["device-b"]);
}

#[test]
fn test_invalid_digest_config_rejected() {
    let store = Arc::new(InMemoryStore::default());

    let mut config = digest_config();
    config.daily_at = "midnight".to_string();
    assert!(DigestScheduler::new(store.clone(), Arc::new(silent_gateway()), &config).is_err());

    let mut config = digest_config();
    config.timezone = "Atlantis/Capital".to_string();
    assert!(DigestScheduler::new(store, Arc::new(silent_gateway()), &config).is_err());
}
