// Bootstrap utilities for binary initialization

use crate::config::Settings;
use crate::db::repositories::{NotificationRepository, PgTaskStore};
use crate::db::DbPool;
use crate::notification::{NotificationGateway, PushNotificationGateway};
use crate::schedule::parse_timezone;
use crate::store::TaskStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Initialize database pool and verify it answers
///
/// # Errors
/// Returns error if the pool cannot connect or the health check fails
#[tracing::instrument(skip(settings))]
pub async fn init_database_pool(settings: &Settings) -> Result<DbPool> {
    info!("Initializing database pool");

    let db_pool = DbPool::new(&settings.database)
        .await
        .context("Failed to initialize database pool")?;

    db_pool
        .health_check()
        .await
        .context("Database health check failed")?;

    info!("Database pool initialized");
    Ok(db_pool)
}

/// Initialize the PostgreSQL task store
///
/// # Errors
/// Returns error if the digest timezone is not a known IANA name
pub fn init_task_store(settings: &Settings, db_pool: DbPool) -> Result<Arc<dyn TaskStore>> {
    let timezone = parse_timezone(&settings.digest.timezone)
        .context("Invalid digest timezone")?;

    info!(timezone = %timezone, "Task store initialized");
    Ok(Arc::new(PgTaskStore::new(db_pool, timezone)))
}

/// Initialize the push notification gateway
///
/// # Errors
/// Returns error if the HTTP client cannot be built
pub fn init_notification_gateway(
    settings: &Settings,
    db_pool: DbPool,
) -> Result<Arc<dyn NotificationGateway>> {
    if settings.push.server_key.is_empty() {
        tracing::warn!("Push server key is empty; deliveries will be rejected");
    }

    let gateway = PushNotificationGateway::new(&settings.push, NotificationRepository::new(db_pool))
        .context("Failed to initialize push notification gateway")?;

    info!(endpoint = %settings.push.endpoint, "Notification gateway initialized");
    Ok(Arc::new(gateway))
}
