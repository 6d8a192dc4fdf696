// Reminder scheduler binary entry point

use anyhow::{Context, Result};
use reminder_common::bootstrap::{init_database_pool, init_notification_gateway, init_task_store};
use reminder_common::config::Settings;
use reminder_common::digest::DigestScheduler;
use reminder_common::poller::{Horizon, ProximityPoller};
use reminder_common::scheduler::{RecurrenceScheduler, Scheduler, SchedulerConfig};
use reminder_common::telemetry::{init_logging, init_metrics, shutdown_tracer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;

    init_logging(
        &settings.observability.log_level,
        settings.observability.tracing_endpoint.as_deref(),
    )?;

    if let Err(e) = settings.validate() {
        error!(error = %e, "Invalid configuration");
        anyhow::bail!("Invalid configuration: {}", e);
    }

    info!("Starting reminder scheduler");

    init_metrics(settings.observability.metrics_port)?;

    let db_pool = init_database_pool(&settings).await?;
    let store = init_task_store(&settings, db_pool.clone())?;
    let gateway = init_notification_gateway(&settings, db_pool.clone())?;

    let scheduler = RecurrenceScheduler::new(
        SchedulerConfig::from(&settings.scheduler),
        Arc::clone(&store),
        Arc::clone(&gateway),
    );
    scheduler.start();

    if settings.scheduler.rehydrate_on_startup {
        match scheduler.rehydrate().await {
            Ok(armed) => info!(armed, "Rehydrated recurring jobs"),
            // The engine still runs; tasks armed later are scheduled normally
            Err(e) => error!(error = %e, "Failed to rehydrate recurring jobs"),
        }
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut workers = Vec::new();

    let poller = Arc::new(ProximityPoller::new(Arc::clone(&store), Arc::clone(&gateway)));
    workers.push(tokio::spawn(Arc::clone(&poller).run(
        Horizon::FiveMinutes,
        Duration::from_secs(settings.poller.five_minute_period_seconds),
        shutdown_tx.subscribe(),
    )));
    workers.push(tokio::spawn(poller.run(
        Horizon::ThirtyMinutes,
        Duration::from_secs(settings.poller.thirty_minute_period_seconds),
        shutdown_tx.subscribe(),
    )));

    let digests = Arc::new(
        DigestScheduler::new(Arc::clone(&store), Arc::clone(&gateway), &settings.digest)
            .context("Failed to build digest schedules")?,
    );
    workers.push(tokio::spawn(
        Arc::clone(&digests).run_daily(shutdown_tx.subscribe()),
    ));
    workers.push(tokio::spawn(digests.run_six_hourly(shutdown_tx.subscribe())));

    info!("Reminder scheduler running");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C signal, initiating graceful shutdown");

    scheduler.stop().await;
    let _ = shutdown_tx.send(());
    for worker in futures::future::join_all(workers).await {
        if let Err(e) = worker {
            error!(error = %e, "Background job panicked");
        }
    }

    db_pool.close().await;
    shutdown_tracer();

    info!("Reminder scheduler stopped");
    Ok(())
}
