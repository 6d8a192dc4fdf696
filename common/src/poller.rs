// Proximity poller: periodic scans warning owners of tasks about to fall due

use crate::errors::ReminderError;
use crate::models::TaskSummary;
use crate::notification::NotificationGateway;
use crate::schedule::{minutes_until, parse_due_time};
use crate::store::TaskStore;
use crate::telemetry;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

const PROXIMITY_TITLE: &str = "Your Notification is about to expire";

/// Time-to-due threshold a poll checks against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Horizon {
    /// `0 < minutes <= 5`
    FiveMinutes,
    /// `5 < minutes <= 30`
    ThirtyMinutes,
}

impl Horizon {
    /// Whether a task due in `minutes_until_due` falls in this horizon's bucket.
    ///
    /// Buckets never overlap and never include tasks already past due.
    pub fn contains(&self, minutes_until_due: f64) -> bool {
        match self {
            Horizon::FiveMinutes => minutes_until_due > 0.0 && minutes_until_due <= 5.0,
            Horizon::ThirtyMinutes => minutes_until_due > 5.0 && minutes_until_due <= 30.0,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Horizon::FiveMinutes => "your Task is due in 5 minutes",
            Horizon::ThirtyMinutes => "your Task is due in 30 minutes",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            Horizon::FiveMinutes => "poller_5m",
            Horizon::ThirtyMinutes => "poller_30m",
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Horizon::FiveMinutes => write!(f, "5m"),
            Horizon::ThirtyMinutes => write!(f, "30m"),
        }
    }
}

/// Outcome of one scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub scanned: usize,
    pub notified: usize,
    /// Rows skipped because their due time could not be parsed or the send failed
    pub failed: usize,
}

/// Scans every pending task and notifies the ones inside a horizon.
///
/// Keeps no state between runs: a task that stays inside a bucket across
/// several ticks is notified on each of them.
pub struct ProximityPoller {
    store: Arc<dyn TaskStore>,
    gateway: Arc<dyn NotificationGateway>,
}

impl ProximityPoller {
    pub fn new(store: Arc<dyn TaskStore>, gateway: Arc<dyn NotificationGateway>) -> Self {
        Self { store, gateway }
    }

    pub async fn poll_five_minute_horizon(&self) -> Result<PollReport, ReminderError> {
        self.poll(Horizon::FiveMinutes, Utc::now()).await
    }

    pub async fn poll_thirty_minute_horizon(&self) -> Result<PollReport, ReminderError> {
        self.poll(Horizon::ThirtyMinutes, Utc::now()).await
    }

    /// Scan all pending tasks against `horizon` as of `now`
    #[instrument(skip(self), fields(horizon = %horizon))]
    pub async fn poll(
        &self,
        horizon: Horizon,
        now: DateTime<Utc>,
    ) -> Result<PollReport, ReminderError> {
        let started = Instant::now();
        let tasks = self
            .store
            .list_all_pending_tasks()
            .await
            .map_err(ReminderError::Aggregation)?;

        let mut report = PollReport {
            scanned: tasks.len(),
            ..PollReport::default()
        };

        for task in &tasks {
            match self.check_task(horizon, task, now).await {
                Ok(true) => report.notified += 1,
                Ok(false) => {}
                Err(()) => report.failed += 1,
            }
        }

        telemetry::record_poll_duration(horizon.source(), started.elapsed().as_secs_f64());
        debug!(
            scanned = report.scanned,
            notified = report.notified,
            failed = report.failed,
            "Proximity poll finished"
        );
        Ok(report)
    }

    /// Returns whether a notification went out; `Err` means the row was logged and skipped
    async fn check_task(
        &self,
        horizon: Horizon,
        task: &TaskSummary,
        now: DateTime<Utc>,
    ) -> Result<bool, ()> {
        let due = parse_due_time(&task.task_id, &task.end_time).map_err(|e| {
            warn!(task_id = %task.task_id, error = %e, "Skipping task with unparsable due time");
        })?;

        if !horizon.contains(minutes_until(due, now)) {
            return Ok(false);
        }

        match self
            .gateway
            .send_single(
                &task.device_id,
                PROXIMITY_TITLE,
                horizon.message(),
                &task.task_id,
            )
            .await
        {
            Ok(()) => {
                telemetry::record_notification(horizon.source(), "sent");
                debug!(task_id = %task.task_id, user_id = %task.user_id, "Due-soon notification sent");
                Ok(true)
            }
            Err(e) => {
                telemetry::record_notification(horizon.source(), "failed");
                warn!(task_id = %task.task_id, error = %e, "Failed to send due-soon notification");
                Err(())
            }
        }
    }

    /// Poll `horizon` every `period` until shutdown
    pub async fn run(
        self: Arc<Self>,
        horizon: Horizon,
        period: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!(horizon = %horizon, period_seconds = period.as_secs(), "Starting proximity poller");

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll(horizon, Utc::now()).await {
                        error!(horizon = %horizon, error = %e, "Proximity poll aborted");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!(horizon = %horizon, "Shutdown signal received, stopping proximity poller");
                    break;
                }
            }
        }
    }
}
