// Digest jobs: daily and six-hourly summaries of tasks coming due

use crate::config::DigestConfig;
use crate::errors::{ReminderError, ScheduleError};
use crate::models::{DueWindow, NotificationBody, NotificationColor, Task};
use crate::notification::NotificationGateway;
use crate::schedule::{daily_cron_expression, next_cron_fire, parse_cron_expression, parse_timezone};
use crate::store::TaskStore;
use crate::telemetry;
use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

/// Which digest is being produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestKind {
    /// Everything due before the end of the local day
    Daily,
    /// Everything due within the next few hours
    SixHour,
}

impl DigestKind {
    pub fn title(&self) -> &'static str {
        match self {
            DigestKind::Daily => "Due Today",
            DigestKind::SixHour => "Due Shortly",
        }
    }

    pub fn content(&self, count: usize) -> String {
        match self {
            DigestKind::Daily => format!("You Have {} tasks due today", count),
            DigestKind::SixHour => format!("You Have {} tasks due in a few hours", count),
        }
    }

    fn source(&self) -> &'static str {
        match self {
            DigestKind::Daily => "digest_daily",
            DigestKind::SixHour => "digest_six_hour",
        }
    }
}

impl fmt::Display for DigestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestKind::Daily => write!(f, "daily"),
            DigestKind::SixHour => write!(f, "six_hour"),
        }
    }
}

/// Outcome of one digest run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestReport {
    pub recipients: usize,
    pub notified: usize,
    pub failed: usize,
}

/// Produces the daily and six-hour digests
pub struct DigestScheduler {
    store: Arc<dyn TaskStore>,
    gateway: Arc<dyn NotificationGateway>,
    daily_schedule: CronSchedule,
    timezone: Tz,
    six_hour_interval: Duration,
    due_soon_window_hours: u32,
}

impl DigestScheduler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        gateway: Arc<dyn NotificationGateway>,
        config: &DigestConfig,
    ) -> Result<Self, ScheduleError> {
        let expression = daily_cron_expression(&config.daily_at)?;
        let daily_schedule = parse_cron_expression(&expression)?;
        let timezone = parse_timezone(&config.timezone)?;

        Ok(Self {
            store,
            gateway,
            daily_schedule,
            timezone,
            six_hour_interval: Duration::from_secs(config.six_hour_interval_hours * 3600),
            due_soon_window_hours: config.due_soon_window_hours,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Window aggregated for `kind`
    pub fn window(&self, kind: DigestKind) -> DueWindow {
        match kind {
            DigestKind::Daily => DueWindow::Today,
            DigestKind::SixHour => DueWindow::NextHours(self.due_soon_window_hours),
        }
    }

    /// Next daily digest firing strictly after `after`
    pub fn next_daily_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        next_cron_fire(&self.daily_schedule, self.timezone, after)
    }

    pub async fn run_daily_digest(&self) -> Result<DigestReport, ReminderError> {
        self.run_digest(DigestKind::Daily).await
    }

    pub async fn run_six_hour_digest(&self) -> Result<DigestReport, ReminderError> {
        self.run_digest(DigestKind::SixHour).await
    }

    /// Aggregate due tasks per recipient and send each one a summary.
    ///
    /// Send failures are logged per recipient and do not stop the run.
    #[instrument(skip(self), fields(kind = %kind))]
    pub async fn run_digest(&self, kind: DigestKind) -> Result<DigestReport, ReminderError> {
        let started = Instant::now();
        let window = self.window(kind);

        let due = self
            .store
            .list_tasks_due_within(window)
            .await
            .map_err(ReminderError::Aggregation)?;

        let mut report = DigestReport::default();
        if due.is_empty() {
            info!(window = %window, "No notifications to send");
            telemetry::record_poll_duration(kind.source(), started.elapsed().as_secs_f64());
            return Ok(report);
        }

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        for (recipient, tasks) in &due {
            if tasks.is_empty() {
                continue;
            }
            report.recipients += 1;

            match self.send_summary(kind, recipient, tasks, &now).await {
                Ok(()) => {
                    report.notified += 1;
                    telemetry::record_notification(kind.source(), "sent");
                }
                Err(e) => {
                    report.failed += 1;
                    telemetry::record_notification(kind.source(), "failed");
                    warn!(recipient = %recipient, error = %e, "Failed to send digest");
                }
            }
        }

        telemetry::record_poll_duration(kind.source(), started.elapsed().as_secs_f64());
        info!(
            recipients = report.recipients,
            notified = report.notified,
            failed = report.failed,
            "Digest sent"
        );
        Ok(report)
    }

    async fn send_summary(
        &self,
        kind: DigestKind,
        recipient: &str,
        tasks: &[Task],
        now: &str,
    ) -> Result<(), ReminderError> {
        let bodies = [NotificationBody {
            content: kind.content(tasks.len()),
            color: NotificationColor::Due,
            time: now.to_string(),
        }];
        let payload = json!(tasks);

        self.gateway
            .send_batch(&[recipient.to_string()], kind.title(), &bodies, &payload)
            .await?;
        Ok(())
    }

    /// Fire the daily digest at the configured local time until shutdown
    pub async fn run_daily(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(timezone = %self.timezone, "Starting daily digest job");

        loop {
            let now = Utc::now();
            let Some(next) = self.next_daily_fire(now) else {
                error!("Daily digest schedule has no upcoming firing, stopping");
                break;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            debug!(next = %next, "Daily digest scheduled");

            tokio::select! {
                _ = sleep(wait) => {
                    if let Err(e) = self.run_daily_digest().await {
                        error!(error = %e, "Daily digest failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping daily digest job");
                    break;
                }
            }
        }
    }

    /// Fire the six-hour digest on its interval until shutdown
    pub async fn run_six_hourly(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            interval_hours = self.six_hour_interval.as_secs() / 3600,
            "Starting six-hour digest job"
        );

        let mut ticker = interval(self.six_hour_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; the first digest goes out one interval in
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_six_hour_digest().await {
                        error!(error = %e, "Six-hour digest failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping six-hour digest job");
                    break;
                }
            }
        }
    }
}
