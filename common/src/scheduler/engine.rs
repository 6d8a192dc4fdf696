// Recurrence scheduler: tag-keyed job table, run loop and firing side effects

use crate::errors::{ReminderError, ScheduleError};
use crate::models::{
    Cadence, NotificationBody, NotificationColor, NotificationRecord, RecipientTokens, Task,
};
use crate::notification::NotificationGateway;
use crate::schedule::parse_due_time;
use crate::scheduler::job::{Firing, FiringAction, JobSnapshot, ScheduledJob};
use crate::store::TaskStore;
use crate::telemetry;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

const EXPIRED_FEED_TITLE: &str = "Expired Task";
const EXPIRED_PUSH_TITLE: &str = "Expired";
const EXPIRED_PUSH_CONTENT: &str = "This Task Has Expired";

/// Configuration for the recurrence scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the run loop looks for due jobs
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl From<&crate::config::SchedulerConfig> for SchedulerConfig {
    fn from(config: &crate::config::SchedulerConfig) -> Self {
        Self {
            tick_interval: Duration::from_millis(config.tick_interval_millis),
        }
    }
}

/// Scheduler is the entry point task create/edit code uses to (re)schedule a task
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Validate the task's due time, then atomically replace any job for its id
    async fn arm(&self, cadence: Cadence, task: &Task) -> Result<(), ScheduleError>;

    /// Arm using the task's own `repeat` field; `Ok(false)` when it names no cadence
    async fn arm_task(&self, task: &Task) -> Result<bool, ScheduleError>;

    /// Stop the run loop; jobs stay in the table
    async fn stop(&self);
}

/// Recurrence scheduler owning the job table.
///
/// Cloning is cheap and every clone shares the same table and loop.
#[derive(Clone)]
pub struct RecurrenceScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    config: SchedulerConfig,
    jobs: Mutex<HashMap<String, ScheduledJob>>,
    next_generation: AtomicU64,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    store: Arc<dyn TaskStore>,
    gateway: Arc<dyn NotificationGateway>,
}

impl RecurrenceScheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn TaskStore>,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

        Self {
            inner: Arc::new(SchedulerInner {
                config,
                jobs: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                running: AtomicBool::new(false),
                shutdown_tx,
                store,
                gateway,
            }),
        }
    }

    /// Start the run loop. Returns `false` if it was already running.
    pub fn start(&self) -> bool {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            return false;
        }

        let shutdown_rx = self.inner.shutdown_tx.subscribe();
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.run_loop(shutdown_rx).await });
        true
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    async fn run_loop(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            tick_interval_millis = self.inner.config.tick_interval.as_millis() as u64,
            "Starting recurrence scheduler loop"
        );

        let mut ticker = interval(self.inner.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let dispatched = self.dispatch_due(Utc::now()).await.len();
                    if dispatched > 0 {
                        debug!(firings = dispatched, "Dispatched due jobs");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping recurrence scheduler loop");
                    break;
                }
            }
        }
    }

    /// Fire every job due at `now`.
    ///
    /// Job state is advanced under the table lock; side effects run as
    /// independent tasks after the lock is released. The returned handles
    /// complete when those side effects finish.
    pub async fn dispatch_due(&self, now: DateTime<Utc>) -> Vec<JoinHandle<()>> {
        let firings = {
            let mut jobs = self.inner.jobs.lock().await;

            let due: Vec<String> = jobs
                .values()
                .filter(|job| job.is_due(now))
                .map(|job| job.tag().to_string())
                .collect();

            let mut firings = Vec::with_capacity(due.len());
            for tag in due {
                let Some(job) = jobs.get_mut(&tag) else {
                    continue;
                };

                match job.fire(now) {
                    Ok(firing) => firings.push(firing),
                    Err(e) => {
                        error!(tag = %tag, error = %e, "Failed to compute next occurrence");
                        telemetry::record_firing(job.cadence().as_str(), "invalid");
                    }
                }

                if job.is_exhausted() {
                    jobs.remove(&tag);
                    info!(tag = %tag, "Job completed its runs and was deregistered");
                }
            }

            telemetry::update_active_jobs(jobs.len());
            firings
        };

        firings
            .into_iter()
            .map(|firing| {
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move { inner.execute(firing).await })
            })
            .collect()
    }

    /// Re-arm every schedulable task from the store; returns how many were armed
    #[instrument(skip(self))]
    pub async fn rehydrate(&self) -> Result<usize, ReminderError> {
        let tasks = self
            .inner
            .store
            .list_schedulable_tasks()
            .await
            .map_err(ReminderError::Aggregation)?;

        let mut armed = 0;
        for task in &tasks {
            match self.arm_task(task).await {
                Ok(true) => armed += 1,
                Ok(false) => {}
                Err(e) => warn!(task_id = %task.task_id, error = %e, "Skipping task during rehydration"),
            }
        }

        info!(candidates = tasks.len(), armed, "Job table rehydrated");
        Ok(armed)
    }

    /// Snapshot of every live job
    pub async fn active_jobs(&self) -> Vec<JobSnapshot> {
        let jobs = self.inner.jobs.lock().await;
        jobs.values().map(ScheduledJob::snapshot).collect()
    }

    /// Snapshot of the live job for `tag`, if any
    pub async fn job(&self, tag: &str) -> Option<JobSnapshot> {
        self.inner.jobs.lock().await.get(tag).map(ScheduledJob::snapshot)
    }

    pub async fn is_armed(&self, tag: &str) -> bool {
        self.inner.jobs.lock().await.contains_key(tag)
    }
}

#[async_trait]
impl Scheduler for RecurrenceScheduler {
    #[instrument(skip(self, task), fields(tag = %task.task_id, cadence = %cadence))]
    async fn arm(&self, cadence: Cadence, task: &Task) -> Result<(), ScheduleError> {
        if task.task_id.is_empty() {
            return Err(ScheduleError::invalid("", "task id is empty"));
        }

        let anchor = parse_due_time(&task.task_id, &task.end_time)?;
        if cadence.rejects_past_anchor() && anchor.with_timezone(&Utc) < Utc::now() {
            return Err(ScheduleError::invalid(
                &task.task_id,
                format!("due time {} is in the past", task.end_time),
            ));
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let job = ScheduledJob::new(cadence, task.clone(), anchor, generation);

        {
            let mut jobs = self.inner.jobs.lock().await;
            if let Some(previous) = jobs.insert(task.task_id.clone(), job) {
                previous.cancel();
                debug!(
                    previous_generation = previous.generation(),
                    "Replaced existing job"
                );
            }
            telemetry::update_active_jobs(jobs.len());
        }

        info!(anchor = %anchor, generation, "Job armed");
        self.start();
        Ok(())
    }

    async fn arm_task(&self, task: &Task) -> Result<bool, ScheduleError> {
        match Cadence::from_repeat(&task.repeat) {
            Some(cadence) => self.arm(cadence, task).await.map(|_| true),
            None => {
                debug!(task_id = %task.task_id, repeat = %task.repeat, "Task has no cadence, not armed");
                Ok(false)
            }
        }
    }

    #[instrument(skip(self))]
    async fn stop(&self) {
        if self.inner.running.swap(false, Ordering::AcqRel) {
            let _ = self.inner.shutdown_tx.send(());
            info!("Recurrence scheduler stopped");
        }
    }
}

impl SchedulerInner {
    #[instrument(skip(self, firing), fields(tag = %firing.tag, cadence = %firing.cadence, generation = firing.generation))]
    async fn execute(&self, firing: Firing) {
        let cadence = firing.cadence.as_str();

        if firing.is_cancelled() {
            debug!("Job was replaced before its firing ran, skipping");
            telemetry::record_firing(cadence, "cancelled");
            return;
        }

        let result = match &firing.action {
            FiringAction::Expire(task) => self.notify_expired(task).await,
            FiringAction::CreateOccurrence(task) => self
                .store
                .create_occurrence(task)
                .await
                .map(|()| {
                    info!(
                        task_id = %task.task_id,
                        start_time = %task.start_time,
                        end_time = %task.end_time,
                        "Next occurrence created"
                    );
                })
                .map_err(ReminderError::Persistence),
        };

        match result {
            Ok(()) => telemetry::record_firing(cadence, "ok"),
            Err(e) => {
                // The job stays armed; the next interval is attempted regardless
                error!(error = %e, "Firing failed");
                telemetry::record_firing(cadence, e.kind());
            }
        }
    }

    /// Notify the owner (and delegate) that a one-off task expired.
    ///
    /// Every step is attempted; the first failure is reported after all ran.
    async fn notify_expired(&self, task: &Task) -> Result<(), ReminderError> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut first_error: Option<ReminderError> = None;

        let resolved = match self
            .gateway
            .resolve_owner_and_delegate_tokens(&task.user_id)
            .await
        {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(user_id = %task.user_id, error = %e, "Failed to resolve device tokens");
                first_error.get_or_insert(e.into());
                RecipientTokens::default()
            }
        };

        if let Some(owner_name) = &resolved.owner_name {
            let body = format!("{} has an expired task", owner_name);
            let recipients = std::iter::once(task.user_id.as_str())
                .chain(resolved.delegate_id.as_deref());

            for recipient in recipients {
                let record = NotificationRecord {
                    recipient_id: recipient.to_string(),
                    title: EXPIRED_FEED_TITLE.to_string(),
                    timestamp: now.clone(),
                    body: body.clone(),
                    color: NotificationColor::Expired,
                    correlation_id: task.task_id.clone(),
                };
                if let Err(e) = self.gateway.persist_notification(&record).await {
                    warn!(recipient = %recipient, error = %e, "Failed to persist expiry notification");
                    first_error.get_or_insert(e.into());
                }
            }
        }

        if resolved.tokens.is_empty() {
            info!(user_id = %task.user_id, "Owner and delegate have no registered devices");
        } else {
            let bodies = [NotificationBody {
                content: EXPIRED_PUSH_CONTENT.to_string(),
                color: NotificationColor::Expired,
                time: now,
            }];
            let payload = json!([task]);
            match self
                .gateway
                .send_batch(&resolved.tokens, EXPIRED_PUSH_TITLE, &bodies, &payload)
                .await
            {
                Ok(()) => telemetry::record_notification("expiry", "sent"),
                Err(e) => {
                    warn!(error = %e, "Failed to push expiry notification");
                    telemetry::record_notification("expiry", "failed");
                    first_error.get_or_insert(e.into());
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
