// Scheduled job record and the state it advances on every firing

use crate::errors::ScheduleError;
use crate::models::{Cadence, Task, TaskStatus};
use crate::schedule::{format_due_time, parse_due_time, ScheduleTrigger};
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// One entry of the job table, keyed by its tag (the task id it was armed for).
///
/// The job owns the "current occurrence": the task row the next firing
/// computes from. Recurring firings rewrite it, so the chain advances from the
/// last computed occurrence rather than from the original anchor or wall clock.
#[derive(Debug)]
pub struct ScheduledJob {
    tag: String,
    cadence: Cadence,
    anchor_time: DateTime<FixedOffset>,
    next_run: DateTime<FixedOffset>,
    /// `None` means unbounded
    remaining_runs: Option<u32>,
    generation: u64,
    cancelled: Arc<AtomicBool>,
    occurrence: Task,
}

/// Side effect a firing performs once dispatched
#[derive(Debug, Clone, PartialEq)]
pub enum FiringAction {
    /// One-off task reached its due time: notify, persist nothing
    Expire(Task),
    /// Recurring task: persist the next occurrence
    CreateOccurrence(Task),
}

/// A firing taken off the job table, ready to run outside the lock
#[derive(Debug)]
pub struct Firing {
    pub tag: String,
    pub cadence: Cadence,
    pub generation: u64,
    pub action: FiringAction,
    cancelled: Arc<AtomicBool>,
}

impl Firing {
    /// True once the job that produced this firing has been replaced
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Read-only view of a job for inspection
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub tag: String,
    pub cadence: Cadence,
    pub anchor_time: DateTime<FixedOffset>,
    pub next_run: DateTime<FixedOffset>,
    pub remaining_runs: Option<u32>,
    pub generation: u64,
    pub current_end_time: String,
}

impl ScheduledJob {
    pub fn new(
        cadence: Cadence,
        task: Task,
        anchor_time: DateTime<FixedOffset>,
        generation: u64,
    ) -> Self {
        Self {
            tag: task.task_id.clone(),
            cadence,
            anchor_time,
            next_run: anchor_time,
            remaining_runs: cadence.max_runs(),
            generation,
            cancelled: Arc::new(AtomicBool::new(false)),
            occurrence: task,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_runs == Some(0)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_exhausted() && self.next_run.with_timezone(&Utc) <= now
    }

    /// Mark the job superseded; firings already handed out will not run
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            tag: self.tag.clone(),
            cadence: self.cadence,
            anchor_time: self.anchor_time,
            next_run: self.next_run,
            remaining_runs: self.remaining_runs,
            generation: self.generation,
            current_end_time: self.occurrence.end_time.clone(),
        }
    }

    /// Consume one run and advance the job's state.
    ///
    /// The run is consumed and `next_run` moves forward even when computing the
    /// next occurrence fails, so a bad row never makes the job fire in a tight loop.
    /// Missed intervals are not replayed: `next_run` lands on the first interval
    /// boundary after `now`, while the occurrence chain still advances one step.
    pub fn fire(&mut self, now: DateTime<Utc>) -> Result<Firing, ScheduleError> {
        if let Some(remaining) = self.remaining_runs.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }

        if self.cadence.is_recurring() {
            match self.next_run_after(now) {
                Some(next) => self.next_run = next,
                None => {
                    self.remaining_runs = Some(0);
                    return Err(ScheduleError::invalid(
                        &self.tag,
                        "next run time is out of range",
                    ));
                }
            }
        }

        let action = match self.cadence {
            Cadence::Never => FiringAction::Expire(self.occurrence.clone()),
            _ => {
                let next = self.next_occurrence(now)?;
                self.occurrence = next.clone();
                FiringAction::CreateOccurrence(next)
            }
        };

        Ok(Firing {
            tag: self.tag.clone(),
            cadence: self.cadence,
            generation: self.generation,
            action,
            cancelled: Arc::clone(&self.cancelled),
        })
    }

    fn next_run_after(&self, now: DateTime<Utc>) -> Option<DateTime<FixedOffset>> {
        let mut next = self.cadence.next_due(self.next_run)?;
        while next.with_timezone(&Utc) <= now {
            next = self.cadence.next_due(next)?;
        }
        Some(next)
    }

    fn next_occurrence(&self, now: DateTime<Utc>) -> Result<Task, ScheduleError> {
        let current = &self.occurrence;
        let base = parse_due_time(&self.tag, &current.end_time)?;
        let next_end = self
            .cadence
            .next_due(base)
            .ok_or_else(|| ScheduleError::invalid(&self.tag, "next due time is out of range"))?;

        let mut next = current.clone();
        next.start_time = current.end_time.clone();
        next.end_time = format_due_time(next_end);
        next.status = TaskStatus::Pending;

        if self.cadence == Cadence::Daily {
            next.updated_at = current.end_time.clone();
            next.created_at = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        }
        if self.cadence.mints_new_task_id() {
            next.task_id = Uuid::new_v4().to_string();
        }

        Ok(next)
    }
}
