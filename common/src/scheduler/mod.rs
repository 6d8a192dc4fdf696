// Recurrence scheduler: one live job per task, fired on its cadence

pub mod engine;
pub mod job;

pub use engine::{RecurrenceScheduler, Scheduler, SchedulerConfig};
pub use job::{Firing, FiringAction, JobSnapshot, ScheduledJob};
