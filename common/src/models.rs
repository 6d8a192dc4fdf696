use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Task Models
// ============================================================================

/// Task row as held by the Task Store.
///
/// Times are kept as RFC 3339 strings with offsets, exactly as stored; the
/// scheduler parses them when it needs an instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Delegate the task is assigned to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub repeat: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// TaskStatus represents the lifecycle state of a task row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Expired,
    Completed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "PENDING"),
            TaskStatus::Expired => write!(f, "EXPIRED"),
            TaskStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TaskStatus::Pending),
            "EXPIRED" => Ok(TaskStatus::Expired),
            "COMPLETED" => Ok(TaskStatus::Completed),
            _ => Err(format!("Invalid task status: {}", s)),
        }
    }
}

/// Cadence is the repeat policy of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cadence {
    Never,
    Daily,
    Weekly,
    BiWeekly,
    Monthly,
    Yearly,
}

impl Cadence {
    pub const ALL: [Cadence; 6] = [
        Cadence::Never,
        Cadence::Daily,
        Cadence::Weekly,
        Cadence::BiWeekly,
        Cadence::Monthly,
        Cadence::Yearly,
    ];

    /// Map a task's `repeat` field to a cadence.
    ///
    /// Returns `None` for empty or unrecognised values; such tasks get no job.
    pub fn from_repeat(repeat: &str) -> Option<Self> {
        repeat.parse().ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Never => "never",
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::BiWeekly => "bi-weekly",
            Cadence::Monthly => "monthly",
            Cadence::Yearly => "yearly",
        }
    }

    pub fn is_recurring(&self) -> bool {
        !matches!(self, Cadence::Never)
    }

    /// Whether each firing mints a fresh task id for the new occurrence.
    /// Bi-weekly, monthly and yearly occurrences keep the original id.
    pub fn mints_new_task_id(&self) -> bool {
        matches!(self, Cadence::Daily | Cadence::Weekly)
    }

    /// Whether arming rejects a due time that is already in the past
    pub fn rejects_past_anchor(&self) -> bool {
        matches!(self, Cadence::Daily)
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cadence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(Cadence::Never),
            "daily" => Ok(Cadence::Daily),
            "weekly" => Ok(Cadence::Weekly),
            "bi-weekly" => Ok(Cadence::BiWeekly),
            "monthly" => Ok(Cadence::Monthly),
            "yearly" => Ok(Cadence::Yearly),
            _ => Err(format!("Invalid cadence: {}", s)),
        }
    }
}

/// Pending task joined with the owner's device, as scanned by the pollers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub user_id: String,
    pub end_time: String,
    pub device_id: String,
}

/// Tasks due in a window, grouped by recipient
pub type DueTasks = HashMap<String, Vec<Task>>;

/// Time window a digest aggregates over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueWindow {
    /// From now until the end of the current day
    Today,
    /// From now until the given number of hours ahead
    NextHours(u32),
}

impl fmt::Display for DueWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DueWindow::Today => write!(f, "today"),
            DueWindow::NextHours(hours) => write!(f, "next_{}h", hours),
        }
    }
}

// ============================================================================
// Notification Models
// ============================================================================

/// Colour tag attached to a notification body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationColor {
    Expired,
    Due,
}

impl NotificationColor {
    pub fn hex(&self) -> &'static str {
        match self {
            NotificationColor::Expired => "#EB5757",
            NotificationColor::Due => "#F2C94C",
        }
    }
}

/// One entry of a push payload body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationBody {
    pub content: String,
    pub color: NotificationColor,
    pub time: String,
}

/// Notification row written for a recipient's in-app feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub recipient_id: String,
    pub title: String,
    pub timestamp: String,
    pub body: String,
    pub color: NotificationColor,
    /// Task that triggered the notification
    pub correlation_id: String,
}

/// Owner/delegate token resolution result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipientTokens {
    /// Device tokens of the owner followed by those of the delegate
    pub tokens: Vec<String>,
    pub delegate_id: Option<String>,
    pub owner_name: Option<String>,
}
