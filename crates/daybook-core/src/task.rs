use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::categories::DEFAULT_CATEGORY;

/// Stands in for a blank title found in stored data.
pub const UNTITLED: &str = "untitled";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Todo,
    InProgress,
    Blocked,
    Completed,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Todo,
        Status::InProgress,
        Status::Blocked,
        Status::Completed,
    ];

    /// Stable identifier, also the translation key of the status label.
    pub fn key(self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::InProgress => "in_progress",
            Status::Blocked => "blocked",
            Status::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL.into_iter().find(|status| status.key() == normalized)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Sort rank: high first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Some(Priority::Low),
            "medium" | "med" | "m" => Some(Priority::Medium),
            "high" | "h" => Some(Priority::High),
            _ => None,
        }
    }
}

/// A single to-do item.
///
/// `completed` and `completed_at` are derived from `status`; use
/// [`Task::set_status`] instead of writing them directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", from = "StoredTask")]
pub struct Task {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub category: String,
    pub status: Status,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<Status>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == Status::Completed
    }

    /// Moves the task to `status`, keeping `completed` and `completed_at`
    /// consistent. Re-entering `Completed` keeps the original timestamp.
    pub fn set_status(&mut self, status: Status, now: DateTime<Utc>) {
        if status == self.status {
            return;
        }

        if status == Status::Completed {
            self.previous_status = Some(self.status);
            self.completed_at = Some(now);
        } else {
            self.previous_status = None;
            self.completed_at = None;
        }
        self.status = status;
        self.completed = status == Status::Completed;
    }

    /// Flips completion. Reopening restores the status held before completion.
    pub fn toggle_complete(&mut self, now: DateTime<Utc>) {
        if self.is_completed() {
            let reopened = self.previous_status.take().unwrap_or_default();
            self.set_status(reopened, now);
        } else {
            self.set_status(Status::Completed, now);
        }
    }

    /// Day used by completion statistics.
    pub fn completion_time(&self) -> DateTime<Utc> {
        self.completed_at.unwrap_or(self.created_at)
    }

    pub fn matches_text(&self, needle_lower: &str) -> bool {
        if needle_lower.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(needle_lower)
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(needle_lower))
            || self.category.to_lowercase().contains(needle_lower)
    }
}

/// Form submission for a new task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub category: Option<String>,
    pub status: Status,
}

impl TaskDraft {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Partial update. `None` leaves a field alone; for optional fields
/// `Some(None)` clears the value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub priority: Option<Priority>,
    pub category: Option<String>,
    pub status: Option<Status>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.priority.is_none()
            && self.category.is_none()
            && self.status.is_none()
    }
}

pub(crate) fn normalize_optional_text(text: Option<String>) -> Option<String> {
    text.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// On-disk shape. Accepts records written by the boolean-only variant
/// (no `status`) and repairs the completion fields. A missing or blank
/// title loads as [`UNTITLED`] so the record is kept.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTask {
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    priority: Option<Priority>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    status: Option<Status>,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    previous_status: Option<Status>,
}

impl From<StoredTask> for Task {
    fn from(stored: StoredTask) -> Self {
        let status = stored.status.unwrap_or(if stored.completed {
            Status::Completed
        } else {
            Status::Todo
        });
        let completed = status == Status::Completed;
        let completed_at = if completed {
            Some(stored.completed_at.unwrap_or(stored.created_at))
        } else {
            None
        };
        let previous_status = if completed {
            stored
                .previous_status
                .filter(|prior| *prior != Status::Completed)
        } else {
            None
        };

        Self {
            id: stored.id,
            title: match stored.title.trim() {
                "" => {
                    tracing::warn!(id = stored.id, "stored task has no title");
                    UNTITLED.to_string()
                }
                title => title.to_string(),
            },
            description: normalize_optional_text(stored.description),
            due_date: stored.due_date,
            priority: stored.priority.unwrap_or_default(),
            category: stored
                .category
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            status,
            completed,
            completed_at,
            created_at: stored.created_at,
            previous_status,
        }
    }
}
