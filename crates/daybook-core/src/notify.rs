use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::i18n::Localizer;
use crate::task::Task;

pub const DEFAULT_LOOKAHEAD_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub todo_id: u64,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

/// Due-soon reminders.
///
/// Each `(task, due date)` pair is announced at most once. The set of
/// announced pairs shrinks as tasks are completed, deleted or rescheduled,
/// so a rescheduled task is announced again for its new due date.
#[derive(Debug, Clone)]
pub struct NotificationCenter {
    active: Vec<Notification>,
    notified: BTreeSet<String>,
    lookahead: Duration,
    enabled: bool,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_LOOKAHEAD_HOURS))
    }
}

fn occurrence_key(todo_id: u64, due: DateTime<Utc>) -> String {
    format!("{todo_id}:{}", due.timestamp())
}

impl NotificationCenter {
    pub fn new(lookahead: Duration) -> Self {
        Self {
            active: Vec::new(),
            notified: BTreeSet::new(),
            lookahead,
            enabled: true,
        }
    }

    pub fn lookahead(&self) -> Duration {
        self.lookahead
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Emits a notification for every incomplete task due within
    /// `[now, now + lookahead]` that has not been announced yet, and
    /// returns only the new ones.
    #[tracing::instrument(skip(self, tasks, localizer), fields(tasks = tasks.len()))]
    pub fn scan(&mut self, tasks: &[Task], now: DateTime<Utc>, localizer: &Localizer) -> Vec<Notification> {
        if !self.enabled {
            debug!("notifications disabled; skipping scan");
            return Vec::new();
        }

        let live: BTreeSet<String> = tasks
            .iter()
            .filter(|task| !task.is_completed())
            .filter_map(|task| task.due_date.map(|due| occurrence_key(task.id, due)))
            .collect();
        let before = self.notified.len();
        self.notified.retain(|key| live.contains(key));
        if self.notified.len() != before {
            debug!(pruned = before - self.notified.len(), "pruned stale occurrence keys");
        }

        let horizon = now
            .checked_add_signed(self.lookahead)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut emitted = Vec::new();
        for task in tasks.iter().filter(|task| !task.is_completed()) {
            let Some(due) = task.due_date else {
                continue;
            };
            if due < now || due > horizon {
                continue;
            }

            let key = occurrence_key(task.id, due);
            if !self.notified.insert(key) {
                continue;
            }

            emitted.push(Notification {
                id: Uuid::new_v4(),
                todo_id: task.id,
                message: localizer.translate_with("taskDueSoon", &[("title", task.title.as_str())]),
                created_at: now,
                due_date: due,
            });
        }

        if !emitted.is_empty() {
            info!(count = emitted.len(), "emitted due-soon notifications");
        }
        self.active.extend(emitted.iter().cloned());
        emitted
    }

    /// Newest first.
    pub fn active(&self) -> Vec<&Notification> {
        let mut active: Vec<&Notification> = self.active.iter().collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        active
    }

    pub fn get(&self, id: Uuid) -> Option<&Notification> {
        self.active.iter().find(|n| n.id == id)
    }

    pub fn dismiss(&mut self, id: Uuid) -> bool {
        let before = self.active.len();
        self.active.retain(|n| n.id != id);
        let removed = self.active.len() != before;
        if removed {
            debug!(%id, "dismissed notification");
        }
        removed
    }

    pub fn dismiss_all_for(&mut self, todo_id: u64) -> usize {
        let before = self.active.len();
        self.active.retain(|n| n.todo_id != todo_id);
        let removed = before - self.active.len();
        if removed > 0 {
            debug!(todo_id, removed, "dismissed notifications for task");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::NotificationCenter;
    use crate::i18n::{Language, Localizer};
    use crate::task::{Priority, Status, Task};

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, 0, 0).unwrap()
    }

    fn task(id: u64, due: Option<DateTime<Utc>>, status: Status) -> Task {
        let completed = status == Status::Completed;
        Task {
            id,
            title: format!("task {id}"),
            description: None,
            due_date: due,
            priority: Priority::Medium,
            category: "work".to_string(),
            status,
            completed,
            completed_at: completed.then(|| at(1, 0)),
            created_at: at(1, 0),
            previous_status: None,
        }
    }

    #[test]
    fn only_incomplete_tasks_inside_window_are_announced() {
        let mut center = NotificationCenter::default();
        let localizer = Localizer::new(Language::En);
        let now = at(10, 8);
        let tasks = vec![
            task(1, Some(at(10, 20)), Status::Todo),
            task(2, Some(at(12, 8)), Status::Todo),
            task(3, Some(at(10, 9)), Status::Completed),
            task(4, Some(at(9, 8)), Status::InProgress),
            task(5, None, Status::Todo),
        ];

        let emitted = center.scan(&tasks, now, &localizer);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].todo_id, 1);
        assert_eq!(emitted[0].message, "Task \"task 1\" is due soon");
    }

    #[test]
    fn repeated_scans_do_not_duplicate() {
        let mut center = NotificationCenter::default();
        let localizer = Localizer::default();
        let tasks = vec![task(1, Some(at(10, 12)), Status::Todo)];

        assert_eq!(center.scan(&tasks, at(10, 8), &localizer).len(), 1);
        assert!(center.scan(&tasks, at(10, 9), &localizer).is_empty());
        assert_eq!(center.active().len(), 1);
    }

    #[test]
    fn rescheduling_announces_again() {
        let mut center = NotificationCenter::default();
        let localizer = Localizer::default();
        let mut tasks = vec![task(1, Some(at(10, 12)), Status::Todo)];
        assert_eq!(center.scan(&tasks, at(10, 8), &localizer).len(), 1);

        tasks[0].due_date = Some(at(10, 18));
        assert_eq!(center.scan(&tasks, at(10, 9), &localizer).len(), 1);

        // Moving back to the first slot is a fresh occurrence too, the old
        // key was pruned when it disappeared.
        tasks[0].due_date = Some(at(10, 12));
        assert_eq!(center.scan(&tasks, at(10, 10), &localizer).len(), 1);
    }

    #[test]
    fn oversized_lookahead_reaches_every_future_task() {
        let window = Duration::try_hours(2_500_000_000_000).expect("representable");
        let mut center = NotificationCenter::new(window);
        assert_eq!(center.lookahead(), window);

        let tasks = vec![
            task(1, Some(at(10, 12)), Status::Todo),
            task(2, Some(Utc.with_ymd_and_hms(9000, 1, 1, 0, 0, 0).unwrap()), Status::Todo),
            task(3, Some(at(9, 8)), Status::Todo),
        ];
        let emitted = center.scan(&tasks, at(10, 8), &Localizer::default());
        let ids: Vec<u64> = emitted.iter().map(|n| n.todo_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn disabled_center_emits_nothing() {
        let mut center = NotificationCenter::new(Duration::hours(48));
        center.set_enabled(false);
        let tasks = vec![task(1, Some(at(10, 12)), Status::Todo)];
        assert!(center.scan(&tasks, at(10, 8), &Localizer::default()).is_empty());
        assert!(center.active().is_empty());
    }

    #[test]
    fn dismissal_by_id_and_by_task() {
        let mut center = NotificationCenter::default();
        let localizer = Localizer::default();
        let mut tasks = vec![
            task(1, Some(at(10, 12)), Status::Todo),
            task(2, Some(at(10, 13)), Status::Todo),
        ];
        let first = center.scan(&tasks, at(10, 8), &localizer);
        tasks[0].due_date = Some(at(10, 14));
        center.scan(&tasks, at(10, 9), &localizer);
        assert_eq!(center.active().len(), 3);
        assert_eq!(center.active()[0].todo_id, 1);

        assert!(center.dismiss(first[1].id));
        assert!(!center.dismiss(first[1].id));
        assert_eq!(center.dismiss_all_for(1), 2);
        assert!(center.active().is_empty());
    }
}
