use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::categories::DEFAULT_CATEGORY;
use crate::error::{DaybookError, Result};
use crate::storage::{self, SharedStorage, TODOS_KEY};
use crate::task::{Status, Task, TaskDraft, TaskPatch, normalize_optional_text};

/// The task collection. Every mutation is written through to storage
/// before the call returns.
pub struct TaskStore {
    tasks: Vec<Task>,
    storage: SharedStorage,
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore")
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl TaskStore {
    #[tracing::instrument(skip(storage))]
    pub fn load(storage: SharedStorage) -> Self {
        let tasks: Vec<Task> = storage::load_or(storage.as_ref(), TODOS_KEY, Vec::new());
        info!(count = tasks.len(), "loaded tasks");
        Self { tasks, storage }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Time-based id, bumped past the largest id in use.
    pub fn next_id(&self, now: DateTime<Utc>) -> u64 {
        let stamp = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let floor = self
            .tasks
            .iter()
            .map(|t| t.id)
            .max()
            .map_or(0, |max| max.saturating_add(1));
        stamp.max(floor)
    }

    #[tracing::instrument(skip(self, draft), fields(title = %draft.title))]
    pub fn add(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> Result<Task> {
        let title = validate_title(&draft.title)?;
        let category = draft
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        let mut task = Task {
            id: self.next_id(now),
            title,
            description: normalize_optional_text(draft.description),
            due_date: draft.due_date,
            priority: draft.priority,
            category,
            status: Status::Todo,
            completed: false,
            completed_at: None,
            created_at: now,
            previous_status: None,
        };
        task.set_status(draft.status, now);

        self.tasks.push(task.clone());
        self.persist();
        info!(id = task.id, "task added");
        Ok(task)
    }

    /// Merges `patch` into the task. Unknown ids are a no-op and return
    /// `Ok(None)`.
    #[tracing::instrument(skip(self, patch))]
    pub fn edit(&mut self, id: u64, patch: TaskPatch, now: DateTime<Utc>) -> Result<Option<Task>> {
        let title = patch.title.as_deref().map(validate_title).transpose()?;

        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!(id, "edit ignored; no such task");
            return Ok(None);
        };

        if let Some(title) = title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = normalize_optional_text(description);
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = due_date;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(category) = patch.category {
            let category = category.trim();
            if !category.is_empty() {
                task.category = category.to_string();
            }
        }
        if let Some(status) = patch.status {
            task.set_status(status, now);
        }

        let updated = task.clone();
        self.persist();
        info!(id, "task updated");
        Ok(Some(updated))
    }

    /// Removes the task if present. Returns whether anything was removed.
    #[tracing::instrument(skip(self))]
    pub fn delete(&mut self, id: u64) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        if self.tasks.len() == before {
            debug!(id, "delete ignored; no such task");
            return false;
        }
        self.persist();
        info!(id, "task deleted");
        true
    }

    #[tracing::instrument(skip(self))]
    pub fn toggle_complete(&mut self, id: u64, now: DateTime<Utc>) -> Option<Task> {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!(id, "toggle ignored; no such task");
            return None;
        };
        task.toggle_complete(now);
        let updated = task.clone();
        self.persist();
        info!(id, completed = updated.completed, "task completion toggled");
        Some(updated)
    }

    /// Marks the task completed; already-completed tasks are left as they are.
    #[tracing::instrument(skip(self))]
    pub fn complete(&mut self, id: u64, now: DateTime<Utc>) -> Option<Task> {
        let task = self.tasks.iter_mut().find(|t| t.id == id)?;
        if task.is_completed() {
            return Some(task.clone());
        }
        task.set_status(Status::Completed, now);
        let updated = task.clone();
        self.persist();
        info!(id, "task completed");
        Some(updated)
    }

    /// Moves every task in `from` to `to`. Returns the number of tasks moved.
    #[tracing::instrument(skip(self))]
    pub fn reassign_category(&mut self, from: &str, to: &str) -> usize {
        let mut moved = 0;
        for task in self.tasks.iter_mut().filter(|t| t.category == from) {
            task.category = to.to_string();
            moved += 1;
        }
        if moved > 0 {
            self.persist();
        }
        debug!(moved, "reassigned tasks");
        moved
    }

    /// Category names referenced by tasks, in first-seen order.
    pub fn referenced_categories(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for task in &self.tasks {
            if !seen.iter().any(|c| c == &task.category) {
                seen.push(task.category.clone());
            }
        }
        seen
    }

    fn persist(&self) {
        storage::save_or_log(self.storage.as_ref(), TODOS_KEY, &self.tasks);
    }
}

fn validate_title(raw: &str) -> Result<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(DaybookError::validation("title", "title is required"));
    }
    Ok(title.to_string())
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use chrono::{Duration, TimeZone, Utc};

    use super::TaskStore;
    use crate::storage::{MemoryStorage, TODOS_KEY};
    use crate::task::{Priority, Status, Task, TaskDraft, TaskPatch};

    fn fixture() -> (Rc<MemoryStorage>, TaskStore) {
        let backend = Rc::new(MemoryStorage::new());
        let store = TaskStore::load(backend.clone());
        (backend, store)
    }

    fn assert_invariant(tasks: &[Task]) {
        for task in tasks {
            assert_eq!(task.completed, task.status == Status::Completed);
            assert_eq!(task.completed_at.is_some(), task.completed);
        }
    }

    #[test]
    fn add_assigns_identity_and_writes_through() {
        let (backend, mut store) = fixture();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

        let first = store.add(TaskDraft::titled("  Plan trip  "), now).unwrap();
        let second = store.add(TaskDraft::titled("Pack bags"), now).unwrap();

        assert_eq!(first.title, "Plan trip");
        assert_eq!(first.id, now.timestamp_millis() as u64);
        assert_eq!(second.id, first.id + 1);
        assert_eq!(first.created_at, now);
        assert_eq!(first.category, "personal");

        let raw = backend.raw(TODOS_KEY).expect("persisted");
        let stored: Vec<Task> = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[test]
    fn blank_title_is_rejected_without_mutation() {
        let (backend, mut store) = fixture();
        let now = Utc::now();

        let err = store.add(TaskDraft::titled("   "), now).unwrap_err();
        assert!(err.is_validation());
        assert!(store.is_empty());
        assert_eq!(backend.raw(TODOS_KEY), None);

        let task = store.add(TaskDraft::titled("Real"), now).unwrap();
        let patch = TaskPatch {
            title: Some(String::new()),
            priority: Some(Priority::High),
            ..TaskPatch::default()
        };
        assert!(store.edit(task.id, patch, now).is_err());
        assert_eq!(store.get(task.id).unwrap().priority, Priority::Medium);
    }

    #[test]
    fn completed_draft_gets_completion_time() {
        let (_backend, mut store) = fixture();
        let now = Utc::now();
        let draft = TaskDraft {
            status: Status::Completed,
            ..TaskDraft::titled("Already done")
        };
        let task = store.add(draft, now).unwrap();
        assert!(task.completed);
        assert_eq!(task.completed_at, Some(now));
        assert_invariant(store.tasks());
    }

    #[test]
    fn edit_merges_and_keeps_invariant() {
        let (_backend, mut store) = fixture();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let task = store.add(TaskDraft::titled("Report"), now).unwrap();

        let due = now + Duration::days(2);
        let patch = TaskPatch {
            description: Some(Some("quarterly".to_string())),
            due_date: Some(Some(due)),
            status: Some(Status::Completed),
            ..TaskPatch::default()
        };
        let later = now + Duration::hours(3);
        let updated = store.edit(task.id, patch, later).unwrap().unwrap();
        assert_eq!(updated.title, "Report");
        assert_eq!(updated.description.as_deref(), Some("quarterly"));
        assert_eq!(updated.due_date, Some(due));
        assert_eq!(updated.completed_at, Some(later));

        let reopen = TaskPatch {
            status: Some(Status::Blocked),
            due_date: Some(None),
            ..TaskPatch::default()
        };
        let reopened = store.edit(task.id, reopen, later).unwrap().unwrap();
        assert_eq!(reopened.due_date, None);
        assert!(!reopened.completed);
        assert_invariant(store.tasks());
    }

    #[test]
    fn unknown_ids_are_noops() {
        let (backend, mut store) = fixture();
        let now = Utc::now();
        store.add(TaskDraft::titled("Keep me"), now).unwrap();
        let snapshot = backend.raw(TODOS_KEY);

        assert!(!store.delete(42));
        assert!(store.toggle_complete(42, now).is_none());
        assert!(store.edit(42, TaskPatch::default(), now).unwrap().is_none());
        assert_eq!(store.len(), 1);
        assert_eq!(backend.raw(TODOS_KEY), snapshot);
    }

    #[test]
    fn toggle_twice_returns_to_original_status() {
        let (_backend, mut store) = fixture();
        let now = Utc::now();
        let draft = TaskDraft {
            status: Status::InProgress,
            ..TaskDraft::titled("Refactor")
        };
        let task = store.add(draft, now).unwrap();

        let done = store.toggle_complete(task.id, now).unwrap();
        assert!(done.completed);
        assert_invariant(store.tasks());

        let undone = store.toggle_complete(task.id, now).unwrap();
        assert_eq!(undone.status, Status::InProgress);
        assert_invariant(store.tasks());
    }

    #[test]
    fn write_failure_keeps_memory_state() {
        let (backend, mut store) = fixture();
        backend.set_fail_writes(true);

        let task = store.add(TaskDraft::titled("Offline"), Utc::now()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get(task.id).is_some());
        assert_eq!(backend.raw(TODOS_KEY), None);
    }

    #[test]
    fn corrupted_collection_loads_empty() {
        let backend = Rc::new(MemoryStorage::new().with_entry(TODOS_KEY, "[{\"id\":"));
        let store = TaskStore::load(backend);
        assert!(store.is_empty());
    }
}
