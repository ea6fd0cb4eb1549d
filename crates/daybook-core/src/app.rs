//! Application state: the components wired together plus the current view.
//!
//! Front ends call the intent methods and render whatever [`App::view_model`]
//! returns. Cross-component rules live here, e.g. completing a task clears
//! its reminders and a task may only point at a registered category.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::calendar::{self, CalendarDay};
use crate::categories::{CategoryRegistry, DEFAULT_CATEGORY};
use crate::datetime::local_date;
use crate::error::{DaybookError, Result};
use crate::i18n::{Language, Localizer};
use crate::notify::{DEFAULT_LOOKAHEAD_HOURS, Notification, NotificationCenter};
use crate::prefs::{Preferences, Settings, Theme};
use crate::storage::SharedStorage;
use crate::store::TaskStore;
use crate::task::{Task, TaskDraft, TaskPatch};
use crate::views::{self, CategoryFilter, CompletionStats, ProductiveDay, TaskQuery, UpcomingBuckets};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HomeMode {
    #[default]
    Monthly,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Home(HomeMode),
    Upcoming,
    Notifications,
    Profile,
}

impl Default for View {
    fn default() -> Self {
        View::Home(HomeMode::default())
    }
}

impl View {
    pub const NAV_SLOTS: usize = 4;

    /// Bottom-navigation slot, `0..=3`.
    pub fn from_nav_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(View::Home(HomeMode::default())),
            1 => Some(View::Upcoming),
            2 => Some(View::Notifications),
            3 => Some(View::Profile),
            _ => None,
        }
    }

    pub fn nav_index(self) -> usize {
        match self {
            View::Home(_) => 0,
            View::Upcoming => 1,
            View::Notifications => 2,
            View::Profile => 3,
        }
    }

    pub fn title_key(self) -> &'static str {
        match self {
            View::Home(HomeMode::Monthly) => "monthly",
            View::Home(HomeMode::List) => "tasks",
            View::Upcoming => "upcomingTasks",
            View::Notifications => "notifications",
            View::Profile => "yourProgress",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppOptions {
    pub timezone: Tz,
    pub lookahead: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::UTC,
            lookahead: Duration::hours(DEFAULT_LOOKAHEAD_HOURS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthCell {
    pub day: CalendarDay,
    pub task_count: usize,
    pub is_today: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthModel<'a> {
    pub year: i32,
    pub month: u32,
    pub cells: Vec<MonthCell>,
    pub selected: NaiveDate,
    pub day_tasks: Vec<&'a Task>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileModel {
    pub stats: CompletionStats,
    pub most_productive: Option<ProductiveDay>,
    pub language: Language,
    pub theme: Theme,
    pub settings: Settings,
}

/// Derived data for the current view.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ViewModel<'a> {
    Monthly(MonthModel<'a>),
    List { tasks: Vec<&'a Task> },
    Upcoming(UpcomingBuckets<'a>),
    Notifications { active: Vec<&'a Notification> },
    Profile(ProfileModel),
}

pub struct App {
    store: TaskStore,
    categories: CategoryRegistry,
    notifications: NotificationCenter,
    prefs: Preferences,
    localizer: Localizer,
    tz: Tz,
    view: View,
    query: TaskQuery,
    selected_day: Option<NaiveDate>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("store", &self.store)
            .field("categories", &self.categories)
            .field("prefs", &self.prefs)
            .field("tz", &self.tz)
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}

impl App {
    #[tracing::instrument(skip(storage))]
    pub fn open(storage: SharedStorage, options: AppOptions) -> Self {
        let store = TaskStore::load(storage.clone());
        let mut categories = CategoryRegistry::load(storage.clone());
        let adopted = categories.adopt_orphans(&store);
        if adopted > 0 {
            info!(adopted, "registered categories referenced by tasks");
        }
        let prefs = Preferences::load(storage);

        let mut notifications = NotificationCenter::new(options.lookahead);
        notifications.set_enabled(prefs.settings().notifications);

        Self {
            localizer: Localizer::new(prefs.language()),
            store,
            categories,
            notifications,
            prefs,
            tz: options.timezone,
            view: View::default(),
            query: TaskQuery::default(),
            selected_day: None,
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn categories(&self) -> &CategoryRegistry {
        &self.categories
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    pub fn prefs(&self) -> &Preferences {
        &self.prefs
    }

    pub fn localizer(&self) -> &Localizer {
        &self.localizer
    }

    pub fn timezone(&self) -> &Tz {
        &self.tz
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn query(&self) -> &TaskQuery {
        &self.query
    }

    // tasks

    pub fn add_task(&mut self, mut draft: TaskDraft, now: DateTime<Utc>) -> Result<Task> {
        let category = match draft.category.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.default_category().to_string(),
        };
        self.require_category(&category)?;
        draft.category = Some(category);
        self.store.add(draft, now)
    }

    pub fn edit_task(&mut self, id: u64, patch: TaskPatch, now: DateTime<Utc>) -> Result<Option<Task>> {
        if let Some(category) = patch.category.as_deref().map(str::trim)
            && !category.is_empty()
        {
            self.require_category(category)?;
        }
        let updated = self.store.edit(id, patch, now)?;
        if let Some(task) = &updated
            && task.is_completed()
        {
            self.notifications.dismiss_all_for(task.id);
        }
        Ok(updated)
    }

    pub fn delete_task(&mut self, id: u64) -> bool {
        let removed = self.store.delete(id);
        if removed {
            self.notifications.dismiss_all_for(id);
        }
        removed
    }

    pub fn toggle_task(&mut self, id: u64, now: DateTime<Utc>) -> Option<Task> {
        let task = self.store.toggle_complete(id, now)?;
        if task.is_completed() {
            self.notifications.dismiss_all_for(id);
        }
        Some(task)
    }

    /// "Mark as complete" on a notification card. Clears every reminder
    /// for that task, not only the one acted on.
    #[tracing::instrument(skip(self))]
    pub fn complete_from_notification(&mut self, notification: Uuid, now: DateTime<Utc>) -> Option<Task> {
        let todo_id = self.notifications.get(notification)?.todo_id;
        let task = self.store.complete(todo_id, now);
        let dismissed = self.notifications.dismiss_all_for(todo_id);
        debug!(todo_id, dismissed, "completed from notification");
        task
    }

    // notifications

    pub fn dismiss_notification(&mut self, notification: Uuid) -> bool {
        self.notifications.dismiss(notification)
    }

    pub fn scan_notifications(&mut self, now: DateTime<Utc>) -> Vec<Notification> {
        self.notifications
            .scan(self.store.tasks(), now, &self.localizer)
    }

    // categories

    pub fn add_category(&mut self, name: &str) -> bool {
        self.categories.add(name)
    }

    pub fn rename_category(&mut self, old: &str, new: &str) -> bool {
        let renamed = self.categories.rename(old, new, &mut self.store);
        if renamed
            && let CategoryFilter::Only(current) = &mut self.query.category
            && current.as_str() == old
        {
            *current = new.trim().to_string();
        }
        renamed
    }

    pub fn remove_category(&mut self, name: &str) -> bool {
        let removed = self.categories.remove(name, &mut self.store);
        if removed && matches!(&self.query.category, CategoryFilter::Only(current) if current == name) {
            self.query.category = CategoryFilter::All;
        }
        removed
    }

    // preferences

    pub fn set_language(&mut self, language: Language) {
        self.prefs.set_language(language);
        self.localizer = Localizer::new(language);
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.prefs.set_theme(theme);
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.prefs.toggle_theme()
    }

    pub fn update_settings(&mut self, settings: Settings) {
        self.prefs.set_settings(settings);
        self.notifications.set_enabled(settings.notifications);
    }

    // navigation

    pub fn navigate(&mut self, view: View) {
        debug!(?view, "navigate");
        self.view = view;
    }

    /// Bottom-navigation tap. Returning to home keeps its display mode.
    pub fn navigate_index(&mut self, index: usize) -> bool {
        let Some(view) = View::from_nav_index(index) else {
            return false;
        };
        self.view = match (view, self.view) {
            (View::Home(_), View::Home(mode)) => View::Home(mode),
            (view, _) => view,
        };
        true
    }

    pub fn set_query(&mut self, query: TaskQuery) {
        self.query = query;
    }

    pub fn select_day(&mut self, day: NaiveDate) {
        self.selected_day = Some(day);
    }

    pub fn view_model(&self, now: DateTime<Utc>) -> Result<ViewModel<'_>> {
        let tasks = self.store.tasks();
        let model = match self.view {
            View::Home(HomeMode::Monthly) => ViewModel::Monthly(self.month_model(now)?),
            View::Home(HomeMode::List) => ViewModel::List {
                tasks: views::list_view(tasks, &self.query, &self.prefs.settings()),
            },
            View::Upcoming => ViewModel::Upcoming(views::bucket_upcoming(tasks, now, &self.tz)),
            View::Notifications => ViewModel::Notifications {
                active: self.notifications.active(),
            },
            View::Profile => ViewModel::Profile(ProfileModel {
                stats: views::completion_stats(tasks),
                most_productive: views::most_productive_day(tasks, &self.tz),
                language: self.prefs.language(),
                theme: self.prefs.theme(),
                settings: self.prefs.settings(),
            }),
        };
        Ok(model)
    }

    fn month_model(&self, now: DateTime<Utc>) -> Result<MonthModel<'_>> {
        let today = local_date(now, &self.tz);
        let selected = self.selected_day.unwrap_or(today);
        let tasks = self.store.tasks();

        let cells = calendar::month_grid(selected.year(), selected.month())?
            .into_iter()
            .map(|day| MonthCell {
                day,
                task_count: calendar::tasks_on_day(tasks, day.date, &self.tz).len(),
                is_today: day.date == today,
            })
            .collect();

        Ok(MonthModel {
            year: selected.year(),
            month: selected.month(),
            cells,
            selected,
            day_tasks: calendar::tasks_on_day(tasks, selected, &self.tz),
        })
    }

    fn default_category(&self) -> &str {
        if self.categories.contains(DEFAULT_CATEGORY) {
            DEFAULT_CATEGORY
        } else {
            self.categories.fallback()
        }
    }

    fn require_category(&self, name: &str) -> Result<()> {
        if self.categories.contains(name) {
            Ok(())
        } else {
            Err(DaybookError::validation(
                "category",
                self.localizer
                    .translate_with("unknownCategory", &[("category", name)]),
            ))
        }
    }
}
