//! Pure derivations over the task collection. Nothing here touches storage.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::categories::BUILTIN_CATEGORIES;
use crate::datetime::local_date;
use crate::prefs::Settings;
use crate::task::Task;

/// List ordering: open before completed, then priority (high first), then
/// due date with undated tasks last, then id.
pub fn primary_order(a: &Task, b: &Task) -> Ordering {
    a.is_completed()
        .cmp(&b.is_completed())
        .then_with(|| a.priority.rank().cmp(&b.priority.rank()))
        .then_with(|| due_order(a.due_date, b.due_date))
        .then_with(|| a.id.cmp(&b.id))
}

fn due_order(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn sorted<'a, I>(tasks: I) -> Vec<&'a Task>
where
    I: IntoIterator<Item = &'a Task>,
{
    let mut out: Vec<&Task> = tasks.into_iter().collect();
    out.sort_by(|a, b| primary_order(a, b));
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(String),
}

impl CategoryFilter {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            Self::All
        } else {
            Self::Only(trimmed.to_string())
        }
    }

    pub fn admits(&self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Only(category) => task.category == *category,
        }
    }
}

/// Search box plus category selector of the list view.
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    pub text: String,
    pub category: CategoryFilter,
}

impl TaskQuery {
    pub fn matches(&self, task: &Task) -> bool {
        let needle = self.text.trim().to_lowercase();
        task.matches_text(&needle) && self.category.admits(task)
    }
}

pub fn filter<'a>(tasks: &'a [Task], query: &TaskQuery) -> Vec<&'a Task> {
    let needle = query.text.trim().to_lowercase();
    tasks
        .iter()
        .filter(|t| t.matches_text(&needle) && query.category.admits(t))
        .collect()
}

/// Tasks for the list view, honouring `showCompleted` and `autoSort`.
pub fn list_view<'a>(tasks: &'a [Task], query: &TaskQuery, settings: &Settings) -> Vec<&'a Task> {
    let mut visible = filter(tasks, query);
    if !settings.show_completed {
        visible.retain(|t| !t.is_completed());
    }
    if settings.auto_sort {
        visible.sort_by(|a, b| primary_order(a, b));
    }
    visible
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpcomingBuckets<'a> {
    pub today: Vec<&'a Task>,
    pub tomorrow: Vec<&'a Task>,
    pub later: Vec<&'a Task>,
}

impl UpcomingBuckets<'_> {
    pub fn is_empty(&self) -> bool {
        self.today.is_empty() && self.tomorrow.is_empty() && self.later.is_empty()
    }

    pub fn len(&self) -> usize {
        self.today.len() + self.tomorrow.len() + self.later.len()
    }
}

/// Splits open, dated tasks by calendar day in `tz`. Overdue tasks land in
/// `today`; everything from the day after tomorrow on is `later`.
pub fn bucket_upcoming<'a>(tasks: &'a [Task], now: DateTime<Utc>, tz: &Tz) -> UpcomingBuckets<'a> {
    let today = local_date(now, tz);
    let mut dated: Vec<(&Task, DateTime<Utc>)> = tasks
        .iter()
        .filter(|t| !t.is_completed())
        .filter_map(|t| t.due_date.map(|due| (t, due)))
        .collect();
    dated.sort_by(|(a, a_due), (b, b_due)| a_due.cmp(b_due).then_with(|| a.id.cmp(&b.id)));

    let mut buckets = UpcomingBuckets::default();
    for (task, due) in dated {
        let offset = (local_date(due, tz) - today).num_days();
        match offset {
            i64::MIN..=0 => buckets.today.push(task),
            1 => buckets.tomorrow.push(task),
            _ => buckets.later.push(task),
        }
    }
    buckets
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryShare {
    pub category: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    /// Percent in `0.0..=100.0`; zero for an empty collection.
    pub completion_rate: f64,
    pub by_category: Vec<CategoryShare>,
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

pub fn completion_stats(tasks: &[Task]) -> CompletionStats {
    let total = tasks.len();
    let completed = tasks.iter().filter(|t| t.is_completed()).count();

    let by_category = BUILTIN_CATEGORIES
        .iter()
        .map(|category| {
            let count = tasks.iter().filter(|t| t.category == *category).count();
            CategoryShare {
                category: (*category).to_string(),
                count,
                percentage: percent(count, total),
            }
        })
        .collect();

    CompletionStats {
        total,
        completed,
        pending: total - completed,
        completion_rate: percent(completed, total),
        by_category,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProductiveDay {
    pub date: NaiveDate,
    pub completed: usize,
}

/// Day with the most completions. Ties go to the day seen first while
/// walking the collection in order.
pub fn most_productive_day(tasks: &[Task], tz: &Tz) -> Option<ProductiveDay> {
    let mut order: Vec<NaiveDate> = Vec::new();
    let mut counts: HashMap<NaiveDate, usize> = HashMap::new();

    for task in tasks.iter().filter(|t| t.is_completed()) {
        let day = local_date(task.completion_time(), tz);
        let count = counts.entry(day).or_insert(0);
        if *count == 0 {
            order.push(day);
        }
        *count += 1;
    }

    let mut best: Option<ProductiveDay> = None;
    for date in order {
        let completed = counts.get(&date).copied().unwrap_or(0);
        if best.is_none_or(|b| completed > b.completed) {
            best = Some(ProductiveDay { date, completed });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

    use super::{
        CategoryFilter, TaskQuery, bucket_upcoming, completion_stats, filter, list_view,
        most_productive_day, primary_order, sorted,
    };
    use crate::prefs::Settings;
    use crate::task::{Priority, Status, Task};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn task(id: u64, status: Status, priority: Priority, due: Option<DateTime<Utc>>) -> Task {
        let created = at(2024, 1, 1, 0, 0);
        let completed = status == Status::Completed;
        Task {
            id,
            title: format!("task {id}"),
            description: None,
            due_date: due,
            priority,
            category: "personal".to_string(),
            status,
            completed,
            completed_at: completed.then_some(created),
            created_at: created,
            previous_status: None,
        }
    }

    fn ids(tasks: &[&Task]) -> Vec<u64> {
        tasks.iter().map(|t| t.id).collect()
    }

    #[test]
    fn incomplete_sorts_before_completed_regardless_of_date() {
        let tasks = vec![
            task(2, Status::Completed, Priority::Low, Some(at(2024, 1, 1, 0, 0))),
            task(1, Status::Todo, Priority::High, Some(at(2024, 1, 2, 0, 0))),
        ];
        assert_eq!(ids(&sorted(&tasks)), vec![1, 2]);
    }

    #[test]
    fn priority_then_due_then_undated_last() {
        let tasks = vec![
            task(1, Status::Todo, Priority::Low, Some(at(2024, 1, 1, 0, 0))),
            task(2, Status::Todo, Priority::High, None),
            task(3, Status::Todo, Priority::High, Some(at(2024, 3, 1, 0, 0))),
            task(4, Status::Todo, Priority::High, Some(at(2024, 2, 1, 0, 0))),
            task(5, Status::Blocked, Priority::Medium, None),
        ];
        assert_eq!(ids(&sorted(&tasks)), vec![4, 3, 2, 5, 1]);
    }

    #[test]
    fn sort_is_idempotent() {
        let tasks = vec![
            task(3, Status::Todo, Priority::Medium, None),
            task(1, Status::Todo, Priority::Medium, None),
            task(2, Status::Completed, Priority::High, None),
            task(4, Status::Todo, Priority::Medium, Some(at(2024, 5, 1, 0, 0))),
        ];
        let once: Vec<Task> = sorted(&tasks).into_iter().cloned().collect();
        let twice = sorted(&once);
        assert_eq!(ids(&twice), once.iter().map(|t| t.id).collect::<Vec<_>>());
        for pair in once.windows(2) {
            assert!(primary_order(&pair[0], &pair[1]).is_lt());
        }
    }

    #[test]
    fn late_evening_due_today_stays_in_today() {
        let now = at(2024, 4, 10, 0, 1);
        let tasks = vec![
            task(1, Status::Todo, Priority::Medium, Some(at(2024, 4, 10, 23, 59))),
            task(2, Status::Todo, Priority::Medium, Some(at(2024, 4, 11, 0, 0))),
            task(3, Status::Todo, Priority::Medium, Some(at(2024, 4, 12, 0, 0))),
            task(4, Status::Todo, Priority::Medium, Some(at(2024, 4, 9, 8, 0))),
            task(5, Status::Completed, Priority::Medium, Some(at(2024, 4, 10, 9, 0))),
            task(6, Status::Todo, Priority::Medium, None),
        ];
        let buckets = bucket_upcoming(&tasks, now, &chrono_tz::UTC);
        assert_eq!(ids(&buckets.today), vec![4, 1]);
        assert_eq!(ids(&buckets.tomorrow), vec![2]);
        assert_eq!(ids(&buckets.later), vec![3]);
        assert_eq!(buckets.len(), 4);
    }

    #[test]
    fn buckets_use_local_calendar_days() {
        // 2024-04-10 20:00 in Taipei; due 2024-04-11 01:00 Taipei is tomorrow there
        let now = at(2024, 4, 10, 12, 0);
        let tasks = vec![task(
            1,
            Status::Todo,
            Priority::Medium,
            Some(at(2024, 4, 10, 17, 0)),
        )];
        let utc = bucket_upcoming(&tasks, now, &chrono_tz::UTC);
        assert_eq!(ids(&utc.today), vec![1]);
        let taipei = bucket_upcoming(&tasks, now, &chrono_tz::Asia::Taipei);
        assert_eq!(ids(&taipei.tomorrow), vec![1]);
    }

    #[test]
    fn empty_collection_has_zero_rate() {
        let stats = completion_stats(&[]);
        assert_eq!(stats.completion_rate, 0.0);
        assert_eq!(stats.by_category.len(), 5);
        assert!(stats.by_category.iter().all(|c| c.percentage == 0.0));
    }

    #[test]
    fn stats_count_each_builtin_category() {
        let mut tasks = vec![
            task(1, Status::Completed, Priority::Medium, None),
            task(2, Status::Todo, Priority::Medium, None),
            task(3, Status::Todo, Priority::Medium, None),
            task(4, Status::Completed, Priority::Medium, None),
        ];
        tasks[1].category = "work".to_string();
        tasks[2].category = "garden".to_string();

        let stats = completion_stats(&tasks);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.completion_rate, 50.0);
        let personal = &stats.by_category[0];
        assert_eq!((personal.category.as_str(), personal.count), ("personal", 2));
        assert_eq!(stats.by_category[1].percentage, 25.0);
        assert_eq!(stats.by_category[4].count, 0);
    }

    #[test]
    fn productive_day_ties_break_on_first_seen() {
        let mut tasks = vec![
            task(1, Status::Completed, Priority::Medium, None),
            task(2, Status::Completed, Priority::Medium, None),
            task(3, Status::Completed, Priority::Medium, None),
            task(4, Status::Completed, Priority::Medium, None),
            task(5, Status::Todo, Priority::Medium, None),
        ];
        tasks[0].completed_at = Some(at(2024, 2, 3, 10, 0));
        tasks[1].completed_at = Some(at(2024, 2, 1, 10, 0));
        tasks[2].completed_at = Some(at(2024, 2, 1, 18, 0));
        tasks[3].completed_at = Some(at(2024, 2, 3, 22, 0));

        let best = most_productive_day(&tasks, &chrono_tz::UTC).unwrap();
        assert_eq!(best.date, NaiveDate::from_ymd_opt(2024, 2, 3).unwrap());
        assert_eq!(best.completed, 2);

        tasks[3].completed_at = Some(at(2024, 2, 1, 23, 0));
        let best = most_productive_day(&tasks, &chrono_tz::UTC).unwrap();
        assert_eq!(best.date, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(best.completed, 3);

        assert!(most_productive_day(&tasks[4..], &chrono_tz::UTC).is_none());
    }

    #[test]
    fn search_and_category_filters_are_anded() {
        let mut tasks = vec![
            task(1, Status::Todo, Priority::Medium, None),
            task(2, Status::Todo, Priority::Medium, None),
            task(3, Status::Todo, Priority::Medium, None),
        ];
        tasks[0].title = "Buy MILK".to_string();
        tasks[0].category = "shopping".to_string();
        tasks[1].description = Some("milk for the office".to_string());
        tasks[1].category = "work".to_string();
        tasks[2].title = "Gym".to_string();
        tasks[2].category = "health".to_string();

        let query = TaskQuery {
            text: "milk".to_string(),
            category: CategoryFilter::parse("all"),
        };
        assert_eq!(ids(&filter(&tasks, &query)), vec![1, 2]);

        let query = TaskQuery {
            text: "milk".to_string(),
            category: CategoryFilter::parse("work"),
        };
        assert_eq!(ids(&filter(&tasks, &query)), vec![2]);
        assert!(query.matches(&tasks[1]));

        let query = TaskQuery {
            text: "HEAL".to_string(),
            category: CategoryFilter::All,
        };
        assert_eq!(ids(&filter(&tasks, &query)), vec![3]);
    }

    #[test]
    fn list_view_respects_settings() {
        let tasks = vec![
            task(1, Status::Completed, Priority::High, None),
            task(2, Status::Todo, Priority::Low, Some(at(2024, 1, 1, 0, 0) + Duration::days(1))),
            task(3, Status::Todo, Priority::High, None),
        ];
        let query = TaskQuery::default();

        let all = list_view(&tasks, &query, &Settings::default());
        assert_eq!(ids(&all), vec![3, 2, 1]);

        let settings = Settings {
            auto_sort: false,
            show_completed: false,
            ..Settings::default()
        };
        assert_eq!(ids(&list_view(&tasks, &query, &settings)), vec![2, 3]);
    }
}
