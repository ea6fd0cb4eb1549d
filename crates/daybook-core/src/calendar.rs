use chrono::{Datelike, Duration, NaiveDate, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

use crate::datetime::local_date;
use crate::error::{DaybookError, Result};
use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub in_month: bool,
}

/// Whole Sunday-first weeks covering `year`-`month`, padded with
/// neighbouring days.
pub fn month_grid(year: i32, month: u32) -> Result<Vec<CalendarDay>> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| DaybookError::validation("month", format!("{year}-{month:02} is not a valid month")))?;
    let last = last_day_of_month(first);

    let start = start_of_week(first, Weekday::Sun);
    let end = start_of_week(last, Weekday::Sun) + Duration::days(6);

    let cells = start
        .iter_days()
        .take_while(|date| *date <= end)
        .map(|date| CalendarDay {
            date,
            in_month: date.month() == month && date.year() == year,
        })
        .collect();
    Ok(cells)
}

/// Tasks due on `day` in `tz`, by due time then id.
pub fn tasks_on_day<'a>(tasks: &'a [Task], day: NaiveDate, tz: &Tz) -> Vec<&'a Task> {
    let mut due: Vec<&Task> = tasks
        .iter()
        .filter(|task| task.due_date.is_some_and(|due| local_date(due, tz) == day))
        .collect();
    due.sort_by_key(|task| (task.due_date, task.id));
    due
}

pub fn weekday_keys() -> [&'static str; 7] {
    ["sun", "mon", "tue", "wed", "thu", "fri", "sat"]
}

fn last_day_of_month(first: NaiveDate) -> NaiveDate {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|next| next.pred_opt())
        .unwrap_or(first)
}

fn start_of_week(day: NaiveDate, week_start: Weekday) -> NaiveDate {
    let day_idx = i64::from(day.weekday().num_days_from_monday());
    let start_idx = i64::from(week_start.num_days_from_monday());
    let diff = (7 + day_idx - start_idx) % 7;
    day - Duration::days(diff)
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, NaiveDate, TimeZone, Utc, Weekday};

    use super::{month_grid, tasks_on_day};
    use crate::task::{Priority, Status, Task};

    fn task(id: u64, due: Option<chrono::DateTime<Utc>>) -> Task {
        Task {
            id,
            title: format!("task {id}"),
            description: None,
            due_date: due,
            priority: Priority::Medium,
            category: "personal".to_string(),
            status: Status::Todo,
            completed: false,
            completed_at: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            previous_status: None,
        }
    }

    #[test]
    fn grid_is_whole_sunday_first_weeks() {
        // February 2024 starts on a Thursday and ends on a Thursday.
        let grid = month_grid(2024, 2).expect("grid");
        assert_eq!(grid.len() % 7, 0);
        assert_eq!(grid.len(), 35);
        assert_eq!(grid[0].date.weekday(), Weekday::Sun);
        assert_eq!(grid[0].date, NaiveDate::from_ymd_opt(2024, 1, 28).expect("date"));
        assert!(!grid[0].in_month);
        assert_eq!(grid.iter().filter(|cell| cell.in_month).count(), 29);
        assert_eq!(grid[34].date, NaiveDate::from_ymd_opt(2024, 3, 2).expect("date"));
    }

    #[test]
    fn december_rolls_into_next_year() {
        let grid = month_grid(2023, 12).expect("grid");
        assert_eq!(grid.iter().filter(|cell| cell.in_month).count(), 31);
        let tail = grid.last().expect("last cell");
        assert_eq!(tail.date.year(), 2024);
        assert_eq!(tail.date.weekday(), Weekday::Sat);
    }

    #[test]
    fn invalid_month_is_rejected() {
        assert!(month_grid(2024, 13).is_err());
        assert!(month_grid(2024, 0).is_err());
    }

    #[test]
    fn day_listing_respects_timezone_and_order() {
        let tz: chrono_tz::Tz = "Asia/Taipei".parse().expect("tz");
        let tasks = vec![
            task(3, Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap())),
            task(1, Some(Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap())),
            task(2, Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap())),
            task(4, None),
        ];
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).expect("date");
        let ids: Vec<u64> = tasks_on_day(&tasks, day, &tz).iter().map(|t| t.id).collect();
        // 20:00 UTC on Jan 1 is 04:00 on Jan 2 in Taipei.
        assert_eq!(ids, vec![1, 3]);
    }
}
