use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::app::{MonthModel, ProfileModel};
use crate::calendar::weekday_keys;
use crate::config::Config;
use crate::datetime::format_local;
use crate::i18n::Localizer;
use crate::notify::Notification;
use crate::task::Task;
use crate::views::UpcomingBuckets;

const DUE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip_all, fields(rows = tasks.len()))]
    pub fn write_task_table<W: Write>(
        &self,
        out: W,
        tasks: &[&Task],
        localizer: &Localizer,
        tz: &Tz,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let headers = ["id", "title", "dueDate", "priority", "category", "status"]
            .iter()
            .map(|key| localizer.translate(key))
            .collect();

        let rows = tasks
            .iter()
            .map(|task| {
                let due = task
                    .due_date
                    .map(|due| {
                        let text = format_local(due, tz, DUE_FORMAT);
                        if due < now && !task.is_completed() {
                            self.paint(&text, "31")
                        } else {
                            text
                        }
                    })
                    .unwrap_or_default();

                vec![
                    self.paint(&task.id.to_string(), "33"),
                    task.title.clone(),
                    due,
                    localizer.translate(task.priority.key()),
                    localizer.translate(&task.category),
                    localizer.translate(task.status.key()),
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    pub fn write_task_detail<W: Write>(
        &self,
        mut out: W,
        task: &Task,
        localizer: &Localizer,
        tz: &Tz,
    ) -> anyhow::Result<()> {
        let mut fields = vec![
            ("id", task.id.to_string()),
            ("title", task.title.clone()),
            ("priority", localizer.translate(task.priority.key())),
            ("category", localizer.translate(&task.category)),
            ("status", localizer.translate(task.status.key())),
        ];
        if let Some(description) = &task.description {
            fields.push(("description", description.clone()));
        }
        if let Some(due) = task.due_date {
            fields.push(("dueDate", format_local(due, tz, DUE_FORMAT)));
        }

        let labels: Vec<String> = fields.iter().map(|(key, _)| localizer.translate(key)).collect();
        let width = labels
            .iter()
            .map(|label| UnicodeWidthStr::width(label.as_str()))
            .max()
            .unwrap_or(0);
        for (label, (_, value)) in labels.iter().zip(&fields) {
            let padding = width.saturating_sub(UnicodeWidthStr::width(label.as_str()));
            writeln!(out, "{label}{}  {value}", " ".repeat(padding))?;
        }
        Ok(())
    }

    pub fn write_upcoming<W: Write>(
        &self,
        mut out: W,
        buckets: &UpcomingBuckets<'_>,
        localizer: &Localizer,
        tz: &Tz,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if buckets.is_empty() {
            writeln!(out, "{}", localizer.translate("noUpcoming"))?;
            return Ok(());
        }

        let sections = [
            ("today", &buckets.today),
            ("tomorrow", &buckets.tomorrow),
            ("later", &buckets.later),
        ];
        for (key, tasks) in sections {
            if tasks.is_empty() {
                continue;
            }
            writeln!(out, "{} ({})", self.paint(&localizer.translate(key), "1"), tasks.len())?;
            self.write_task_table(&mut out, tasks, localizer, tz, now)?;
            writeln!(out)?;
        }
        Ok(())
    }

    pub fn write_notifications<W: Write>(
        &self,
        mut out: W,
        active: &[&Notification],
        localizer: &Localizer,
        tz: &Tz,
    ) -> anyhow::Result<()> {
        if active.is_empty() {
            writeln!(out, "{}", localizer.translate("noNotifications"))?;
            return Ok(());
        }

        let headers = vec![
            localizer.translate("id"),
            localizer.translate("notifications"),
            localizer.translate("dueDate"),
        ];
        let rows = active
            .iter()
            .map(|n| {
                vec![
                    self.paint(&n.todo_id.to_string(), "33"),
                    n.message.clone(),
                    format_local(n.due_date, tz, DUE_FORMAT),
                ]
            })
            .collect();
        write_table(out, headers, rows)
    }

    pub fn write_month<W: Write>(&self, mut out: W, model: &MonthModel<'_>, localizer: &Localizer) -> anyhow::Result<()> {
        writeln!(out, "{:04}-{:02}", model.year, model.month)?;

        let headers = weekday_keys().iter().map(|key| localizer.translate(key)).collect();
        let rows = model
            .cells
            .chunks(7)
            .map(|week| {
                week.iter()
                    .map(|cell| {
                        let mut text = cell.day.date.format("%d").to_string();
                        if cell.task_count > 0 {
                            text.push_str(&format!("({})", cell.task_count));
                        }
                        if cell.is_today {
                            self.paint(&text, "7")
                        } else if !cell.day.in_month {
                            self.paint(&text, "2")
                        } else {
                            text
                        }
                    })
                    .collect()
            })
            .collect();
        write_table(out.by_ref(), headers, rows)?;
        Ok(())
    }

    pub fn write_profile<W: Write>(&self, mut out: W, model: &ProfileModel, localizer: &Localizer) -> anyhow::Result<()> {
        let stats = &model.stats;
        writeln!(
            out,
            "{}: {:.0}%",
            localizer.translate("completionRate"),
            stats.completion_rate
        )?;
        writeln!(out, "{}: {}", localizer.translate("tasksCompleted"), stats.completed)?;
        writeln!(out, "{}: {}", localizer.translate("tasksPending"), stats.pending)?;
        if let Some(day) = model.most_productive {
            writeln!(
                out,
                "{}: {} ({})",
                localizer.translate("mostProductiveDay"),
                day.date.format("%Y-%m-%d"),
                day.completed
            )?;
        }
        writeln!(out)?;

        writeln!(out, "{}", self.paint(&localizer.translate("taskCategories"), "1"))?;
        let headers = vec![localizer.translate("category"), localizer.translate("tasks"), "%".to_string()];
        let rows = stats
            .by_category
            .iter()
            .map(|share| {
                vec![
                    localizer.translate(&share.category),
                    share.count.to_string(),
                    format!("{:.0}", share.percentage),
                ]
            })
            .collect();
        write_table(out.by_ref(), headers, rows)?;
        writeln!(out)?;

        let on_off = |flag: bool| localizer.translate(if flag { "on" } else { "off" });
        writeln!(out, "{}", self.paint(&localizer.translate("settings"), "1"))?;
        writeln!(
            out,
            "{}: {}",
            localizer.translate("language"),
            model.language.native_name()
        )?;
        writeln!(
            out,
            "{}: {}",
            localizer.translate("darkMode"),
            localizer.translate(model.theme.key())
        )?;
        writeln!(
            out,
            "{}: {}",
            localizer.translate("notifications"),
            on_off(model.settings.notifications)
        )?;
        writeln!(out, "{}: {}", localizer.translate("autoSort"), on_off(model.settings.auto_sort))?;
        writeln!(
            out,
            "{}: {}",
            localizer.translate("showCompleted"),
            on_off(model.settings.show_completed)
        )?;
        Ok(())
    }

    pub fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

pub fn write_table<W: Write>(mut writer: W, headers: Vec<String>, rows: Vec<Vec<String>>) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    write_row(&mut writer, &headers, &widths)?;
    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in &rows {
        write_row(&mut writer, row, &widths)?;
    }

    Ok(())
}

fn write_row<W: Write>(writer: &mut W, cells: &[String], widths: &[usize]) -> anyhow::Result<()> {
    for (idx, width) in widths.iter().enumerate() {
        let cell = cells.get(idx).map_or("", String::as_str);
        let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
        let padding = width.saturating_sub(visible_width);
        write!(writer, "{}{} ", cell, " ".repeat(padding))?;
    }
    writeln!(writer)?;
    Ok(())
}

pub fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
