use std::io::Write;

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument};

use crate::app::{App, HomeMode, View, ViewModel};
use crate::cli::{AddArgs, CategoryCommand, Command, EditArgs, SettingsArgs};
use crate::datetime::parse_date_expr;
use crate::i18n::Language;
use crate::prefs::Theme;
use crate::render::Renderer;
use crate::task::{Priority, Status, TaskDraft, TaskPatch};
use crate::views::{CategoryFilter, TaskQuery};

#[instrument(skip(app, renderer, out, command, now))]
pub fn dispatch<W: Write>(
    app: &mut App,
    renderer: &Renderer,
    out: &mut W,
    command: Option<Command>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let command = command.unwrap_or(Command::Upcoming);
    debug!(?command, "dispatching command");

    match command {
        Command::Add(args) => cmd_add(app, renderer, out, args, now),
        Command::Edit(args) => cmd_edit(app, renderer, out, args, now),
        Command::Delete { id } => cmd_delete(app, out, id),
        Command::Done { id } => cmd_done(app, renderer, out, id, now),
        Command::List { search, category } => cmd_list(app, renderer, out, search, category, now),
        Command::Upcoming => cmd_upcoming(app, renderer, out, now),
        Command::Profile => cmd_profile(app, renderer, out, now),
        Command::Notifications => cmd_notifications(app, renderer, out, now),
        Command::Calendar { month, day } => cmd_calendar(app, renderer, out, month, day, now),
        Command::Category(sub) => cmd_category(app, out, sub),
        Command::Lang { code } => cmd_lang(app, out, code),
        Command::Theme { mode } => cmd_theme(app, out, mode),
        Command::Settings(args) => cmd_settings(app, out, args),
    }
}

fn cmd_add<W: Write>(
    app: &mut App,
    renderer: &Renderer,
    out: &mut W,
    args: AddArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command add");

    let due_date = args
        .due
        .as_deref()
        .map(|expr| parse_date_expr(expr, now, app.timezone()))
        .transpose()?;

    let draft = TaskDraft {
        title: args.title.join(" "),
        description: args.description,
        due_date,
        priority: args.priority.as_deref().map(parse_priority).transpose()?.unwrap_or_default(),
        category: args.category,
        status: args.status.as_deref().map(parse_status).transpose()?.unwrap_or_default(),
    };

    let task = app.add_task(draft, now)?;
    writeln!(out, "{} ({})", app.localizer().translate("taskAdded"), task.id)?;
    renderer.write_task_detail(out, &task, app.localizer(), app.timezone())
}

fn cmd_edit<W: Write>(
    app: &mut App,
    renderer: &Renderer,
    out: &mut W,
    args: EditArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!(id = args.id, "command edit");

    let due_date = if args.clear_due {
        Some(None)
    } else {
        args.due
            .as_deref()
            .map(|expr| parse_date_expr(expr, now, app.timezone()))
            .transpose()?
            .map(Some)
    };
    let description = if args.clear_description {
        Some(None)
    } else {
        args.description.map(Some)
    };

    let patch = TaskPatch {
        title: args.title,
        description,
        due_date,
        priority: args.priority.as_deref().map(parse_priority).transpose()?,
        category: args.category,
        status: args.status.as_deref().map(parse_status).transpose()?,
    };
    if patch.is_empty() {
        return Err(anyhow!("nothing to change; pass at least one field flag"));
    }

    let Some(task) = app.edit_task(args.id, patch, now)? else {
        return Err(not_found(app, args.id));
    };
    writeln!(out, "{}", app.localizer().translate("taskUpdated"))?;
    renderer.write_task_detail(out, &task, app.localizer(), app.timezone())
}

fn cmd_delete<W: Write>(app: &mut App, out: &mut W, id: u64) -> anyhow::Result<()> {
    info!(id, "command delete");

    if !app.delete_task(id) {
        return Err(not_found(app, id));
    }
    writeln!(out, "{}", app.localizer().translate("taskDeleted"))?;
    Ok(())
}

fn cmd_done<W: Write>(
    app: &mut App,
    renderer: &Renderer,
    out: &mut W,
    id: u64,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!(id, "command done");

    let Some(task) = app.toggle_task(id, now) else {
        return Err(not_found(app, id));
    };
    renderer.write_task_detail(out, &task, app.localizer(), app.timezone())
}

fn cmd_list<W: Write>(
    app: &mut App,
    renderer: &Renderer,
    out: &mut W,
    search: Option<String>,
    category: Option<String>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let category = category.as_deref().map(CategoryFilter::parse).unwrap_or_default();
    if let CategoryFilter::Only(name) = &category
        && !app.categories().contains(name)
    {
        return Err(anyhow!(
            app.localizer()
                .translate_with("unknownCategory", &[("category", name.as_str())])
        ));
    }

    app.set_query(TaskQuery {
        text: search.unwrap_or_default(),
        category,
    });
    app.navigate(View::Home(HomeMode::List));

    let ViewModel::List { tasks } = app.view_model(now)? else {
        return Err(anyhow!("list view did not produce a task list"));
    };
    write_heading(app, renderer, out)?;
    if tasks.is_empty() {
        writeln!(out, "{}", app.localizer().translate("noTasks"))?;
        return Ok(());
    }
    renderer.write_task_table(out, &tasks, app.localizer(), app.timezone(), now)
}

fn cmd_upcoming<W: Write>(app: &mut App, renderer: &Renderer, out: &mut W, now: DateTime<Utc>) -> anyhow::Result<()> {
    app.navigate(View::Upcoming);
    let ViewModel::Upcoming(buckets) = app.view_model(now)? else {
        return Err(anyhow!("upcoming view did not produce buckets"));
    };
    write_heading(app, renderer, out)?;
    renderer.write_upcoming(out, &buckets, app.localizer(), app.timezone(), now)
}

fn cmd_profile<W: Write>(app: &mut App, renderer: &Renderer, out: &mut W, now: DateTime<Utc>) -> anyhow::Result<()> {
    app.navigate(View::Profile);
    let ViewModel::Profile(model) = app.view_model(now)? else {
        return Err(anyhow!("profile view did not produce statistics"));
    };
    write_heading(app, renderer, out)?;
    renderer.write_profile(out, &model, app.localizer())
}

fn cmd_notifications<W: Write>(
    app: &mut App,
    renderer: &Renderer,
    out: &mut W,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let emitted = app.scan_notifications(now);
    debug!(
        emitted = emitted.len(),
        lookahead_hours = app.notifications().lookahead().num_hours(),
        "scanned for due tasks"
    );

    app.navigate(View::Notifications);
    let ViewModel::Notifications { active } = app.view_model(now)? else {
        return Err(anyhow!("notification view did not produce a list"));
    };
    write_heading(app, renderer, out)?;
    renderer.write_notifications(out, &active, app.localizer(), app.timezone())
}

fn cmd_calendar<W: Write>(
    app: &mut App,
    renderer: &Renderer,
    out: &mut W,
    month: Option<String>,
    day: Option<String>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    if let Some(day) = day.as_deref() {
        let date = NaiveDate::parse_from_str(day.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid --day value (expected YYYY-MM-DD): {day}"))?;
        app.select_day(date);
    } else if let Some(month) = month.as_deref() {
        let first = NaiveDate::parse_from_str(&format!("{}-01", month.trim()), "%Y-%m-%d")
            .with_context(|| format!("invalid --month value (expected YYYY-MM): {month}"))?;
        app.select_day(first);
    }

    app.navigate(View::Home(HomeMode::Monthly));
    let ViewModel::Monthly(model) = app.view_model(now)? else {
        return Err(anyhow!("calendar view did not produce a month grid"));
    };
    write_heading(app, renderer, out)?;
    renderer.write_month(&mut *out, &model, app.localizer())?;

    writeln!(out)?;
    writeln!(out, "{}", model.selected.format("%Y-%m-%d"))?;
    if model.day_tasks.is_empty() {
        writeln!(out, "{}", app.localizer().translate("noTasks"))?;
        return Ok(());
    }
    renderer.write_task_table(out, &model.day_tasks, app.localizer(), app.timezone(), now)
}

fn cmd_category<W: Write>(app: &mut App, out: &mut W, sub: CategoryCommand) -> anyhow::Result<()> {
    let changed = match sub {
        CategoryCommand::List => {
            for name in app.categories().names() {
                let count = app.store().tasks().iter().filter(|t| &t.category == name).count();
                writeln!(out, "{name}  {}  ({count})", app.localizer().translate(name))?;
            }
            return Ok(());
        }
        CategoryCommand::Add { name } => app.add_category(&name).then_some("categoryAdded"),
        CategoryCommand::Rename { old, new } => app.rename_category(&old, &new).then_some("categoryRenamed"),
        CategoryCommand::Remove { name } => app.remove_category(&name).then_some("categoryRemoved"),
    };

    writeln!(out, "{}", app.localizer().translate(changed.unwrap_or("categoryUnchanged")))?;
    Ok(())
}

fn cmd_lang<W: Write>(app: &mut App, out: &mut W, code: Option<String>) -> anyhow::Result<()> {
    if let Some(code) = code {
        let language = Language::parse(&code).ok_or_else(|| {
            let known: Vec<&str> = Language::ALL.iter().map(|l| l.code()).collect();
            anyhow!("unknown language '{code}'; expected one of {}", known.join(", "))
        })?;
        app.set_language(language);
    }

    let current = app.prefs().language();
    for language in Language::ALL {
        let marker = if language == current { "*" } else { " " };
        writeln!(out, "{marker} {:<6} {}", language.code(), language.native_name())?;
    }
    Ok(())
}

fn cmd_theme<W: Write>(app: &mut App, out: &mut W, mode: Option<String>) -> anyhow::Result<()> {
    match mode.as_deref().map(str::trim) {
        None => {}
        Some(mode) if mode.eq_ignore_ascii_case("toggle") => {
            app.toggle_theme();
        }
        Some(mode) => {
            let theme = Theme::parse(mode).ok_or_else(|| anyhow!("unknown theme '{mode}'; expected light, dark or toggle"))?;
            app.set_theme(theme);
        }
    }

    let theme = app.prefs().theme();
    writeln!(
        out,
        "{}: {}",
        app.localizer().translate("darkMode"),
        app.localizer().translate(theme.key())
    )?;
    Ok(())
}

fn cmd_settings<W: Write>(app: &mut App, out: &mut W, args: SettingsArgs) -> anyhow::Result<()> {
    let mut settings = app.prefs().settings();
    let mut changed = false;
    for (raw, slot) in [
        (args.notifications, &mut settings.notifications),
        (args.auto_sort, &mut settings.auto_sort),
        (args.show_completed, &mut settings.show_completed),
    ] {
        if let Some(raw) = raw {
            *slot = parse_flag(&raw)?;
            changed = true;
        }
    }
    if changed {
        app.update_settings(settings);
    }

    let localizer = app.localizer();
    let on_off = |flag: bool| localizer.translate(if flag { "on" } else { "off" });
    writeln!(out, "{}: {}", localizer.translate("notifications"), on_off(settings.notifications))?;
    writeln!(out, "{}: {}", localizer.translate("autoSort"), on_off(settings.auto_sort))?;
    writeln!(out, "{}: {}", localizer.translate("showCompleted"), on_off(settings.show_completed))?;
    Ok(())
}

fn write_heading<W: Write>(app: &App, renderer: &Renderer, out: &mut W) -> anyhow::Result<()> {
    let title = app.localizer().translate(app.view().title_key());
    writeln!(out, "{}", renderer.paint(&title, "1"))?;
    Ok(())
}

fn not_found(app: &App, id: u64) -> anyhow::Error {
    anyhow!(
        app.localizer()
            .translate_with("taskNotFound", &[("id", id.to_string().as_str())])
    )
}

fn parse_priority(raw: &str) -> anyhow::Result<Priority> {
    Priority::parse(raw).ok_or_else(|| anyhow!("unknown priority '{raw}'; expected low, medium or high"))
}

fn parse_status(raw: &str) -> anyhow::Result<Status> {
    Status::parse(raw).ok_or_else(|| {
        let known: Vec<&str> = Status::ALL.iter().map(|s| s.key()).collect();
        anyhow!("unknown status '{raw}'; expected one of {}", known.join(", "))
    })
}

fn parse_flag(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "y" | "yes" | "on" | "true" => Ok(true),
        "0" | "n" | "no" | "off" | "false" => Ok(false),
        other => Err(anyhow!("expected on/off, got '{other}'")),
    }
}
