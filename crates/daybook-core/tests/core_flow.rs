use std::fs;
use std::rc::Rc;

use chrono::{DateTime, TimeZone, Utc};
use daybook_core::app::{App, AppOptions, View, ViewModel};
use daybook_core::i18n::Language;
use daybook_core::prefs::Theme;
use daybook_core::storage::{CATEGORIES_KEY, FileStorage, TODOS_KEY};
use daybook_core::task::{Priority, Status, TaskDraft};
use tempfile::tempdir;

fn at(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
}

fn open(dir: &std::path::Path) -> App {
    let storage = FileStorage::open(dir).expect("open storage");
    App::open(Rc::new(storage), AppOptions::default())
}

#[test]
fn state_survives_reopen() {
    let temp = tempdir().expect("tempdir");

    let id = {
        let mut app = open(temp.path());
        let task = app
            .add_task(
                TaskDraft {
                    priority: Priority::High,
                    due_date: Some(at(2, 9)),
                    ..TaskDraft::titled("  File taxes  ")
                },
                at(1, 8),
            )
            .expect("add");
        assert!(app.add_category("garden"));
        app.set_language(Language::ZhTw);
        app.toggle_theme();
        task.id
    };

    assert!(temp.path().join(format!("{TODOS_KEY}.json")).exists());

    let app = open(temp.path());
    let task = app.store().get(id).expect("task persisted");
    assert_eq!(task.title, "File taxes");
    assert_eq!(task.priority, Priority::High);
    assert_eq!(task.due_date, Some(at(2, 9)));
    assert!(app.categories().contains("garden"));
    assert_eq!(app.prefs().language(), Language::ZhTw);
    assert_eq!(app.prefs().theme(), Theme::Dark);
}

#[test]
fn legacy_records_and_custom_categories_migrate() {
    let temp = tempdir().expect("tempdir");
    fs::write(
        temp.path().join("todos.json"),
        r#"[
            {"id": 1, "title": "Old done", "completed": true, "createdAt": "2023-12-30T10:00:00Z",
             "priority": "low", "category": "errands", "extra": 5},
            {"id": 2, "title": "Old open", "completed": false, "createdAt": "2023-12-31T10:00:00Z",
             "priority": "high", "category": "work"}
        ]"#,
    )
    .expect("write todos");
    fs::write(temp.path().join("customCategories.json"), r#"["garden"]"#).expect("write custom");
    fs::write(temp.path().join("language.json"), "zh-tw").expect("write language");

    let app = open(temp.path());
    let done = app.store().get(1).expect("task 1");
    assert_eq!(done.status, Status::Completed);
    assert!(done.completed);
    assert_eq!(done.completed_at, Some(done.created_at));

    let open_task = app.store().get(2).expect("task 2");
    assert_eq!(open_task.status, Status::Todo);
    assert_eq!(open_task.completed_at, None);

    let names = app.categories().names();
    assert_eq!(&names[..5], &["personal", "work", "shopping", "health", "education"]);
    assert!(app.categories().contains("garden"));
    assert!(app.categories().contains("errands"));
    assert_eq!(app.prefs().language(), Language::ZhTw);

    let stored = fs::read_to_string(temp.path().join(format!("{CATEGORIES_KEY}.json"))).expect("categories written");
    assert!(stored.contains("errands"));
}

#[test]
fn corrupted_files_load_defaults() {
    let temp = tempdir().expect("tempdir");
    fs::write(temp.path().join("todos.json"), "{not json").expect("write");
    fs::write(temp.path().join("categories.json"), "42").expect("write");

    let app = open(temp.path());
    assert!(app.store().is_empty());
    assert_eq!(app.categories().names().len(), 5);
}

#[test]
fn rename_and_remove_keep_tasks_registered() {
    let temp = tempdir().expect("tempdir");
    let mut app = open(temp.path());
    for title in ["standup", "review"] {
        app.add_task(
            TaskDraft {
                category: Some("work".into()),
                ..TaskDraft::titled(title)
            },
            at(1, 8),
        )
        .expect("add");
    }

    assert!(app.rename_category("work", "job"));
    assert!(!app.categories().contains("work"));
    assert!(app.store().tasks().iter().all(|t| t.category == "job"));

    assert!(app.remove_category("job"));
    assert!(app.store().tasks().iter().all(|t| t.category == "personal"));

    let reopened = open(temp.path());
    for task in reopened.store().tasks() {
        assert!(reopened.categories().contains(&task.category));
    }
}

#[test]
fn notifications_flow_through_views() {
    let temp = tempdir().expect("tempdir");
    let mut app = open(temp.path());
    app.add_task(
        TaskDraft {
            due_date: Some(at(2, 9)),
            ..TaskDraft::titled("Dentist")
        },
        at(1, 8),
    )
    .expect("add");

    assert_eq!(app.scan_notifications(at(1, 12)).len(), 1);
    assert!(app.scan_notifications(at(1, 13)).is_empty());

    app.navigate(View::Notifications);
    let ViewModel::Notifications { active } = app.view_model(at(1, 13)).expect("model") else {
        panic!("expected notifications");
    };
    assert_eq!(active.len(), 1);
    let notification = active[0].id;

    let done = app.complete_from_notification(notification, at(1, 14)).expect("completed");
    assert!(done.completed);

    app.navigate(View::Profile);
    let ViewModel::Profile(profile) = app.view_model(at(1, 15)).expect("model") else {
        panic!("expected profile");
    };
    assert_eq!(profile.stats.completed, 1);
    assert!((profile.stats.completion_rate - 100.0).abs() < f64::EPSILON);
}
