mod support;

use kaban::audit::{AuditEvent, AuditFilter, AuditObject};
use kaban::task::TaskUpdate;

#[test]
fn task_history_records_the_full_lifecycle() {
    let fixture = support::board("Test Board");
    let task = support::add(&fixture, "Task 1");

    fixture
        .tasks
        .update_task(
            "#1",
            &TaskUpdate {
                title: Some("Task 1 renamed".to_string()),
                ..TaskUpdate::default()
            },
            "user",
        )
        .expect("update");
    fixture
        .tasks
        .move_task("#1", "in_progress", false, "user")
        .expect("move");
    fixture.tasks.delete_task("#1", "user").expect("delete");

    let history = fixture.audit.get_task_history(&task.id).expect("history");
    let events: Vec<(AuditEvent, Option<&str>)> = history
        .iter()
        .map(|e| (e.event_type, e.field_name.as_deref()))
        .collect();
    assert_eq!(
        events,
        vec![
            (AuditEvent::Create, None),
            (AuditEvent::Update, Some("title")),
            (AuditEvent::Update, Some("columnId")),
            (AuditEvent::Delete, None),
        ]
    );

    let title_update = &history[1];
    assert_eq!(title_update.old_value.as_deref(), Some("Task 1"));
    assert_eq!(title_update.new_value.as_deref(), Some("Task 1 renamed"));

    let column_update = &history[2];
    assert_eq!(column_update.old_value.as_deref(), Some("todo"));
    assert_eq!(column_update.new_value.as_deref(), Some("in_progress"));

    let deletion = &history[3];
    let preimage = deletion.old_value.as_deref().expect("preimage");
    assert!(preimage.contains("Task 1 renamed"));
}

#[test]
fn one_audit_row_per_changed_field() {
    let fixture = support::board("Test Board");
    let task = support::add(&fixture, "Task 1");

    // Two fields change in one update: exactly two UPDATE rows.
    fixture
        .tasks
        .update_task(
            "#1",
            &TaskUpdate {
                title: Some("New title".to_string()),
                description: Some(Some("New description".to_string())),
                ..TaskUpdate::default()
            },
            "user",
        )
        .expect("update");

    let history = fixture.audit.get_task_history(&task.id).expect("history");
    let updates: Vec<_> = history
        .iter()
        .filter(|e| e.event_type == AuditEvent::Update)
        .collect();
    assert_eq!(updates.len(), 2);

    let fields: Vec<&str> = updates.iter().filter_map(|e| e.field_name.as_deref()).collect();
    assert!(fields.contains(&"title"));
    assert!(fields.contains(&"description"));

    // A NULL -> value transition is detected.
    let description = updates
        .iter()
        .find(|e| e.field_name.as_deref() == Some("description"))
        .expect("description row");
    assert_eq!(description.old_value, None);
    assert_eq!(description.new_value.as_deref(), Some("New description"));
}

#[test]
fn failed_operations_leave_no_audit_trace() {
    let fixture = support::board("Test Board");
    let task = support::add(&fixture, "Task 1");
    let before = fixture.audit.get_task_history(&task.id).expect("history").len();

    let result = fixture.tasks.update_task(
        "#1",
        &TaskUpdate {
            title: Some(" bad title ".to_string()),
            ..TaskUpdate::default()
        },
        "user",
    );
    assert!(result.is_err());

    let after = fixture.audit.get_task_history(&task.id).expect("history").len();
    assert_eq!(before, after);
}

#[test]
fn actor_attribution_and_filtering() {
    let fixture = support::board("Test Board");
    support::add(&fixture, "Task 1");

    fixture.tasks.assign("#1", "claude", "claude").expect("assign");
    fixture
        .tasks
        .move_task("#1", "in_progress", false, "claude")
        .expect("move");
    fixture
        .tasks
        .update_task(
            "#1",
            &TaskUpdate {
                title: Some("Handled".to_string()),
                ..TaskUpdate::default()
            },
            "gpt-5",
        )
        .expect("update");

    let by_claude = fixture
        .audit
        .get_changes_by_actor("claude", 100)
        .expect("by actor");
    assert_eq!(by_claude.len(), 2);
    assert!(by_claude.iter().all(|e| e.actor.as_deref() == Some("claude")));

    let stats = fixture.audit.get_stats().expect("stats");
    // gpt-5 acted last, then claude, then the board-initializing user.
    assert_eq!(stats.recent_actors, vec!["gpt-5", "claude", "user"]);
    // assignedTo, columnId, title.
    assert_eq!(stats.by_event.get("UPDATE").copied().unwrap_or(0), 3);
    assert_eq!(stats.by_object.get("task").copied().unwrap_or(0), 4);
}

#[test]
fn history_pagination_overfetches_for_has_more() {
    let fixture = support::board("Test Board");
    for index in 1..=5 {
        support::add(&fixture, &format!("Task {index}"));
    }

    let filter = AuditFilter {
        object_type: Some(AuditObject::Task),
        limit: Some(2),
        ..AuditFilter::default()
    };
    let page = fixture.audit.get_history(&filter).expect("page");
    assert_eq!(page.entries.len(), 2);
    assert_eq!(page.total, 5);
    assert!(page.has_more);
    // Newest first.
    assert!(page.entries[0].id > page.entries[1].id);

    let last_page = fixture
        .audit
        .get_history(&AuditFilter {
            offset: Some(4),
            ..filter.clone()
        })
        .expect("last page");
    assert_eq!(last_page.entries.len(), 1);
    assert!(!last_page.has_more);
}

#[test]
fn event_and_object_filters_compose() {
    let fixture = support::board("Test Board");
    support::add(&fixture, "Task 1");
    fixture.tasks.delete_task("#1", "user").expect("delete");

    let deletes = fixture
        .audit
        .get_history(&AuditFilter {
            object_type: Some(AuditObject::Task),
            event_type: Some(AuditEvent::Delete),
            ..AuditFilter::default()
        })
        .expect("deletes");
    assert_eq!(deletes.total, 1);

    let creates = fixture
        .audit
        .get_history(&AuditFilter {
            event_type: Some(AuditEvent::Create),
            ..AuditFilter::default()
        })
        .expect("creates");
    // One board, five columns, one task.
    assert_eq!(creates.total, 7);
}

#[test]
fn audit_ids_increase_across_transactions() {
    let fixture = support::board("Test Board");
    support::add(&fixture, "Task 1");
    let first_batch: i64 = fixture
        .audit
        .get_recent_changes(1)
        .expect("recent")[0]
        .id;

    support::add(&fixture, "Task 2");
    let second_batch: i64 = fixture
        .audit
        .get_recent_changes(1)
        .expect("recent")[0]
        .id;
    assert!(second_batch > first_batch);
}

#[test]
fn recent_changes_honours_limit() {
    let fixture = support::board("Test Board");
    for index in 1..=3 {
        support::add(&fixture, &format!("Task {index}"));
    }
    let recent = fixture.audit.get_recent_changes(2).expect("recent");
    assert_eq!(recent.len(), 2);
}
