mod support;

use kaban::error::Error;
use kaban::task::{NewTask, TaskFilter, TaskUpdate};

#[test]
fn move_stamps_started_and_completed() {
    let fixture = support::board("Test Board");
    let first = support::add(&fixture, "Task 1");
    support::add(&fixture, "Task 2");

    let moved = fixture
        .tasks
        .move_task("#1", "in_progress", false, "user")
        .expect("move");
    assert!(moved.started_at.is_some());
    assert!(moved.completed_at.is_none());

    let done = fixture
        .tasks
        .move_task("#1", "done", false, "user")
        .expect("done");
    assert!(done.completed_at.is_some());
    // started_at survives the second move.
    assert_eq!(done.started_at, moved.started_at);

    let in_done = fixture
        .tasks
        .list_tasks(&TaskFilter {
            column: Some("done".to_string()),
            ..TaskFilter::default()
        })
        .expect("list");
    assert_eq!(in_done.len(), 1);
    assert_eq!(in_done[0].id, first.id);
}

#[test]
fn started_at_is_stamped_only_once() {
    let fixture = support::board("Test Board");
    support::add(&fixture, "Task 1");

    let first = fixture
        .tasks
        .move_task("#1", "in_progress", false, "user")
        .expect("first entry");
    fixture
        .tasks
        .move_task("#1", "todo", false, "user")
        .expect("back");
    let second = fixture
        .tasks
        .move_task("#1", "in_progress", false, "user")
        .expect("re-entry");
    assert_eq!(second.started_at, first.started_at);
}

#[test]
fn wip_limit_blocks_fourth_task() {
    let fixture = support::board("Test Board");
    for index in 1..=4 {
        support::add(&fixture, &format!("Task {index}"));
    }
    for id in ["#1", "#2", "#3"] {
        fixture
            .tasks
            .move_task(id, "in_progress", false, "user")
            .expect("move within limit");
    }

    let err = fixture
        .tasks
        .move_task("#4", "in_progress", false, "user")
        .expect_err("over limit");
    assert_eq!(err.exit_code(), 4);
    assert_eq!(err.to_string(), "Column 'In Progress' at WIP limit (3/3)");

    // --force overrides and the move is audited.
    let forced = fixture
        .tasks
        .move_task("#4", "in_progress", true, "user")
        .expect("forced");
    assert_eq!(forced.column_id, "in_progress");

    let history = fixture.audit.get_task_history(&forced.id).expect("history");
    let column_updates: Vec<_> = history
        .iter()
        .filter(|e| e.field_name.as_deref() == Some("columnId"))
        .collect();
    assert_eq!(column_updates.len(), 1);
    assert_eq!(column_updates[0].old_value.as_deref(), Some("todo"));
    assert_eq!(column_updates[0].new_value.as_deref(), Some("in_progress"));
}

#[test]
fn archived_tasks_leave_default_lists() {
    let fixture = support::board("Test Board");
    let task = support::add(&fixture, "Task 1");
    support::add(&fixture, "Task 2");

    let archived = fixture.tasks.archive_task("#1", "user").expect("archive");
    assert!(archived.archived);
    assert!(archived.archived_at.is_some());

    let visible = fixture.tasks.list_tasks(&TaskFilter::default()).expect("list");
    assert!(visible.iter().all(|t| t.id != task.id));

    let all = fixture
        .tasks
        .list_tasks(&TaskFilter {
            include_archived: true,
            ..TaskFilter::default()
        })
        .expect("list all");
    assert!(all.iter().any(|t| t.id == task.id));

    let restored = fixture.tasks.restore_task("#1", "user").expect("restore");
    assert!(!restored.archived);
    assert!(restored.archived_at.is_none());
}

#[test]
fn archived_tasks_do_not_count_toward_wip() {
    let fixture = support::board("Test Board");
    for index in 1..=4 {
        support::add(&fixture, &format!("Task {index}"));
        fixture
            .tasks
            .move_task(&format!("#{index}"), "in_progress", true, "user")
            .expect("move");
    }
    fixture.tasks.archive_task("#1", "user").expect("archive");
    support::add(&fixture, "Task 5");

    // 3 live tasks in the column: the limit allows no more...
    let err = fixture
        .tasks
        .move_task("#5", "in_progress", false, "user")
        .expect_err("limit reached");
    assert_eq!(err.exit_code(), 4);

    // ...until another one leaves.
    fixture
        .tasks
        .move_task("#2", "review", false, "user")
        .expect("drain");
    fixture
        .tasks
        .move_task("#5", "in_progress", false, "user")
        .expect("now fits");
}

#[test]
fn versions_strictly_increase() {
    let fixture = support::board("Test Board");
    let task = support::add(&fixture, "Task 1");
    assert_eq!(task.version, 1);

    let update = TaskUpdate {
        title: Some("Task 1 renamed".to_string()),
        ..TaskUpdate::default()
    };
    let updated = fixture.tasks.update_task("#1", &update, "user").expect("update");
    assert_eq!(updated.version, 2);

    let assigned = fixture.tasks.assign("#1", "claude", "user").expect("assign");
    assert_eq!(assigned.version, 3);

    let moved = fixture
        .tasks
        .move_task("#1", "review", false, "user")
        .expect("move");
    assert_eq!(moved.version, 4);
}

#[test]
fn update_writes_only_changed_fields() {
    let fixture = support::board("Test Board");
    let task = support::add(&fixture, "Task 1");

    // Same title: no version bump, no audit entry.
    let noop = fixture
        .tasks
        .update_task(
            "#1",
            &TaskUpdate {
                title: Some("Task 1".to_string()),
                ..TaskUpdate::default()
            },
            "user",
        )
        .expect("noop update");
    assert_eq!(noop.version, task.version);
}

#[test]
fn stale_version_conflicts() {
    let fixture = support::board("Test Board");
    support::add(&fixture, "Task 1");

    fixture
        .tasks
        .update_task(
            "#1",
            &TaskUpdate {
                title: Some("First edit".to_string()),
                expected_version: Some(1),
                ..TaskUpdate::default()
            },
            "user",
        )
        .expect("first edit");

    let err = fixture
        .tasks
        .update_task(
            "#1",
            &TaskUpdate {
                title: Some("Second edit".to_string()),
                expected_version: Some(1),
                ..TaskUpdate::default()
            },
            "claude",
        )
        .expect_err("stale token");
    assert_eq!(err.exit_code(), 3);

    let current = fixture.tasks.resolve_task("#1").expect("task");
    assert_eq!(current.title, "First edit");
}

#[test]
fn short_ids_are_never_reused() {
    let fixture = support::board("Test Board");
    support::add(&fixture, "Task 1");
    let second = support::add(&fixture, "Task 2");
    assert_eq!(second.board_task_id, 2);

    fixture.tasks.delete_task("#2", "user").expect("delete");
    let third = support::add(&fixture, "Task 3");
    assert_eq!(third.board_task_id, 3);
}

#[test]
fn id_resolution_forms() {
    let fixture = support::board("Test Board");
    let input = NewTask {
        id: Some("01HX4Q2V8N3M5P7R9T0W2Y4A6C".to_string()),
        ..NewTask::new("Task 1")
    };
    let task = fixture.tasks.add_task(&input, "user").expect("add");

    for form in ["#1", "1", "01HX4Q2V8N3M5P7R9T0W2Y4A6C", "01HX4Q2V", "01hx4q2v"] {
        let resolved = fixture.tasks.resolve_task(form).expect("resolve");
        assert_eq!(resolved.id, task.id, "form {form}");
    }

    assert!(fixture.tasks.get_task("#99").expect("miss").is_none());
    assert!(fixture.tasks.get_task("01HX4Q2V8N3M5P7R9T0W2Y4A6D").expect("miss").is_none());
}

#[test]
fn ambiguous_prefix_is_an_error() {
    let fixture = support::board("Test Board");
    fixture
        .tasks
        .add_task(
            &NewTask {
                id: Some("01HXAAAA0000000000000000AA".to_string()),
                ..NewTask::new("Task 1")
            },
            "user",
        )
        .expect("add");
    fixture
        .tasks
        .add_task(
            &NewTask {
                id: Some("01HXAAAA0000000000000000BB".to_string()),
                ..NewTask::new("Task 2")
            },
            "user",
        )
        .expect("add");

    let err = fixture.tasks.get_task("01HXAAAA").expect_err("ambiguous");
    assert_eq!(err.exit_code(), 8);
    assert!(matches!(err, Error::AmbiguousId { ref matches, .. } if matches.len() == 2));
}

#[test]
fn assign_validates_agent_names() {
    let fixture = support::board("Test Board");
    support::add(&fixture, "Task 1");

    let assigned = fixture.tasks.assign("#1", "gpt-5", "user").expect("assign");
    assert_eq!(assigned.assigned_to.as_deref(), Some("gpt-5"));

    let err = fixture
        .tasks
        .assign("#1", "not a name", "user")
        .expect_err("bad agent");
    assert_eq!(err.exit_code(), 4);

    let unassigned = fixture.tasks.unassign("#1", "user").expect("unassign");
    assert!(unassigned.assigned_to.is_none());

    // The previous assignee is visible in the audit trail.
    let history = fixture.audit.get_task_history(&assigned.id).expect("history");
    let last = history
        .iter()
        .rev()
        .find(|e| e.field_name.as_deref() == Some("assignedTo"))
        .expect("assignment audit");
    assert_eq!(last.old_value.as_deref(), Some("gpt-5"));
    assert_eq!(last.new_value, None);
}

#[test]
fn list_filters_by_column_and_agent() {
    let fixture = support::board("Test Board");
    support::add(&fixture, "Task 1");
    support::add_in(&fixture, "Task 2", "backlog");
    support::add(&fixture, "Task 3");
    fixture.tasks.assign("#3", "claude", "user").expect("assign");

    let todo = fixture
        .tasks
        .list_tasks(&TaskFilter {
            column: Some("todo".to_string()),
            ..TaskFilter::default()
        })
        .expect("list");
    assert_eq!(todo.len(), 2);
    // Ordered by position within the column.
    assert!(todo[0].position < todo[1].position);

    let claudes = fixture
        .tasks
        .list_tasks(&TaskFilter {
            agent: Some("claude".to_string()),
            ..TaskFilter::default()
        })
        .expect("list");
    assert_eq!(claudes.len(), 1);
    assert_eq!(claudes[0].board_task_id, 3);
}

#[test]
fn validation_rejects_bad_input_before_mutation() {
    let fixture = support::board("Test Board");

    assert_eq!(
        fixture
            .tasks
            .add_task(&NewTask::new(""), "user")
            .expect_err("empty title")
            .exit_code(),
        4
    );
    assert_eq!(
        fixture
            .tasks
            .add_task(&NewTask::new("x".repeat(201)), "user")
            .expect_err("long title")
            .exit_code(),
        4
    );

    let err = fixture
        .tasks
        .add_task(
            &NewTask {
                column: Some("shipping".to_string()),
                ..NewTask::new("Task")
            },
            "user",
        )
        .expect_err("unknown column");
    assert_eq!(err.exit_code(), 2);

    // Nothing was created by the failed calls.
    assert!(fixture.tasks.list_tasks(&TaskFilter::default()).expect("list").is_empty());
}

#[test]
fn purge_removes_only_archived_tasks() {
    let fixture = support::board("Test Board");
    support::add(&fixture, "Keep");
    support::add(&fixture, "Drop 1");
    support::add(&fixture, "Drop 2");
    fixture.tasks.archive_task("#2", "user").expect("archive");
    fixture.tasks.archive_task("#3", "user").expect("archive");

    let removed = fixture.tasks.purge("user").expect("purge");
    assert_eq!(removed, 2);

    let all = fixture
        .tasks
        .list_tasks(&TaskFilter {
            include_archived: true,
            ..TaskFilter::default()
        })
        .expect("list");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].title, "Keep");
}

#[test]
fn reset_clears_tasks_and_restarts_short_ids() {
    let fixture = support::board("Test Board");
    support::add(&fixture, "Task 1");
    support::add(&fixture, "Task 2");

    let removed = fixture.tasks.reset("user").expect("reset");
    assert_eq!(removed, 2);

    let fresh = support::add(&fixture, "After reset");
    assert_eq!(fresh.board_task_id, 1);
}

#[test]
fn search_matches_title_and_description() {
    let fixture = support::board("Test Board");
    support::add(&fixture, "Fix the parser");
    let input = NewTask {
        description: Some("The tokenizer chokes on tabs".to_string()),
        ..NewTask::new("Other work")
    };
    fixture.tasks.add_task(&input, "user").expect("add");

    let hits = fixture.tasks.search("parser", false).expect("search");
    assert_eq!(hits.len(), 1);
    let hits = fixture.tasks.search("TOKENIZER", false).expect("search");
    assert_eq!(hits.len(), 1);
    let hits = fixture.tasks.search("nothing", false).expect("search");
    assert!(hits.is_empty());
}
