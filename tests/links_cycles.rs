mod support;

use kaban::error::Error;
use kaban::links::LinkType;
use kaban::task::TaskFilter;

#[test]
fn cycle_is_rejected_with_path() {
    let fixture = support::board("Test Board");
    support::add(&fixture, "Task 1");
    support::add(&fixture, "Task 2");
    support::add(&fixture, "Task 3");

    fixture.tasks.add_dependency("#1", "#2", "user").expect("1 <- 2");
    fixture.tasks.add_dependency("#2", "#3", "user").expect("2 <- 3");

    let err = fixture
        .tasks
        .add_dependency("#3", "#1", "user")
        .expect_err("closing the loop");
    assert_eq!(err.exit_code(), 6);
    match err {
        Error::Cycle { path } => {
            assert_eq!(path, vec!["#3", "#1", "#2", "#3"]);
        }
        other => panic!("expected cycle, got {other:?}"),
    }

    // The rejected edge left no trace.
    let links = fixture.links.get_links("#3").expect("links");
    assert!(links.blocked_by.is_empty());
}

#[test]
fn self_dependency_is_a_cycle() {
    let fixture = support::board("Test Board");
    support::add(&fixture, "Task 1");

    let err = fixture
        .tasks
        .add_dependency("#1", "#1", "user")
        .expect_err("self edge");
    assert_eq!(err.exit_code(), 6);
}

#[test]
fn blocks_and_blocked_by_mirror_each_other() {
    let fixture = support::board("Test Board");
    let first = support::add(&fixture, "Task 1");
    let second = support::add(&fixture, "Task 2");

    fixture.tasks.add_dependency("#1", "#2", "user").expect("link");

    let of_first = fixture.links.get_links("#1").expect("links");
    assert_eq!(of_first.blocked_by, vec![second.id.clone()]);
    assert!(of_first.blocks.is_empty());

    let of_second = fixture.links.get_links("#2").expect("links");
    assert_eq!(of_second.blocks, vec![first.id.clone()]);
    assert!(of_second.blocked_by.is_empty());

    // The derived dependsOn view follows the link table.
    let loaded = fixture.tasks.resolve_task("#1").expect("task");
    assert_eq!(loaded.depends_on, vec![second.id]);
}

#[test]
fn duplicate_links_are_rejected() {
    let fixture = support::board("Test Board");
    support::add(&fixture, "Task 1");
    support::add(&fixture, "Task 2");

    fixture.tasks.add_dependency("#1", "#2", "user").expect("link");
    let err = fixture
        .tasks
        .add_dependency("#1", "#2", "user")
        .expect_err("again");
    assert_eq!(err.exit_code(), 7);
}

#[test]
fn related_links_are_symmetric() {
    let fixture = support::board("Test Board");
    let first = support::add(&fixture, "Task 1");
    let second = support::add(&fixture, "Task 2");

    fixture
        .links
        .create_link("#1", "#2", LinkType::Related)
        .expect("relate");

    assert_eq!(fixture.links.get_links("#1").expect("links").related, vec![second.id]);
    assert_eq!(fixture.links.get_links("#2").expect("links").related, vec![first.id]);
    // Related links play no part in blocking.
    assert!(!fixture.links.is_blocked("#1").expect("blocked"));
}

#[test]
fn remove_dependency_removes_both_directions() {
    let fixture = support::board("Test Board");
    support::add(&fixture, "Task 1");
    support::add(&fixture, "Task 2");

    fixture.tasks.add_dependency("#1", "#2", "user").expect("link");
    fixture.tasks.remove_dependency("#1", "#2", "user").expect("unlink");

    assert!(fixture.links.get_links("#1").expect("links").blocked_by.is_empty());
    assert!(fixture.links.get_links("#2").expect("links").blocks.is_empty());

    let err = fixture
        .tasks
        .remove_dependency("#1", "#2", "user")
        .expect_err("already gone");
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn blockers_clear_when_completed_or_archived() {
    let fixture = support::board("Test Board");
    support::add(&fixture, "Task 1");
    support::add(&fixture, "Task 2");
    support::add(&fixture, "Task 3");
    fixture.tasks.add_dependency("#1", "#2", "user").expect("link");
    fixture.tasks.add_dependency("#1", "#3", "user").expect("link");

    assert!(fixture.links.is_blocked("#1").expect("blocked"));
    let blockers = fixture.links.get_blockers("#1").expect("blockers");
    assert_eq!(blockers.len(), 2);

    fixture
        .tasks
        .move_task("#2", "done", false, "user")
        .expect("complete blocker");
    let blockers = fixture.links.get_blockers("#1").expect("blockers");
    assert_eq!(blockers.len(), 1);
    assert_eq!(blockers[0].board_task_id, 3);

    fixture.tasks.archive_task("#3", "user").expect("archive blocker");
    assert!(!fixture.links.is_blocked("#1").expect("unblocked"));
}

#[test]
fn blocked_moves_are_refused_except_backlog_and_terminal() {
    let fixture = support::board("Test Board");
    support::add(&fixture, "Task 1");
    support::add(&fixture, "Task 2");
    fixture.tasks.add_dependency("#1", "#2", "user").expect("link");

    let err = fixture
        .tasks
        .move_task("#1", "in_progress", false, "user")
        .expect_err("blocked");
    assert_eq!(err.exit_code(), 5);
    match err {
        Error::Blocked { blockers, .. } => assert_eq!(blockers, vec!["#2"]),
        other => panic!("expected blocked, got {other:?}"),
    }

    // Backlog and terminal columns accept blocked tasks.
    fixture
        .tasks
        .move_task("#1", "backlog", false, "user")
        .expect("backlog allowed");
    fixture
        .tasks
        .move_task("#1", "done", false, "user")
        .expect("terminal allowed");
}

#[test]
fn blocked_filter_in_listing() {
    let fixture = support::board("Test Board");
    support::add(&fixture, "Task 1");
    support::add(&fixture, "Task 2");
    fixture.tasks.add_dependency("#1", "#2", "user").expect("link");

    let blocked = fixture
        .tasks
        .list_tasks(&TaskFilter {
            blocked: Some(true),
            ..TaskFilter::default()
        })
        .expect("list");
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].board_task_id, 1);

    let free = fixture
        .tasks
        .list_tasks(&TaskFilter {
            blocked: Some(false),
            ..TaskFilter::default()
        })
        .expect("list");
    assert_eq!(free.len(), 1);
    assert_eq!(free[0].board_task_id, 2);
}

#[test]
fn deleting_a_task_cascades_its_links() {
    let fixture = support::board("Test Board");
    support::add(&fixture, "Task 1");
    support::add(&fixture, "Task 2");
    fixture.tasks.add_dependency("#1", "#2", "user").expect("link");

    fixture.tasks.delete_task("#2", "user").expect("delete");

    let links = fixture.links.get_links("#1").expect("links");
    assert!(links.blocked_by.is_empty());
    assert!(!fixture.links.is_blocked("#1").expect("unblocked"));
}

#[test]
fn blocking_count_feeds_the_scorer() {
    let fixture = support::board("Test Board");
    support::add(&fixture, "Task 1");
    support::add(&fixture, "Task 2");
    support::add(&fixture, "Task 3");
    fixture.tasks.add_dependency("#1", "#3", "user").expect("link");
    fixture.tasks.add_dependency("#2", "#3", "user").expect("link");

    assert_eq!(fixture.links.blocking_count("#3").expect("count"), 2);
    assert_eq!(fixture.links.blocking_count("#1").expect("count"), 0);

    // Completed dependents stop counting.
    fixture
        .tasks
        .move_task("#1", "done", false, "user")
        .expect("complete");
    assert_eq!(fixture.links.blocking_count("#3").expect("count"), 1);
}

#[test]
fn add_task_with_dependencies_is_atomic() {
    let fixture = support::board("Test Board");
    support::add(&fixture, "Task 1");

    let input = kaban::task::NewTask {
        depends_on: vec!["#1".to_string(), "#99".to_string()],
        ..kaban::task::NewTask::new("Task 2")
    };
    let err = fixture.tasks.add_task(&input, "user").expect_err("missing dep");
    assert_eq!(err.exit_code(), 2);

    // The failed add left neither the task nor the first link behind.
    assert!(fixture.tasks.get_task("#2").expect("lookup").is_none());
    assert!(fixture.links.get_links("#1").expect("links").blocks.is_empty());

    let ok = fixture
        .tasks
        .add_task(
            &kaban::task::NewTask {
                depends_on: vec!["#1".to_string()],
                ..kaban::task::NewTask::new("Task 2")
            },
            "user",
        )
        .expect("valid deps");
    assert_eq!(ok.depends_on.len(), 1);
}
