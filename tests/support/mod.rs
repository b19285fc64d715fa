//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use kaban::audit::AuditService;
use kaban::board::BoardService;
use kaban::config::BoardConfig;
use kaban::links::LinkService;
use kaban::store::Store;
use kaban::task::{NewTask, Task, TaskService};

/// A board in a temp directory with every service wired to one store.
pub struct Fixture {
    pub dir: TempDir,
    pub store: Arc<Store>,
    pub boards: BoardService,
    pub tasks: TaskService,
    pub links: LinkService,
    pub audit: AuditService,
}

/// Open a fresh store and initialize a board with the default column
/// layout.
pub fn board(name: &str) -> Fixture {
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(Store::open(dir.path().join(".kaban")).expect("open store"));

    let boards = BoardService::new(Arc::clone(&store));
    let tasks = TaskService::new(Arc::clone(&store));
    let links = LinkService::new(Arc::clone(&store));
    let audit = AuditService::new(Arc::clone(&store));

    let config = BoardConfig {
        name: name.to_string(),
        ..BoardConfig::default()
    };
    boards.initialize_board(&config, "user").expect("init board");

    Fixture {
        dir,
        store,
        boards,
        tasks,
        links,
        audit,
    }
}

/// Add a task with just a title, as "user".
pub fn add(fixture: &Fixture, title: &str) -> Task {
    fixture
        .tasks
        .add_task(&NewTask::new(title), "user")
        .expect("add task")
}

/// Add a task in a specific column, as "user".
pub fn add_in(fixture: &Fixture, title: &str, column: &str) -> Task {
    let input = NewTask {
        column: Some(column.to_string()),
        ..NewTask::new(title)
    };
    fixture.tasks.add_task(&input, "user").expect("add task")
}
