//! Task management: creation, mutation, movement, archival, resolution.
//!
//! Every mutating operation stamps `updated_by` before touching a row so
//! the audit triggers can attribute the change; services never write the
//! audit table directly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde::Serialize;

use crate::board::{board_columns, column_by_ref, current_board};
use crate::config::{BACKLOG_COLUMN_ID, DEFAULT_COLUMN_ID, IN_PROGRESS_COLUMN_ID};
use crate::error::{Error, Result};
use crate::ids;
use crate::links::{self, LinkType};
use crate::store::Store;
use crate::validate;

/// Unit of work on the board
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub board_task_id: i64,
    pub column_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub position: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
    pub version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub archived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    /// Backwards-compat view of `blocked_by` links; the link table is
    /// authoritative and this list is populated read-through.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl Task {
    /// Short id rendered the way front-ends print it.
    pub fn short_id(&self) -> String {
        format!("#{}", self.board_task_id)
    }
}

/// Input for [`TaskService::add_task`]
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    /// Explicit global id; normally left `None` so a fresh one is
    /// allocated. Used by the Markdown importer to preserve identities.
    pub id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    /// Column id or name; defaults to `todo`
    pub column: Option<String>,
    pub assigned_to: Option<String>,
    /// Ids (any accepted form) of tasks this one depends on
    pub depends_on: Vec<String>,
    pub labels: Vec<String>,
    pub files: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub parent: Option<String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Partial update for [`TaskService::update_task`]
///
/// Outer `None` leaves a field untouched; for clearable fields the inner
/// option distinguishes "set" from "clear".
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub labels: Option<Vec<String>>,
    pub files: Option<Vec<String>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub blocked_reason: Option<Option<String>>,
    pub parent: Option<Option<String>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    /// Optimistic-concurrency token; mismatch fails with `Conflict`
    pub expected_version: Option<i64>,
}

/// Filter for [`TaskService::list_tasks`]
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Column id or name
    pub column: Option<String>,
    /// Only tasks assigned to this agent
    pub agent: Option<String>,
    /// Only blocked (`Some(true)`) or unblocked (`Some(false)`) tasks
    pub blocked: Option<bool>,
    pub include_archived: bool,
}

/// Task operations
#[derive(Debug, Clone)]
pub struct TaskService {
    store: Arc<Store>,
}

impl TaskService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Create a task, allocating its board short id and position.
    ///
    /// Declared dependencies are linked in the same transaction, so a
    /// cycle among them leaves no trace of the task.
    pub fn add_task(&self, input: &NewTask, actor: &str) -> Result<Task> {
        self.store.with_tx(|tx| insert_task(tx, input, actor))
    }

    /// Resolve a task by full id, board short id, or global-id prefix.
    ///
    /// Returns `Ok(None)` when nothing matches; an ambiguous prefix is an
    /// error.
    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        self.store.with_conn(|conn| {
            let Some(task_id) = resolve_task_id(conn, id)? else {
                return Ok(None);
            };
            load_task(conn, &task_id)
        })
    }

    /// Like [`get_task`](Self::get_task) but a miss is `NotFound`.
    pub fn resolve_task(&self, id: &str) -> Result<Task> {
        self.get_task(id)?.ok_or_else(|| Error::NotFound {
            entity: "task",
            id: id.to_string(),
        })
    }

    /// List tasks ordered by `(column_id, position)`.
    ///
    /// Archived tasks are excluded unless the filter requests them.
    pub fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.store.with_conn(|conn| {
            let mut clauses: Vec<String> = Vec::new();
            let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

            if !filter.include_archived {
                clauses.push("archived = 0".to_string());
            }
            if let Some(column) = &filter.column {
                let column = column_by_ref(conn, column)?;
                params_vec.push(Box::new(column.id));
                clauses.push(format!("column_id = ?{}", params_vec.len()));
            }
            if let Some(agent) = &filter.agent {
                params_vec.push(Box::new(agent.clone()));
                clauses.push(format!("assigned_to = ?{}", params_vec.len()));
            }
            if let Some(blocked) = filter.blocked {
                let exists = "EXISTS (SELECT 1 FROM task_links l JOIN tasks b ON b.id = l.to_task_id \
                              WHERE l.from_task_id = tasks.id AND l.link_type = 'blocked_by' \
                              AND b.completed_at IS NULL AND b.archived = 0)";
                if blocked {
                    clauses.push(exists.to_string());
                } else {
                    clauses.push(format!("NOT {exists}"));
                }
            }

            let where_sql = if clauses.is_empty() {
                String::new()
            } else {
                format!(" WHERE {}", clauses.join(" AND "))
            };
            let sql = format!("{TASK_SELECT}{where_sql} ORDER BY column_id, position");

            let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
            let mut stmt = conn.prepare(&sql)?;
            let mut tasks = stmt
                .query_map(params_refs.as_slice(), task_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            attach_depends_on(conn, &mut tasks)?;
            Ok(tasks)
        })
    }

    /// Apply a partial update, bumping `version` when anything changed.
    pub fn update_task(&self, id: &str, update: &TaskUpdate, actor: &str) -> Result<Task> {
        if let Some(title) = update.title.as_deref() {
            validate::validate_title(title)?;
        }
        if let Some(description) = &update.description {
            validate::validate_description(description.as_deref())?;
        }
        if let Some(labels) = &update.labels {
            validate::validate_labels(labels)?;
        }
        if let Some(files) = &update.files {
            validate::validate_files(files)?;
        }

        self.store.with_tx(|tx| {
            let task = require_task(tx, id)?;
            if let Some(expected) = update.expected_version {
                if expected != task.version {
                    return Err(Error::Conflict {
                        id: task.short_id(),
                        expected,
                        found: task.version,
                    });
                }
            }

            let mut sets: Vec<String> = Vec::new();
            let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();
            fn push(
                sets: &mut Vec<String>,
                params_vec: &mut Vec<Box<dyn ToSql>>,
                column: &str,
                value: Box<dyn ToSql>,
            ) {
                params_vec.push(value);
                sets.push(format!("{column} = ?{}", params_vec.len()));
            }

            if let Some(title) = &update.title {
                if *title != task.title {
                    push(&mut sets, &mut params_vec, "title", Box::new(title.clone()));
                }
            }
            if let Some(description) = &update.description {
                if *description != task.description {
                    push(
                        &mut sets,
                        &mut params_vec,
                        "description",
                        Box::new(description.clone()),
                    );
                }
            }
            if let Some(labels) = &update.labels {
                if *labels != task.labels {
                    push(
                        &mut sets,
                        &mut params_vec,
                        "labels",
                        Box::new(serde_json::to_string(labels)?),
                    );
                }
            }
            if let Some(files) = &update.files {
                if *files != task.files {
                    push(
                        &mut sets,
                        &mut params_vec,
                        "files",
                        Box::new(serde_json::to_string(files)?),
                    );
                }
            }
            if let Some(due_date) = &update.due_date {
                if *due_date != task.due_date {
                    push(&mut sets, &mut params_vec, "due_date", Box::new(*due_date));
                }
            }
            if let Some(blocked_reason) = &update.blocked_reason {
                if *blocked_reason != task.blocked_reason {
                    push(
                        &mut sets,
                        &mut params_vec,
                        "blocked_reason",
                        Box::new(blocked_reason.clone()),
                    );
                }
            }
            if let Some(parent) = &update.parent {
                let parent_id = match parent {
                    Some(parent_ref) => {
                        let resolved =
                            resolve_task_id(tx, parent_ref)?.ok_or_else(|| Error::NotFound {
                                entity: "task",
                                id: parent_ref.clone(),
                            })?;
                        if resolved == task.id {
                            return Err(Error::validation(
                                "parent",
                                "task cannot be its own parent",
                            ));
                        }
                        Some(resolved)
                    }
                    None => None,
                };
                if parent_id != task.parent_id {
                    push(&mut sets, &mut params_vec, "parent_id", Box::new(parent_id));
                }
            }
            if let Some(completed_at) = &update.completed_at {
                if *completed_at != task.completed_at {
                    push(
                        &mut sets,
                        &mut params_vec,
                        "completed_at",
                        Box::new(*completed_at),
                    );
                }
            }

            if sets.is_empty() {
                return Ok(task);
            }

            params_vec.push(Box::new(Utc::now()));
            sets.push(format!("updated_at = ?{}", params_vec.len()));
            params_vec.push(Box::new(actor.to_string()));
            sets.push(format!("updated_by = ?{}", params_vec.len()));
            sets.push("version = version + 1".to_string());

            params_vec.push(Box::new(task.id.clone()));
            let sql = format!(
                "UPDATE tasks SET {} WHERE id = ?{}",
                sets.join(", "),
                params_vec.len()
            );
            let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
            tx.execute(&sql, params_refs.as_slice())?;

            require_task(tx, &task.id)
        })
    }

    /// Move a task into another column.
    ///
    /// Enforces the target's WIP limit (unless `force`), refuses when
    /// unresolved blockers exist and the target is neither the backlog nor
    /// terminal, stamps `started_at` on first entry into `in_progress`, and
    /// stamps `completed_at` when entering a terminal column.
    pub fn move_task(&self, id: &str, target_column: &str, force: bool, actor: &str) -> Result<Task> {
        self.store.with_tx(|tx| {
            let task = require_task(tx, id)?;
            let column = match column_by_ref(tx, target_column) {
                Err(Error::NotFound { .. }) => {
                    return Err(Error::validation(
                        "column",
                        format!("unknown column '{target_column}'"),
                    ));
                }
                other => other?,
            };

            if column.id == task.column_id {
                return Ok(task);
            }

            if let (Some(limit), false) = (column.wip_limit, force) {
                let count = wip_count(tx, &column.id)?;
                if count >= limit {
                    return Err(Error::WipLimitReached {
                        column: column.name,
                        count,
                        limit,
                    });
                }
            }

            if !column.is_terminal && column.id != BACKLOG_COLUMN_ID {
                let blockers = links::open_blockers(tx, &task.id)?;
                if !blockers.is_empty() {
                    return Err(Error::Blocked {
                        id: task.short_id(),
                        blockers: blockers.iter().map(Task::short_id).collect(),
                    });
                }
            }

            let now = Utc::now();
            let position = next_position(tx, &column.id)?;
            let started_at = match task.started_at {
                None if column.id == IN_PROGRESS_COLUMN_ID => Some(now),
                other => other,
            };
            let completed_at = match task.completed_at {
                None if column.is_terminal => Some(now),
                other => other,
            };

            tx.execute(
                "UPDATE tasks SET column_id = ?1, position = ?2, started_at = ?3, completed_at = ?4,
                        version = version + 1, updated_at = ?5, updated_by = ?6
                 WHERE id = ?7",
                params![column.id, position, started_at, completed_at, now, actor, task.id],
            )?;

            require_task(tx, &task.id)
        })
    }

    /// Soft-delete a task. Archived tasks drop out of default queries.
    pub fn archive_task(&self, id: &str, actor: &str) -> Result<Task> {
        self.store.with_tx(|tx| {
            let task = require_task(tx, id)?;
            if task.archived {
                return Ok(task);
            }
            tx.execute(
                "UPDATE tasks SET archived = 1, archived_at = ?1, version = version + 1,
                        updated_at = ?1, updated_by = ?2
                 WHERE id = ?3",
                params![Utc::now(), actor, task.id],
            )?;
            require_task(tx, &task.id)
        })
    }

    /// Reverse an [`archive_task`](Self::archive_task).
    pub fn restore_task(&self, id: &str, actor: &str) -> Result<Task> {
        self.store.with_tx(|tx| {
            let task = require_task(tx, id)?;
            if !task.archived {
                return Ok(task);
            }
            tx.execute(
                "UPDATE tasks SET archived = 0, archived_at = NULL, version = version + 1,
                        updated_at = ?1, updated_by = ?2
                 WHERE id = ?3",
                params![Utc::now(), actor, task.id],
            )?;
            require_task(tx, &task.id)
        })
    }

    /// Hard-delete a task; its links cascade.
    pub fn delete_task(&self, id: &str, actor: &str) -> Result<()> {
        self.store.with_tx(|tx| {
            let task = require_task(tx, id)?;
            // Stamp the deleter first so the DELETE audit row names them.
            tx.execute(
                "UPDATE tasks SET updated_by = ?1 WHERE id = ?2",
                params![actor, task.id],
            )?;
            tx.execute("DELETE FROM tasks WHERE id = ?1", params![task.id])?;
            Ok(())
        })
    }

    /// Assign a task to an agent.
    pub fn assign(&self, id: &str, agent: &str, actor: &str) -> Result<Task> {
        validate::validate_agent_name(agent)?;
        self.set_assignee(id, Some(agent), actor)
    }

    /// Clear a task's assignee.
    pub fn unassign(&self, id: &str, actor: &str) -> Result<Task> {
        self.set_assignee(id, None, actor)
    }

    fn set_assignee(&self, id: &str, agent: Option<&str>, actor: &str) -> Result<Task> {
        self.store.with_tx(|tx| {
            let task = require_task(tx, id)?;
            if task.assigned_to.as_deref() == agent {
                return Ok(task);
            }
            tx.execute(
                "UPDATE tasks SET assigned_to = ?1, version = version + 1,
                        updated_at = ?2, updated_by = ?3
                 WHERE id = ?4",
                params![agent, Utc::now(), actor, task.id],
            )?;
            require_task(tx, &task.id)
        })
    }

    /// Record that `id` depends on (is blocked by) `other`.
    pub fn add_dependency(&self, id: &str, other: &str, _actor: &str) -> Result<Task> {
        self.store.with_tx(|tx| {
            let task = require_task(tx, id)?;
            let other_id = resolve_task_id(tx, other)?.ok_or_else(|| Error::NotFound {
                entity: "task",
                id: other.to_string(),
            })?;
            links::create_link(tx, &task.id, &other_id, LinkType::BlockedBy)?;
            require_task(tx, &task.id)
        })
    }

    /// Remove a dependency recorded with [`add_dependency`](Self::add_dependency).
    pub fn remove_dependency(&self, id: &str, other: &str, _actor: &str) -> Result<Task> {
        self.store.with_tx(|tx| {
            let task = require_task(tx, id)?;
            let other_id = resolve_task_id(tx, other)?.ok_or_else(|| Error::NotFound {
                entity: "task",
                id: other.to_string(),
            })?;
            links::remove_link(tx, &task.id, &other_id, LinkType::BlockedBy)?;
            require_task(tx, &task.id)
        })
    }

    /// Hard-delete every archived task. Returns the number removed.
    pub fn purge(&self, actor: &str) -> Result<usize> {
        self.store.with_tx(|tx| {
            tx.execute(
                "UPDATE tasks SET updated_by = ?1 WHERE archived = 1",
                params![actor],
            )?;
            let removed = tx.execute("DELETE FROM tasks WHERE archived = 1", [])?;
            Ok(removed)
        })
    }

    /// Delete every task and link, keeping the board shape. The short-id
    /// counter restarts, since this is an explicit project reset.
    pub fn reset(&self, actor: &str) -> Result<usize> {
        self.store.with_tx(|tx| {
            tx.execute("UPDATE tasks SET updated_by = ?1", params![actor])?;
            let removed = tx.execute("DELETE FROM tasks", [])?;
            tx.execute("UPDATE boards SET max_board_task_id = 0", [])?;
            Ok(removed)
        })
    }

    /// Substring search over titles and descriptions.
    pub fn search(&self, query: &str, include_archived: bool) -> Result<Vec<Task>> {
        self.store.with_conn(|conn| {
            let archived_sql = if include_archived { "" } else { " AND archived = 0" };
            let sql = format!(
                "{TASK_SELECT} WHERE (instr(lower(title), lower(?1)) > 0 \
                 OR instr(lower(COALESCE(description, '')), lower(?1)) > 0){archived_sql} \
                 ORDER BY column_id, position"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut tasks = stmt
                .query_map(params![query], task_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            attach_depends_on(conn, &mut tasks)?;
            Ok(tasks)
        })
    }
}

pub(crate) const TASK_SELECT: &str =
    "SELECT id, board_task_id, column_id, title, description, position, created_by, assigned_to, \
     parent_id, labels, files, blocked_reason, version, due_date, started_at, completed_at, \
     archived, archived_at, created_at, updated_at, updated_by FROM tasks";

pub(crate) fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    let labels_json: String = row.get(9)?;
    let files_json: String = row.get(10)?;
    let labels = serde_json::from_str(&labels_json)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(err)))?;
    let files = serde_json::from_str(&files_json)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(err)))?;

    Ok(Task {
        id: row.get(0)?,
        board_task_id: row.get(1)?,
        column_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        position: row.get(5)?,
        created_by: row.get(6)?,
        assigned_to: row.get(7)?,
        parent_id: row.get(8)?,
        labels,
        files,
        blocked_reason: row.get(11)?,
        version: row.get(12)?,
        due_date: row.get(13)?,
        started_at: row.get(14)?,
        completed_at: row.get(15)?,
        archived: row.get(16)?,
        archived_at: row.get(17)?,
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
        updated_by: row.get(20)?,
        depends_on: Vec::new(),
    })
}

/// Fill the read-through `depends_on` view from the link table.
pub(crate) fn attach_depends_on(conn: &Connection, tasks: &mut [Task]) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT to_task_id FROM task_links \
         WHERE from_task_id = ?1 AND link_type = 'blocked_by' ORDER BY created_at, to_task_id",
    )?;
    for task in tasks {
        task.depends_on = stmt
            .query_map(params![task.id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
    }
    Ok(())
}

/// Load a task by its exact global id.
pub(crate) fn load_task(conn: &Connection, task_id: &str) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            &format!("{TASK_SELECT} WHERE id = ?1"),
            params![task_id],
            task_from_row,
        )
        .optional()?;
    let Some(task) = task else {
        return Ok(None);
    };
    let mut tasks = [task];
    attach_depends_on(conn, &mut tasks)?;
    let [task] = tasks;
    Ok(Some(task))
}

pub(crate) fn require_task(conn: &Connection, id: &str) -> Result<Task> {
    let Some(task_id) = resolve_task_id(conn, id)? else {
        return Err(Error::NotFound {
            entity: "task",
            id: id.to_string(),
        });
    };
    load_task(conn, &task_id)?.ok_or_else(|| Error::NotFound {
        entity: "task",
        id: id.to_string(),
    })
}

/// Resolve any accepted id form to a global task id.
///
/// Accepts `#N`, a bare board short id, a full 26-char global id, or a
/// global-id prefix of at least four characters.
pub(crate) fn resolve_task_id(conn: &Connection, input: &str) -> Result<Option<String>> {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(Error::validation("id", "task id cannot be empty"));
    }

    if trimmed.chars().all(|ch| ch.is_ascii_digit()) {
        let board_task_id: i64 = trimmed
            .parse()
            .map_err(|_| Error::validation("id", format!("'{trimmed}' is out of range")))?;
        let id = conn
            .query_row(
                "SELECT id FROM tasks WHERE board_task_id = ?1",
                params![board_task_id],
                |row| row.get(0),
            )
            .optional()?;
        return Ok(id);
    }

    let normalized = ids::normalize_id(trimmed);
    if ids::is_global_id(&normalized) {
        let id = conn
            .query_row(
                "SELECT id FROM tasks WHERE id = ?1",
                params![normalized],
                |row| row.get(0),
            )
            .optional()?;
        return Ok(id);
    }

    if ids::is_id_prefix(&normalized) {
        let mut stmt = conn.prepare("SELECT id FROM tasks WHERE id LIKE ?1 ORDER BY id")?;
        let matches: Vec<String> = stmt
            .query_map(params![format!("{normalized}%")], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        return match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.into_iter().next()),
            _ => Err(Error::AmbiguousId {
                input: input.to_string(),
                matches,
            }),
        };
    }

    Ok(None)
}

/// Allocate the next board short id.
///
/// Takes the maximum of the board's high-water counter and the ids in use,
/// then bumps the counter in the same transaction: short ids are never
/// reused, even after the newest task is deleted.
pub(crate) fn next_board_task_id(conn: &Connection, board_id: &str) -> Result<i64> {
    let counter: i64 = conn.query_row(
        "SELECT max_board_task_id FROM boards WHERE id = ?1",
        params![board_id],
        |row| row.get(0),
    )?;
    let in_use: i64 = conn.query_row(
        "SELECT COALESCE(MAX(t.board_task_id), 0) FROM tasks t \
         JOIN columns c ON c.id = t.column_id WHERE c.board_id = ?1",
        params![board_id],
        |row| row.get(0),
    )?;
    let next = counter.max(in_use) + 1;
    conn.execute(
        "UPDATE boards SET max_board_task_id = ?1 WHERE id = ?2",
        params![next, board_id],
    )?;
    Ok(next)
}

pub(crate) fn next_position(conn: &Connection, column_id: &str) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM tasks WHERE column_id = ?1",
        params![column_id],
        |row| row.get(0),
    )?)
}

pub(crate) fn wip_count(conn: &Connection, column_id: &str) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE column_id = ?1 AND archived = 0",
        params![column_id],
        |row| row.get(0),
    )?)
}

/// Insert a task and its declared dependencies in the caller's transaction.
///
/// Inputs are validated before any row is touched.
pub(crate) fn insert_task(conn: &Connection, input: &NewTask, actor: &str) -> Result<Task> {
    validate::validate_title(&input.title)?;
    validate::validate_description(input.description.as_deref())?;
    validate::validate_labels(&input.labels)?;
    validate::validate_files(&input.files)?;
    if let Some(agent) = input.assigned_to.as_deref() {
        validate::validate_agent_name(agent)?;
    }

    let board = current_board(conn)?.ok_or_else(|| Error::NotFound {
        entity: "board",
        id: "(not initialized)".to_string(),
    })?;

    let column_ref = input.column.as_deref().unwrap_or(DEFAULT_COLUMN_ID);
    let column = column_by_ref(conn, column_ref)?;

    let parent_id = match input.parent.as_deref() {
        Some(parent_ref) => Some(resolve_task_id(conn, parent_ref)?.ok_or_else(|| {
            Error::NotFound {
                entity: "task",
                id: parent_ref.to_string(),
            }
        })?),
        None => None,
    };

    let task_id = match input.id.as_deref() {
        Some(id) => {
            let normalized = ids::normalize_id(id);
            if !ids::is_global_id(&normalized) {
                return Err(Error::validation(
                    "id",
                    format!("'{id}' is not a valid global id"),
                ));
            }
            normalized
        }
        None => ids::generate_task_id(),
    };
    let now = Utc::now();
    let board_task_id = next_board_task_id(conn, &board.id)?;
    let position = next_position(conn, &column.id)?;

    conn.execute(
        "INSERT INTO tasks (id, board_task_id, column_id, title, description, position,
                            created_by, assigned_to, parent_id, labels, files,
                            version, due_date, created_at, updated_at, updated_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1, ?12, ?13, ?13, ?14)",
        params![
            task_id,
            board_task_id,
            column.id,
            input.title,
            input.description,
            position,
            actor,
            input.assigned_to,
            parent_id,
            serde_json::to_string(&input.labels)?,
            serde_json::to_string(&input.files)?,
            input.due_date,
            now,
            actor,
        ],
    )?;

    for dep in &input.depends_on {
        let dep_id = resolve_task_id(conn, dep)?.ok_or_else(|| Error::NotFound {
            entity: "task",
            id: dep.clone(),
        })?;
        links::create_link(conn, &task_id, &dep_id, LinkType::BlockedBy)?;
    }

    tracing::debug!(id = %task_id, short = board_task_id, "task created");
    load_task(conn, &task_id)?.ok_or_else(|| Error::NotFound {
        entity: "task",
        id: task_id,
    })
}

/// Column layout snapshot used by the Markdown exporter: every column with
/// its tasks ordered by position then id.
pub(crate) fn tasks_by_column(
    conn: &Connection,
    include_archived: bool,
) -> Result<Vec<(crate::board::Column, Vec<Task>)>> {
    let columns = board_columns(conn)?;
    let mut sections = Vec::with_capacity(columns.len());
    for column in columns {
        let archived_sql = if include_archived { "" } else { " AND archived = 0" };
        let sql =
            format!("{TASK_SELECT} WHERE column_id = ?1{archived_sql} ORDER BY position, id");
        let mut stmt = conn.prepare(&sql)?;
        let mut tasks = stmt
            .query_map(params![column.id], task_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        attach_depends_on(conn, &mut tasks)?;
        sections.push((column, tasks));
    }
    Ok(sections)
}
