//! Ordered schema migrations.
//!
//! Each migration is a named SQL script split on the statement-break
//! marker. Applied migrations are recorded in `__migrations` inside the
//! same transaction that runs them, so re-opening a database is a no-op
//! and a failed migration leaves no partial schema.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};

/// Marker separating statements inside one migration script.
pub const STATEMENT_BREAK: &str = "--> statement-breakpoint";

struct Migration {
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_init",
        sql: r#"
CREATE TABLE IF NOT EXISTS boards (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    max_board_task_id INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    created_by TEXT,
    updated_by TEXT
);
--> statement-breakpoint
CREATE TABLE IF NOT EXISTS columns (
    id TEXT PRIMARY KEY,
    board_id TEXT NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    position INTEGER NOT NULL,
    wip_limit INTEGER,
    is_terminal INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    created_by TEXT,
    updated_by TEXT
);
--> statement-breakpoint
CREATE UNIQUE INDEX IF NOT EXISTS idx_columns_board_position
    ON columns(board_id, position);
--> statement-breakpoint
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    board_task_id INTEGER NOT NULL,
    column_id TEXT NOT NULL REFERENCES columns(id),
    title TEXT NOT NULL,
    description TEXT,
    position INTEGER NOT NULL,
    created_by TEXT,
    assigned_to TEXT,
    parent_id TEXT REFERENCES tasks(id) ON DELETE SET NULL,
    labels TEXT NOT NULL DEFAULT '[]',
    files TEXT NOT NULL DEFAULT '[]',
    blocked_reason TEXT,
    version INTEGER NOT NULL DEFAULT 1,
    due_date TEXT,
    started_at TEXT,
    completed_at TEXT,
    archived INTEGER NOT NULL DEFAULT 0,
    archived_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    updated_by TEXT
);
--> statement-breakpoint
CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_board_task_id
    ON tasks(board_task_id);
--> statement-breakpoint
CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_column_position
    ON tasks(column_id, position);
--> statement-breakpoint
CREATE INDEX IF NOT EXISTS idx_tasks_assigned ON tasks(assigned_to);
--> statement-breakpoint
CREATE TABLE IF NOT EXISTS task_links (
    from_task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    to_task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    link_type TEXT NOT NULL CHECK (link_type IN ('blocks', 'blocked_by', 'related')),
    created_at TEXT NOT NULL,
    PRIMARY KEY (from_task_id, to_task_id, link_type)
);
--> statement-breakpoint
CREATE INDEX IF NOT EXISTS idx_task_links_to ON task_links(to_task_id);
"#,
    },
    Migration {
        name: "0002_audit_log",
        sql: r#"
CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    event_type TEXT NOT NULL CHECK (event_type IN ('CREATE', 'UPDATE', 'DELETE')),
    object_type TEXT NOT NULL CHECK (object_type IN ('task', 'column', 'board')),
    object_id TEXT NOT NULL,
    field_name TEXT,
    old_value TEXT,
    new_value TEXT,
    actor TEXT
);
--> statement-breakpoint
CREATE INDEX IF NOT EXISTS idx_audit_object ON audit_log(object_type, object_id);
--> statement-breakpoint
CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
--> statement-breakpoint
CREATE INDEX IF NOT EXISTS idx_audit_actor ON audit_log(actor);
"#,
    },
    Migration {
        name: "0003_audit_triggers",
        sql: AUDIT_TRIGGERS_SQL,
    },
    Migration {
        name: "0004_board_scorer",
        sql: "ALTER TABLE boards ADD COLUMN scorer TEXT;",
    },
];

// Triggers run inside the transaction of the originating statement, so a
// rolled-back mutation leaves no audit trace. `OLD.x IS NOT NEW.x` detects
// NULL <-> value transitions that `!=` would miss.
const AUDIT_TRIGGERS_SQL: &str = r#"
CREATE TRIGGER IF NOT EXISTS trg_tasks_audit_create
AFTER INSERT ON tasks
BEGIN
    INSERT INTO audit_log (event_type, object_type, object_id, new_value, actor)
    VALUES ('CREATE', 'task', NEW.id,
            json_object('title', NEW.title, 'columnId', NEW.column_id),
            COALESCE(NEW.updated_by, NEW.created_by));
END;
--> statement-breakpoint
CREATE TRIGGER IF NOT EXISTS trg_tasks_audit_delete
AFTER DELETE ON tasks
BEGIN
    INSERT INTO audit_log (event_type, object_type, object_id, old_value, actor)
    VALUES ('DELETE', 'task', OLD.id,
            json_object('title', OLD.title, 'columnId', OLD.column_id),
            OLD.updated_by);
END;
--> statement-breakpoint
CREATE TRIGGER IF NOT EXISTS trg_tasks_audit_update_title
AFTER UPDATE OF title ON tasks
WHEN OLD.title IS NOT NEW.title
BEGIN
    INSERT INTO audit_log (event_type, object_type, object_id, field_name, old_value, new_value, actor)
    VALUES ('UPDATE', 'task', NEW.id, 'title', OLD.title, NEW.title, NEW.updated_by);
END;
--> statement-breakpoint
CREATE TRIGGER IF NOT EXISTS trg_tasks_audit_update_column
AFTER UPDATE OF column_id ON tasks
WHEN OLD.column_id IS NOT NEW.column_id
BEGIN
    INSERT INTO audit_log (event_type, object_type, object_id, field_name, old_value, new_value, actor)
    VALUES ('UPDATE', 'task', NEW.id, 'columnId', OLD.column_id, NEW.column_id, NEW.updated_by);
END;
--> statement-breakpoint
CREATE TRIGGER IF NOT EXISTS trg_tasks_audit_update_assigned
AFTER UPDATE OF assigned_to ON tasks
WHEN OLD.assigned_to IS NOT NEW.assigned_to
BEGIN
    INSERT INTO audit_log (event_type, object_type, object_id, field_name, old_value, new_value, actor)
    VALUES ('UPDATE', 'task', NEW.id, 'assignedTo', OLD.assigned_to, NEW.assigned_to, NEW.updated_by);
END;
--> statement-breakpoint
CREATE TRIGGER IF NOT EXISTS trg_tasks_audit_update_description
AFTER UPDATE OF description ON tasks
WHEN OLD.description IS NOT NEW.description
BEGIN
    INSERT INTO audit_log (event_type, object_type, object_id, field_name, old_value, new_value, actor)
    VALUES ('UPDATE', 'task', NEW.id, 'description', OLD.description, NEW.description, NEW.updated_by);
END;
--> statement-breakpoint
CREATE TRIGGER IF NOT EXISTS trg_tasks_audit_update_archived
AFTER UPDATE OF archived ON tasks
WHEN OLD.archived IS NOT NEW.archived
BEGIN
    INSERT INTO audit_log (event_type, object_type, object_id, field_name, old_value, new_value, actor)
    VALUES ('UPDATE', 'task', NEW.id, 'archived',
            CAST(OLD.archived AS TEXT), CAST(NEW.archived AS TEXT), NEW.updated_by);
END;
--> statement-breakpoint
CREATE TRIGGER IF NOT EXISTS trg_tasks_audit_update_labels
AFTER UPDATE OF labels ON tasks
WHEN OLD.labels IS NOT NEW.labels
BEGIN
    INSERT INTO audit_log (event_type, object_type, object_id, field_name, old_value, new_value, actor)
    VALUES ('UPDATE', 'task', NEW.id, 'labels', OLD.labels, NEW.labels, NEW.updated_by);
END;
--> statement-breakpoint
CREATE TRIGGER IF NOT EXISTS trg_tasks_audit_update_position
AFTER UPDATE OF position ON tasks
WHEN OLD.position IS NOT NEW.position
BEGIN
    INSERT INTO audit_log (event_type, object_type, object_id, field_name, old_value, new_value, actor)
    VALUES ('UPDATE', 'task', NEW.id, 'position',
            CAST(OLD.position AS TEXT), CAST(NEW.position AS TEXT), NEW.updated_by);
END;
--> statement-breakpoint
CREATE TRIGGER IF NOT EXISTS trg_columns_audit_create
AFTER INSERT ON columns
BEGIN
    INSERT INTO audit_log (event_type, object_type, object_id, new_value, actor)
    VALUES ('CREATE', 'column', NEW.id,
            json_object('name', NEW.name),
            COALESCE(NEW.updated_by, NEW.created_by));
END;
--> statement-breakpoint
CREATE TRIGGER IF NOT EXISTS trg_columns_audit_delete
AFTER DELETE ON columns
BEGIN
    INSERT INTO audit_log (event_type, object_type, object_id, old_value, actor)
    VALUES ('DELETE', 'column', OLD.id, json_object('name', OLD.name), OLD.updated_by);
END;
--> statement-breakpoint
CREATE TRIGGER IF NOT EXISTS trg_columns_audit_update_name
AFTER UPDATE OF name ON columns
WHEN OLD.name IS NOT NEW.name
BEGIN
    INSERT INTO audit_log (event_type, object_type, object_id, field_name, old_value, new_value, actor)
    VALUES ('UPDATE', 'column', NEW.id, 'name', OLD.name, NEW.name, NEW.updated_by);
END;
--> statement-breakpoint
CREATE TRIGGER IF NOT EXISTS trg_columns_audit_update_position
AFTER UPDATE OF position ON columns
WHEN OLD.position IS NOT NEW.position
BEGIN
    INSERT INTO audit_log (event_type, object_type, object_id, field_name, old_value, new_value, actor)
    VALUES ('UPDATE', 'column', NEW.id, 'position',
            CAST(OLD.position AS TEXT), CAST(NEW.position AS TEXT), NEW.updated_by);
END;
--> statement-breakpoint
CREATE TRIGGER IF NOT EXISTS trg_columns_audit_update_wip
AFTER UPDATE OF wip_limit ON columns
WHEN OLD.wip_limit IS NOT NEW.wip_limit
BEGIN
    INSERT INTO audit_log (event_type, object_type, object_id, field_name, old_value, new_value, actor)
    VALUES ('UPDATE', 'column', NEW.id, 'wipLimit',
            CAST(OLD.wip_limit AS TEXT), CAST(NEW.wip_limit AS TEXT), NEW.updated_by);
END;
--> statement-breakpoint
CREATE TRIGGER IF NOT EXISTS trg_boards_audit_create
AFTER INSERT ON boards
BEGIN
    INSERT INTO audit_log (event_type, object_type, object_id, new_value, actor)
    VALUES ('CREATE', 'board', NEW.id,
            json_object('name', NEW.name),
            COALESCE(NEW.updated_by, NEW.created_by));
END;
--> statement-breakpoint
CREATE TRIGGER IF NOT EXISTS trg_boards_audit_delete
AFTER DELETE ON boards
BEGIN
    INSERT INTO audit_log (event_type, object_type, object_id, old_value, actor)
    VALUES ('DELETE', 'board', OLD.id, json_object('name', OLD.name), OLD.updated_by);
END;
--> statement-breakpoint
CREATE TRIGGER IF NOT EXISTS trg_boards_audit_update_name
AFTER UPDATE OF name ON boards
WHEN OLD.name IS NOT NEW.name
BEGIN
    INSERT INTO audit_log (event_type, object_type, object_id, field_name, old_value, new_value, actor)
    VALUES ('UPDATE', 'board', NEW.id, 'name', OLD.name, NEW.name, NEW.updated_by);
END;
"#;

/// Apply every unapplied migration in order.
pub(crate) fn apply_all(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS __migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )",
        [],
    )?;

    for migration in MIGRATIONS {
        // The applied-check runs inside an immediate transaction so two
        // processes opening a fresh database cannot both apply the script.
        let tx = conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)
            .map_err(Error::from)?;
        let applied = tx
            .query_row(
                "SELECT 1 FROM __migrations WHERE name = ?1",
                params![migration.name],
                |_| Ok(()),
            )
            .optional()
            .map_err(Error::from)?
            .is_some();
        if applied {
            continue;
        }

        tracing::debug!(name = migration.name, "applying migration");
        for statement in split_statements(migration.sql) {
            tx.execute_batch(statement).map_err(|err| Error::Migration {
                name: migration.name.to_string(),
                message: err.to_string(),
            })?;
        }
        tx.execute(
            "INSERT OR IGNORE INTO __migrations (name) VALUES (?1)",
            params![migration.name],
        )?;
        tx.commit()?;
    }

    Ok(())
}

fn split_statements(sql: &str) -> impl Iterator<Item = &str> {
    sql.split(STATEMENT_BREAK)
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
}
