//! Board and column management.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::config::{BoardConfig, ColumnSpec};
use crate::error::{Error, Result};
use crate::ids;
use crate::scoring;
use crate::store::Store;
use crate::validate;

/// Top-level container of columns and tasks
#[derive(Debug, Clone, Serialize)]
pub struct Board {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scorer: Option<String>,
    pub max_board_task_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

/// Ordered bucket of tasks within a board
#[derive(Debug, Clone, Serialize)]
pub struct Column {
    pub id: String,
    pub board_id: String,
    pub name: String,
    pub position: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wip_limit: Option<i64>,
    pub is_terminal: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

/// Board and column operations
#[derive(Debug, Clone)]
pub struct BoardService {
    store: Arc<Store>,
}

impl BoardService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Create the board and its columns from the given configuration.
    ///
    /// Idempotent: when a board already exists it is returned unchanged.
    pub fn initialize_board(&self, config: &BoardConfig, actor: &str) -> Result<Board> {
        validate::validate_title(&config.name)?;
        for spec in &config.columns {
            validate::validate_column_id(&spec.id)?;
        }

        self.store.with_tx(|tx| {
            if let Some(existing) = current_board(tx)? {
                return Ok(existing);
            }

            let now = Utc::now();
            let board_id = ids::generate_task_id();
            tx.execute(
                "INSERT INTO boards (id, name, scorer, max_board_task_id, created_at, updated_at, created_by, updated_by)
                 VALUES (?1, ?2, ?3, 0, ?4, ?4, ?5, ?5)",
                params![board_id, config.name, config.scorer, now, actor],
            )?;

            for (index, spec) in config.columns.iter().enumerate() {
                insert_column(tx, &board_id, spec, index as i64, now, actor)?;
            }

            tracing::info!(board = %config.name, columns = config.columns.len(), "board initialized");
            current_board(tx)?.ok_or_else(|| Error::NotFound {
                entity: "board",
                id: board_id,
            })
        })
    }

    /// The board stored in this database.
    pub fn get_board(&self) -> Result<Board> {
        self.store.with_conn(|conn| {
            current_board(conn)?.ok_or_else(|| Error::NotFound {
                entity: "board",
                id: "(not initialized)".to_string(),
            })
        })
    }

    /// All columns ordered by position.
    pub fn get_columns(&self) -> Result<Vec<Column>> {
        self.store.with_conn(|conn| board_columns(conn))
    }

    /// Resolve a column by id, falling back to a case-insensitive name match.
    pub fn get_column(&self, id_or_name: &str) -> Result<Column> {
        self.store.with_conn(|conn| column_by_ref(conn, id_or_name))
    }

    /// The first terminal column of the board.
    pub fn get_terminal_column(&self) -> Result<Column> {
        self.store.with_conn(|conn| {
            conn.query_row(
                &format!("{COLUMN_SELECT} WHERE is_terminal = 1 ORDER BY position LIMIT 1"),
                [],
                column_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound {
                entity: "column",
                id: "(terminal)".to_string(),
            })
        })
    }

    /// Select the scorer used to rank this board's backlog.
    pub fn set_scorer(&self, name: &str, actor: &str) -> Result<Board> {
        if !scoring::is_known_scorer(name) {
            return Err(Error::validation(
                "scorer",
                format!(
                    "unknown scorer '{name}' (expected one of: {})",
                    scoring::BUILTIN_SCORER_NAMES.join(", ")
                ),
            ));
        }

        self.store.with_tx(|tx| {
            let board = current_board(tx)?.ok_or_else(|| Error::NotFound {
                entity: "board",
                id: "(not initialized)".to_string(),
            })?;
            tx.execute(
                "UPDATE boards SET scorer = ?1, updated_at = ?2, updated_by = ?3 WHERE id = ?4",
                params![name, Utc::now(), actor, board.id],
            )?;
            current_board(tx)?.ok_or_else(|| Error::NotFound {
                entity: "board",
                id: board.id,
            })
        })
    }
}

const BOARD_SELECT: &str = "SELECT id, name, scorer, max_board_task_id, created_at, updated_at, \
                            created_by, updated_by FROM boards";

const COLUMN_SELECT: &str = "SELECT id, board_id, name, position, wip_limit, is_terminal, \
                             created_at, updated_at, created_by, updated_by FROM columns";

fn board_from_row(row: &Row) -> rusqlite::Result<Board> {
    Ok(Board {
        id: row.get(0)?,
        name: row.get(1)?,
        scorer: row.get(2)?,
        max_board_task_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        created_by: row.get(6)?,
        updated_by: row.get(7)?,
    })
}

fn column_from_row(row: &Row) -> rusqlite::Result<Column> {
    Ok(Column {
        id: row.get(0)?,
        board_id: row.get(1)?,
        name: row.get(2)?,
        position: row.get(3)?,
        wip_limit: row.get(4)?,
        is_terminal: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        created_by: row.get(8)?,
        updated_by: row.get(9)?,
    })
}

/// The single board of this database, if initialized.
pub(crate) fn current_board(conn: &Connection) -> Result<Option<Board>> {
    Ok(conn
        .query_row(
            &format!("{BOARD_SELECT} ORDER BY created_at LIMIT 1"),
            [],
            board_from_row,
        )
        .optional()?)
}

/// All columns ordered by position.
pub(crate) fn board_columns(conn: &Connection) -> Result<Vec<Column>> {
    let mut stmt = conn.prepare(&format!("{COLUMN_SELECT} ORDER BY position"))?;
    let columns = stmt
        .query_map([], column_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

/// Resolve a column by id or case-insensitive display name.
pub(crate) fn column_by_ref(conn: &Connection, id_or_name: &str) -> Result<Column> {
    let by_id = conn
        .query_row(
            &format!("{COLUMN_SELECT} WHERE id = ?1"),
            params![id_or_name],
            column_from_row,
        )
        .optional()?;
    if let Some(column) = by_id {
        return Ok(column);
    }

    let matches: Vec<Column> = {
        let mut stmt =
            conn.prepare(&format!("{COLUMN_SELECT} WHERE name = ?1 COLLATE NOCASE"))?;
        let rows = stmt
            .query_map(params![id_or_name], column_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };
    match matches.len() {
        0 => Err(Error::NotFound {
            entity: "column",
            id: id_or_name.to_string(),
        }),
        1 => Ok(matches.into_iter().next().expect("one match")),
        _ => Err(Error::AmbiguousId {
            input: id_or_name.to_string(),
            matches: matches.into_iter().map(|c| c.id).collect(),
        }),
    }
}

pub(crate) fn insert_column(
    conn: &Connection,
    board_id: &str,
    spec: &ColumnSpec,
    position: i64,
    now: DateTime<Utc>,
    actor: &str,
) -> Result<()> {
    if let Some(limit) = spec.wip_limit {
        if limit <= 0 {
            return Err(Error::validation(
                "wip_limit",
                format!("WIP limit for '{}' must be positive", spec.id),
            ));
        }
    }
    conn.execute(
        "INSERT INTO columns (id, board_id, name, position, wip_limit, is_terminal, created_at, updated_at, created_by, updated_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8, ?8)",
        params![
            spec.id,
            board_id,
            spec.name,
            position,
            spec.wip_limit,
            spec.is_terminal,
            now,
            actor
        ],
    )?;
    Ok(())
}
