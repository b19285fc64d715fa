//! Taskell-compatible Markdown codec.
//!
//! A board serialises to a document of the shape:
//!
//! ```text
//! # Board name
//!
//! ## Column name
//! <!-- WIP Limit: 3 -->
//!
//! - Task title <!-- id:01HX... -->
//!     @ 2024-06-15 ✓
//!     # label, other-label
//!     @ assigned: claude
//!     > description line
//! ```
//!
//! Backslashes are doubled and a literal `<!--` becomes `\<!--` so the
//! metadata comments stay unambiguous. The parser is line-oriented and
//! single-pass; unknown indented lines are ignored, bad dates produce
//! non-fatal line-numbered errors.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::board::{current_board, insert_column, Column};
use crate::config::ColumnSpec;
use crate::dates::format_date;
use crate::error::{Error, Result};
use crate::ids;
use crate::store::Store;
use crate::task::{insert_task, next_position, resolve_task_id, tasks_by_column, NewTask, Task};

/// Indent prefix for task sub-lines
const INDENT: &str = "    ";

/// Marker appended to the due-date line of completed tasks
const DONE_MARK: &str = "\u{2713}";

/// Options controlling serialisation
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    /// Emit `<!-- id:... -->` trailers so identities survive a round trip
    pub include_metadata: bool,
    /// Include archived tasks
    pub include_archived: bool,
}

/// Parsed form of a whole document
#[derive(Debug, Clone, Serialize)]
pub struct ParsedDocument {
    pub board_name: String,
    pub columns: Vec<ParsedColumn>,
    /// Non-fatal problems encountered while parsing
    pub errors: Vec<ParseIssue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParsedColumn {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wip_limit: Option<i64>,
    pub is_terminal: bool,
    pub tasks: Vec<ParsedTask>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParsedTask {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub completed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A non-fatal parse problem with its 1-based line number
#[derive(Debug, Clone, Serialize)]
pub struct ParseIssue {
    pub line: usize,
    pub message: String,
}

/// Outcome of [`import_markdown`]
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub board_name: String,
    pub columns_created: usize,
    pub tasks_created: usize,
    pub tasks_updated: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ParseIssue>,
}

// ---------------------------------------------------------------------------
// Serialisation
// ---------------------------------------------------------------------------

/// Render a board to Markdown. Tasks are sorted by position then id;
/// archived tasks are skipped unless requested.
pub fn serialize_document(
    board_name: &str,
    sections: &[(Column, Vec<Task>)],
    opts: &ExportOptions,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n", escape(board_name)));

    for (column, tasks) in sections {
        out.push('\n');
        out.push_str(&format!("## {}\n", escape(&column.name)));
        if let Some(limit) = column.wip_limit {
            out.push_str(&format!("<!-- WIP Limit: {limit} -->\n"));
        }
        if column.is_terminal {
            out.push_str("<!-- Terminal column -->\n");
        }
        out.push('\n');

        let mut ordered: Vec<&Task> = tasks
            .iter()
            .filter(|task| opts.include_archived || !task.archived)
            .collect();
        ordered.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));

        for task in ordered {
            serialize_task(&mut out, task, opts);
        }
    }

    out
}

fn serialize_task(out: &mut String, task: &Task, opts: &ExportOptions) {
    out.push_str(&format!("- {}", escape(&task.title)));
    if opts.include_metadata {
        out.push_str(&format!(" <!-- id:{} -->", task.id));
    }
    out.push('\n');

    let completed = task.completed_at.is_some();
    match (task.due_date, completed) {
        (Some(due), true) => out.push_str(&format!("{INDENT}@ {} {DONE_MARK}\n", format_date(due))),
        (Some(due), false) => out.push_str(&format!("{INDENT}@ {}\n", format_date(due))),
        (None, true) => out.push_str(&format!("{INDENT}@ {DONE_MARK}\n")),
        (None, false) => {}
    }

    if !task.labels.is_empty() {
        out.push_str(&format!("{INDENT}# {}\n", task.labels.join(", ")));
    }
    if let Some(assigned) = &task.assigned_to {
        out.push_str(&format!("{INDENT}@ assigned: {assigned}\n"));
    }
    if let Some(description) = &task.description {
        for line in description.lines() {
            out.push_str(&format!("{INDENT}> {}\n", escape(line)));
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace("<!--", "\\<!--")
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.peek() {
                Some('\\') => {
                    out.push('\\');
                    chars.next();
                }
                Some('<') => {
                    out.push('<');
                    chars.next();
                }
                _ => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a document. Never fails outright: structural problems are
/// recorded in `errors` and parsing continues.
pub fn parse_document(input: &str) -> ParsedDocument {
    let mut doc = ParsedDocument {
        board_name: String::new(),
        columns: Vec::new(),
        errors: Vec::new(),
    };

    for (index, raw_line) in input.lines().enumerate() {
        let line_no = index + 1;

        if let Some(rest) = raw_line.strip_prefix(INDENT) {
            parse_subline(&mut doc, rest, line_no);
            continue;
        }

        let line = raw_line.trim_end();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("## ") {
            doc.columns.push(ParsedColumn {
                name: unescape(rest.trim()),
                wip_limit: None,
                is_terminal: false,
                tasks: Vec::new(),
            });
        } else if let Some(rest) = line.strip_prefix("# ") {
            if doc.board_name.is_empty() {
                doc.board_name = unescape(rest.trim());
            } else {
                doc.errors.push(ParseIssue {
                    line: line_no,
                    message: "duplicate board header".to_string(),
                });
            }
        } else if let Some(rest) = line.strip_prefix("- ") {
            let Some(column) = doc.columns.last_mut() else {
                doc.errors.push(ParseIssue {
                    line: line_no,
                    message: "task before any column header".to_string(),
                });
                continue;
            };
            column.tasks.push(parse_task_line(rest));
        } else if let Some(comment) = parse_comment(line) {
            let Some(column) = doc.columns.last_mut() else {
                continue;
            };
            if let Some(value) = comment.strip_prefix("WIP Limit:") {
                match value.trim().parse::<i64>() {
                    Ok(limit) if limit > 0 => column.wip_limit = Some(limit),
                    _ => doc.errors.push(ParseIssue {
                        line: line_no,
                        message: format!("invalid WIP limit '{}'", value.trim()),
                    }),
                }
            } else if comment == "Terminal column" {
                column.is_terminal = true;
            }
        }
        // Anything else at column scope is ignored.
    }

    doc
}

fn parse_comment(line: &str) -> Option<&str> {
    line.strip_prefix("<!--")
        .and_then(|rest| rest.strip_suffix("-->"))
        .map(str::trim)
}

fn parse_task_line(rest: &str) -> ParsedTask {
    let mut title_part = rest.trim_end();
    let mut id = None;

    // The id trailer is raw; an escaped title yields "\<!--" instead.
    if let Some(pos) = title_part.rfind("<!-- id:") {
        if !title_part[..pos].ends_with('\\') {
            let trailer = &title_part[pos..];
            if let Some(value) = parse_comment(trailer).and_then(|c| c.strip_prefix("id:")) {
                id = Some(value.trim().to_string());
                title_part = title_part[..pos].trim_end();
            }
        }
    }

    ParsedTask {
        title: unescape(title_part),
        id,
        due_date: None,
        completed: false,
        labels: Vec::new(),
        assigned_to: None,
        description: None,
    }
}

fn parse_subline(doc: &mut ParsedDocument, rest: &str, line_no: usize) {
    let Some(task) = doc
        .columns
        .last_mut()
        .and_then(|column| column.tasks.last_mut())
    else {
        doc.errors.push(ParseIssue {
            line: line_no,
            message: "indented line outside a task".to_string(),
        });
        return;
    };

    let rest = rest.trim_end();
    if let Some(assigned) = rest.strip_prefix("@ assigned:") {
        task.assigned_to = Some(assigned.trim().to_string());
    } else if let Some(value) = rest.strip_prefix("@ ") {
        for token in value.split_whitespace() {
            if token == DONE_MARK {
                task.completed = true;
            } else {
                match NaiveDate::parse_from_str(token, "%Y-%m-%d") {
                    Ok(date) => {
                        task.due_date = Some(
                            Utc.from_utc_datetime(
                                &date.and_hms_opt(0, 0, 0).expect("midnight is valid"),
                            ),
                        );
                    }
                    Err(_) => doc.errors.push(ParseIssue {
                        line: line_no,
                        message: format!("date '{token}' does not match YYYY-MM-DD"),
                    }),
                }
            }
        }
    } else if let Some(labels) = rest.strip_prefix("# ") {
        task.labels = labels
            .split(',')
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .collect();
    } else if let Some(line) = rest.strip_prefix("> ") {
        push_description_line(task, &unescape(line));
    } else if rest == ">" {
        push_description_line(task, "");
    }
    // Unknown sub-lines are ignored but not fatal.
}

fn push_description_line(task: &mut ParsedTask, line: &str) {
    match &mut task.description {
        Some(description) => {
            description.push('\n');
            description.push_str(line);
        }
        None => task.description = Some(line.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Store-backed export / import
// ---------------------------------------------------------------------------

/// Export the whole board as a Markdown document.
pub fn export_markdown(store: &Store, opts: &ExportOptions) -> Result<String> {
    store.with_conn(|conn| {
        let board = current_board(conn)?.ok_or_else(|| Error::NotFound {
            entity: "board",
            id: "(not initialized)".to_string(),
        })?;
        let sections = tasks_by_column(conn, opts.include_archived)?;
        Ok(serialize_document(&board.name, &sections, opts))
    })
}

/// Import a Markdown document in one transaction.
///
/// Columns are matched by name (case-insensitive) and created when
/// missing; tasks carrying a known `<!-- id:... -->` are updated in place,
/// everything else is created. Partial failure leaves no trace.
pub fn import_markdown(store: &Store, document: &str, actor: &str) -> Result<ImportReport> {
    let parsed = parse_document(document);
    if parsed.board_name.is_empty() && parsed.columns.is_empty() {
        return Err(Error::validation(
            "document",
            "not a board document (no `#` header or `##` columns)",
        ));
    }

    store.with_tx(|tx| {
        let mut report = ImportReport {
            board_name: parsed.board_name.clone(),
            columns_created: 0,
            tasks_created: 0,
            tasks_updated: 0,
            errors: parsed.errors.clone(),
        };

        let board = match current_board(tx)? {
            Some(board) => board,
            None => {
                let now = Utc::now();
                let board_id = ids::generate_task_id();
                let name = if parsed.board_name.is_empty() {
                    "Imported board".to_string()
                } else {
                    parsed.board_name.clone()
                };
                tx.execute(
                    "INSERT INTO boards (id, name, max_board_task_id, created_at, updated_at, created_by, updated_by)
                     VALUES (?1, ?2, 0, ?3, ?3, ?4, ?4)",
                    rusqlite::params![board_id, name, now, actor],
                )?;
                current_board(tx)?.expect("board just inserted")
            }
        };

        for parsed_column in &parsed.columns {
            let column = match find_column_by_name(tx, &parsed_column.name)? {
                Some(column) => column,
                None => {
                    let spec = ColumnSpec {
                        id: slugify(&parsed_column.name),
                        name: parsed_column.name.clone(),
                        wip_limit: parsed_column.wip_limit,
                        is_terminal: parsed_column.is_terminal,
                    };
                    let position: i64 = tx.query_row(
                        "SELECT COALESCE(MAX(position) + 1, 0) FROM columns WHERE board_id = ?1",
                        rusqlite::params![board.id],
                        |row| row.get(0),
                    )?;
                    insert_column(tx, &board.id, &spec, position, Utc::now(), actor)?;
                    report.columns_created += 1;
                    find_column_by_name(tx, &parsed_column.name)?.expect("column just inserted")
                }
            };

            for parsed_task in &parsed_column.tasks {
                let existing = match &parsed_task.id {
                    Some(id) => resolve_task_id(tx, id)?,
                    None => None,
                };
                match existing {
                    Some(task_id) => {
                        update_imported_task(tx, &task_id, &column, parsed_task, actor)?;
                        report.tasks_updated += 1;
                    }
                    None => {
                        create_imported_task(tx, &column, parsed_task, actor)?;
                        report.tasks_created += 1;
                    }
                }
            }
        }

        tracing::info!(
            created = report.tasks_created,
            updated = report.tasks_updated,
            "markdown import applied"
        );
        Ok(report)
    })
}

fn find_column_by_name(conn: &rusqlite::Connection, name: &str) -> Result<Option<Column>> {
    match crate::board::column_by_ref(conn, name) {
        Ok(column) => Ok(Some(column)),
        Err(Error::NotFound { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

fn create_imported_task(
    conn: &rusqlite::Connection,
    column: &Column,
    parsed: &ParsedTask,
    actor: &str,
) -> Result<()> {
    let input = NewTask {
        id: parsed.id.clone(),
        title: parsed.title.clone(),
        description: parsed.description.clone(),
        column: Some(column.id.clone()),
        assigned_to: parsed.assigned_to.clone(),
        labels: parsed.labels.clone(),
        due_date: parsed.due_date,
        ..NewTask::default()
    };
    let task = insert_task(conn, &input, actor)?;
    if column.is_terminal {
        conn.execute(
            "UPDATE tasks SET completed_at = ?1 WHERE id = ?2",
            rusqlite::params![Utc::now(), task.id],
        )?;
    }
    Ok(())
}

fn update_imported_task(
    conn: &rusqlite::Connection,
    task_id: &str,
    column: &Column,
    parsed: &ParsedTask,
    actor: &str,
) -> Result<()> {
    let position: i64 = conn.query_row(
        "SELECT CASE WHEN column_id = ?1 THEN position ELSE ?2 END FROM tasks WHERE id = ?3",
        rusqlite::params![column.id, next_position(conn, &column.id)?, task_id],
        |row| row.get(0),
    )?;
    let completed_at = if column.is_terminal {
        Some(Utc::now())
    } else {
        None
    };
    conn.execute(
        "UPDATE tasks SET title = ?1, description = ?2, labels = ?3, due_date = ?4,
                assigned_to = ?5, column_id = ?6, position = ?7,
                completed_at = COALESCE(completed_at, ?8),
                version = version + 1, updated_at = ?9, updated_by = ?10
         WHERE id = ?11",
        rusqlite::params![
            parsed.title,
            parsed.description,
            serde_json::to_string(&parsed.labels)?,
            parsed.due_date,
            parsed.assigned_to,
            column.id,
            position,
            completed_at,
            Utc::now(),
            actor,
            task_id,
        ],
    )?;
    Ok(())
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_sep = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("column");
    }
    slug
}
