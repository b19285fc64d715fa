//! Task dependency graph.
//!
//! Links are directed edges kept in mirror pairs: `blocks(A, B)` always
//! coexists with `blocked_by(B, A)`, and `related` is stored in both
//! directions so either endpoint sees it. Acyclicity is enforced over the
//! `blocked_by` sub-graph; the mirror edges carry no extra information.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::store::Store;
use crate::task::{self, task_from_row, Task, TASK_SELECT};

/// Direction and meaning of a task link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Blocks,
    BlockedBy,
    Related,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Blocks => "blocks",
            LinkType::BlockedBy => "blocked_by",
            LinkType::Related => "related",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "blocks" => Ok(LinkType::Blocks),
            "blocked_by" => Ok(LinkType::BlockedBy),
            "related" => Ok(LinkType::Related),
            other => Err(Error::validation(
                "link_type",
                format!("unknown link type '{other}' (expected blocks, blocked_by, related)"),
            )),
        }
    }
}

/// All links of one task, grouped by type
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskLinks {
    pub blocks: Vec<String>,
    pub blocked_by: Vec<String>,
    pub related: Vec<String>,
}

/// Dependency graph operations
#[derive(Debug, Clone)]
pub struct LinkService {
    store: Arc<Store>,
}

impl LinkService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Create a link between two tasks (any accepted id form).
    ///
    /// The cycle check and the insert share one transaction, so no racing
    /// writer can sneak a second edge past the check.
    pub fn create_link(&self, from: &str, to: &str, link_type: LinkType) -> Result<()> {
        self.store.with_tx(|tx| {
            let from_id = resolve(tx, from)?;
            let to_id = resolve(tx, to)?;
            create_link(tx, &from_id, &to_id, link_type)
        })
    }

    /// Remove a link and its mirror.
    pub fn remove_link(&self, from: &str, to: &str, link_type: LinkType) -> Result<()> {
        self.store.with_tx(|tx| {
            let from_id = resolve(tx, from)?;
            let to_id = resolve(tx, to)?;
            remove_link(tx, &from_id, &to_id, link_type)
        })
    }

    /// All links of a task grouped by type.
    pub fn get_links(&self, id: &str) -> Result<TaskLinks> {
        self.store.with_conn(|conn| {
            let task_id = resolve(conn, id)?;
            let mut stmt = conn.prepare(
                "SELECT to_task_id, link_type FROM task_links \
                 WHERE from_task_id = ?1 ORDER BY created_at, to_task_id",
            )?;
            let rows = stmt
                .query_map(params![task_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut links = TaskLinks::default();
            for (target, kind) in rows {
                match kind.as_str() {
                    "blocks" => links.blocks.push(target),
                    "blocked_by" => links.blocked_by.push(target),
                    _ => links.related.push(target),
                }
            }
            Ok(links)
        })
    }

    /// Incomplete, non-archived tasks that currently block the given task.
    pub fn get_blockers(&self, id: &str) -> Result<Vec<Task>> {
        self.store.with_conn(|conn| {
            let task_id = resolve(conn, id)?;
            open_blockers(conn, &task_id)
        })
    }

    /// True when at least one blocker is neither completed nor archived.
    pub fn is_blocked(&self, id: &str) -> Result<bool> {
        Ok(!self.get_blockers(id)?.is_empty())
    }

    /// Number of open tasks the given task currently blocks.
    pub fn blocking_count(&self, id: &str) -> Result<usize> {
        self.store.with_conn(|conn| {
            let task_id = resolve(conn, id)?;
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM task_links l JOIN tasks t ON t.id = l.from_task_id \
                 WHERE l.to_task_id = ?1 AND l.link_type = 'blocked_by' \
                 AND t.completed_at IS NULL AND t.archived = 0",
                params![task_id],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }
}

fn resolve(conn: &Connection, id: &str) -> Result<String> {
    task::resolve_task_id(conn, id)?.ok_or_else(|| Error::NotFound {
        entity: "task",
        id: id.to_string(),
    })
}

/// Insert a link (and its mirror) in the caller's transaction.
pub(crate) fn create_link(
    conn: &Connection,
    from_id: &str,
    to_id: &str,
    link_type: LinkType,
) -> Result<()> {
    if from_id == to_id {
        let short = short_ids(conn, &[from_id.to_string(), from_id.to_string()])?;
        return Err(Error::Cycle { path: short });
    }

    let exists = conn
        .query_row(
            "SELECT 1 FROM task_links WHERE from_task_id = ?1 AND to_task_id = ?2 AND link_type = ?3",
            params![from_id, to_id, link_type.as_str()],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if exists {
        return Err(Error::DuplicateLink {
            from: from_id.to_string(),
            to: to_id.to_string(),
            link_type: link_type.as_str().to_string(),
        });
    }

    let now = Utc::now();
    match link_type {
        LinkType::BlockedBy => {
            ensure_acyclic(conn, from_id, to_id)?;
            insert_edge(conn, from_id, to_id, "blocked_by", now)?;
            insert_edge(conn, to_id, from_id, "blocks", now)?;
        }
        LinkType::Blocks => {
            ensure_acyclic(conn, to_id, from_id)?;
            insert_edge(conn, from_id, to_id, "blocks", now)?;
            insert_edge(conn, to_id, from_id, "blocked_by", now)?;
        }
        LinkType::Related => {
            insert_edge(conn, from_id, to_id, "related", now)?;
            insert_edge(conn, to_id, from_id, "related", now)?;
        }
    }
    Ok(())
}

/// Delete a link and its mirror in the caller's transaction.
pub(crate) fn remove_link(
    conn: &Connection,
    from_id: &str,
    to_id: &str,
    link_type: LinkType,
) -> Result<()> {
    let (forward, backward) = match link_type {
        LinkType::BlockedBy => ("blocked_by", "blocks"),
        LinkType::Blocks => ("blocks", "blocked_by"),
        LinkType::Related => ("related", "related"),
    };

    let removed = conn.execute(
        "DELETE FROM task_links WHERE from_task_id = ?1 AND to_task_id = ?2 AND link_type = ?3",
        params![from_id, to_id, forward],
    )?;
    if removed == 0 {
        return Err(Error::NotFound {
            entity: "link",
            id: format!("{from_id} {forward} {to_id}"),
        });
    }
    conn.execute(
        "DELETE FROM task_links WHERE from_task_id = ?1 AND to_task_id = ?2 AND link_type = ?3",
        params![to_id, from_id, backward],
    )?;
    Ok(())
}

/// Reject the candidate edge `blocked_by(a, b)` when `a` is reachable from
/// `b` over the current `blocked_by` edges.
///
/// Depth-first over the live graph, read fresh inside the transaction that
/// will insert the edge. O(V+E), no caching.
fn ensure_acyclic(conn: &Connection, a: &str, b: &str) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT to_task_id FROM task_links WHERE from_task_id = ?1 AND link_type = 'blocked_by'",
    )?;

    let mut visited: HashSet<String> = HashSet::new();
    let mut came_from: HashMap<String, String> = HashMap::new();
    let mut stack = vec![b.to_string()];

    while let Some(current) = stack.pop() {
        if current == a {
            // a <- ... <- b chain, rendered a -> b -> ... -> a.
            let mut chain = vec![a.to_string()];
            let mut node = a.to_string();
            while node != b {
                node = came_from[&node].clone();
                chain.push(node.clone());
            }
            chain.reverse();
            let mut path = vec![a.to_string()];
            path.extend(chain);
            return Err(Error::Cycle {
                path: short_ids(conn, &path)?,
            });
        }
        if !visited.insert(current.clone()) {
            continue;
        }

        let neighbours = stmt
            .query_map(params![current], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for next in neighbours {
            if !visited.contains(&next) {
                came_from.entry(next.clone()).or_insert_with(|| current.clone());
                stack.push(next);
            }
        }
    }

    Ok(())
}

fn insert_edge(
    conn: &Connection,
    from_id: &str,
    to_id: &str,
    link_type: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO task_links (from_task_id, to_task_id, link_type, created_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![from_id, to_id, link_type, now],
    )?;
    Ok(())
}

/// Blockers of a task that are neither completed nor archived.
pub(crate) fn open_blockers(conn: &Connection, task_id: &str) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "{TASK_SELECT} WHERE id IN (SELECT to_task_id FROM task_links \
         WHERE from_task_id = ?1 AND link_type = 'blocked_by') \
         AND completed_at IS NULL AND archived = 0 \
         ORDER BY board_task_id"
    ))?;
    let tasks = stmt
        .query_map(params![task_id], task_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

/// Render a path of global ids as board short ids.
fn short_ids(conn: &Connection, path: &[String]) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT board_task_id FROM tasks WHERE id = ?1")?;
    path.iter()
        .map(|id| {
            let short: i64 = stmt.query_row(params![id], |row: &Row| row.get(0))?;
            Ok(format!("#{short}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_type_names_round_trip() {
        for kind in [LinkType::Blocks, LinkType::BlockedBy, LinkType::Related] {
            assert_eq!(LinkType::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(LinkType::parse("friends_with").is_err());
    }
}
