//! Audit log queries.
//!
//! The log itself is populated by database triggers (see the
//! `0003_audit_triggers` migration); this service only reads it. Because
//! the triggers run inside the transaction of the originating statement, a
//! failed operation leaves no audit trace.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Row, ToSql};
use serde::Serialize;

use crate::error::Result;
use crate::store::Store;

/// Hard ceiling on page size
pub const MAX_HISTORY_LIMIT: usize = 1000;

/// Default page size when the filter does not set one
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Number of actors reported by [`AuditService::get_stats`]
const RECENT_ACTOR_COUNT: usize = 10;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEvent {
    Create,
    Update,
    Delete,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::Create => "CREATE",
            AuditEvent::Update => "UPDATE",
            AuditEvent::Delete => "DELETE",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "CREATE" => Some(AuditEvent::Create),
            "UPDATE" => Some(AuditEvent::Update),
            "DELETE" => Some(AuditEvent::Delete),
            _ => None,
        }
    }
}

/// What kind of object it happened to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditObject {
    Task,
    Column,
    Board,
}

impl AuditObject {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditObject::Task => "task",
            AuditObject::Column => "column",
            AuditObject::Board => "board",
        }
    }
}

/// One append-only audit row
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEvent,
    pub object_type: String,
    pub object_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

impl AuditEntry {
    /// Actor, with unattributed rows surfaced as "unknown".
    pub fn actor_or_unknown(&self) -> &str {
        self.actor.as_deref().unwrap_or("unknown")
    }
}

/// Filter for [`AuditService::get_history`]
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub object_type: Option<AuditObject>,
    pub object_id: Option<String>,
    pub event_type: Option<AuditEvent>,
    pub actor: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Page size, clamped to [`MAX_HISTORY_LIMIT`]
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// One page of history, newest first
#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    /// Matching rows before limit/offset were applied
    pub total: usize,
    pub has_more: bool,
}

/// Aggregate counts over the whole log
#[derive(Debug, Clone, Serialize)]
pub struct AuditStats {
    pub total_entries: usize,
    pub by_event: BTreeMap<String, usize>,
    pub by_object: BTreeMap<String, usize>,
    /// The 10 most recently active distinct actors, newest first
    pub recent_actors: Vec<String>,
}

/// Read-side API over the trigger-populated audit log
#[derive(Debug, Clone)]
pub struct AuditService {
    store: Arc<Store>,
}

impl AuditService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Query the log, newest first.
    pub fn get_history(&self, filter: &AuditFilter) -> Result<AuditPage> {
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .min(MAX_HISTORY_LIMIT);
        let offset = filter.offset.unwrap_or(0);

        self.store.with_conn(|conn| {
            let mut clauses: Vec<String> = Vec::new();
            let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

            if let Some(object_type) = filter.object_type {
                params_vec.push(Box::new(object_type.as_str().to_string()));
                clauses.push(format!("object_type = ?{}", params_vec.len()));
            }
            if let Some(object_id) = &filter.object_id {
                params_vec.push(Box::new(object_id.clone()));
                clauses.push(format!("object_id = ?{}", params_vec.len()));
            }
            if let Some(event_type) = filter.event_type {
                params_vec.push(Box::new(event_type.as_str().to_string()));
                clauses.push(format!("event_type = ?{}", params_vec.len()));
            }
            if let Some(actor) = &filter.actor {
                params_vec.push(Box::new(actor.clone()));
                clauses.push(format!("actor = ?{}", params_vec.len()));
            }
            // Bind bounds in the trigger's timestamp format so the string
            // comparison is exact.
            if let Some(since) = filter.since {
                params_vec.push(Box::new(format_bound(since)));
                clauses.push(format!("timestamp >= ?{}", params_vec.len()));
            }
            if let Some(until) = filter.until {
                params_vec.push(Box::new(format_bound(until)));
                clauses.push(format!("timestamp <= ?{}", params_vec.len()));
            }

            let where_sql = if clauses.is_empty() {
                String::new()
            } else {
                format!(" WHERE {}", clauses.join(" AND "))
            };

            let total: i64 = {
                let params_refs: Vec<&dyn ToSql> =
                    params_vec.iter().map(|p| p.as_ref()).collect();
                conn.query_row(
                    &format!("SELECT COUNT(*) FROM audit_log{where_sql}"),
                    params_refs.as_slice(),
                    |row| row.get(0),
                )?
            };

            // Over-fetch one row to learn whether another page exists.
            params_vec.push(Box::new((limit + 1) as i64));
            let limit_pos = params_vec.len();
            params_vec.push(Box::new(offset as i64));
            let offset_pos = params_vec.len();
            let sql = format!(
                "{ENTRY_SELECT}{where_sql} ORDER BY timestamp DESC, id DESC \
                 LIMIT ?{limit_pos} OFFSET ?{offset_pos}"
            );

            let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
            let mut stmt = conn.prepare(&sql)?;
            let mut entries = stmt
                .query_map(params_refs.as_slice(), entry_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let has_more = entries.len() > limit;
            entries.truncate(limit);

            Ok(AuditPage {
                entries,
                total: total as usize,
                has_more,
            })
        })
    }

    /// Full history of one task, oldest first.
    pub fn get_task_history(&self, task_id: &str) -> Result<Vec<AuditEntry>> {
        let page = self.get_history(&AuditFilter {
            object_type: Some(AuditObject::Task),
            object_id: Some(task_id.to_string()),
            limit: Some(MAX_HISTORY_LIMIT),
            ..AuditFilter::default()
        })?;
        let mut entries = page.entries;
        entries.reverse();
        Ok(entries)
    }

    /// The most recent changes across all objects.
    pub fn get_recent_changes(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        Ok(self
            .get_history(&AuditFilter {
                limit: Some(limit),
                ..AuditFilter::default()
            })?
            .entries)
    }

    /// Recent changes made by one actor.
    pub fn get_changes_by_actor(&self, actor: &str, limit: usize) -> Result<Vec<AuditEntry>> {
        Ok(self
            .get_history(&AuditFilter {
                actor: Some(actor.to_string()),
                limit: Some(limit),
                ..AuditFilter::default()
            })?
            .entries)
    }

    /// Aggregate statistics over the whole log.
    pub fn get_stats(&self) -> Result<AuditStats> {
        self.store.with_conn(|conn| {
            let total: i64 =
                conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?;

            let mut by_event = BTreeMap::new();
            let mut stmt =
                conn.prepare("SELECT event_type, COUNT(*) FROM audit_log GROUP BY event_type")?;
            for row in stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })? {
                let (event, count) = row?;
                by_event.insert(event, count as usize);
            }

            let mut by_object = BTreeMap::new();
            let mut stmt =
                conn.prepare("SELECT object_type, COUNT(*) FROM audit_log GROUP BY object_type")?;
            for row in stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })? {
                let (object, count) = row?;
                by_object.insert(object, count as usize);
            }

            let mut stmt = conn.prepare(
                "SELECT actor FROM audit_log WHERE actor IS NOT NULL \
                 GROUP BY actor ORDER BY MAX(id) DESC LIMIT ?1",
            )?;
            let recent_actors = stmt
                .query_map(params![RECENT_ACTOR_COUNT as i64], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;

            Ok(AuditStats {
                total_entries: total as usize,
                by_event,
                by_object,
                recent_actors,
            })
        })
    }
}

const ENTRY_SELECT: &str = "SELECT id, timestamp, event_type, object_type, object_id, \
                            field_name, old_value, new_value, actor FROM audit_log";

/// Render a bound in the same shape the audit trigger writes
/// (`strftime('%Y-%m-%dT%H:%M:%fZ')`).
fn format_bound(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn entry_from_row(row: &Row) -> rusqlite::Result<AuditEntry> {
    let event_raw: String = row.get(2)?;
    let event_type = AuditEvent::parse(&event_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown event type '{event_raw}'").into(),
        )
    })?;

    Ok(AuditEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        event_type,
        object_type: row.get(3)?,
        object_id: row.get(4)?,
        field_name: row.get(5)?,
        old_value: row.get(6)?,
        new_value: row.get(7)?,
        actor: row.get(8)?,
    })
}
