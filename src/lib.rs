//! kaban - Collaborative Kanban Core Engine
//!
//! This library provides the core engine behind the kaban board: a
//! local-first, SQLite-backed task board shared by human users and AI code
//! agents working in the same repository. CLI, TUI, and MCP front-ends are
//! thin consumers of the service APIs exposed here.
//!
//! # Core Concepts
//!
//! - **Board/Columns/Tasks**: one board per database; tasks carry a global
//!   sortable id plus a never-reused per-board short id (`#N`)
//! - **Audit log**: populated by database triggers inside the mutating
//!   transaction, never by application code
//! - **Dependency graph**: `blocks`/`blocked_by` mirror pairs with cycle
//!   rejection, `related` stored symmetrically
//! - **Scoring**: pluggable, deterministic urgency scorers for ranking the
//!   backlog
//! - **Markdown codec**: Taskell-compatible export/import that round-trips
//!
//! # Module Organization
//!
//! - `store`: SQLite access, WAL setup, busy retry, transactions
//! - `migrations`: ordered schema scripts, including the audit triggers
//! - `board`: board and column service
//! - `task`: task CRUD, moves, archival, id resolution
//! - `links`: dependency graph and cycle detection
//! - `audit`: queries over the trigger-populated log
//! - `scoring`: scorer registry and ranking
//! - `markdown`: Taskell-compatible codec plus export/import
//! - `error`: error types, exit codes, JSON envelope
//! - `validate` / `dates` / `ids` / `actor` / `config`: shared plumbing

pub mod actor;
pub mod audit;
pub mod board;
pub mod config;
pub mod dates;
pub mod error;
pub mod ids;
pub mod links;
pub mod markdown;
pub mod migrations;
pub mod scoring;
pub mod store;
pub mod task;
pub mod validate;

pub use error::{Error, Result};
pub use store::Store;
