//! Error types for the kaban core engine
//!
//! Exit codes are part of the external contract:
//! - 1: General failure (SQL, serialization, cancelled statements)
//! - 2: Object not found
//! - 3: Version conflict
//! - 4: Validation failure (bad input, WIP limit)
//! - 5: Move blocked by unresolved blockers
//! - 6: Dependency cycle
//! - 7: Duplicate link
//! - 8: Ambiguous id prefix
//! - 9: IO / store-level failure

use serde::Serialize;
use thiserror::Error;

/// Exit codes for kaban front-ends
pub mod exit_codes {
    pub const GENERAL: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const CONFLICT: i32 = 3;
    pub const VALIDATION: i32 = 4;
    pub const BLOCKED: i32 = 5;
    pub const CYCLE: i32 = 6;
    pub const DUPLICATE: i32 = 7;
    pub const AMBIGUOUS_ID: i32 = 8;
    pub const IO: i32 = 9;
}

/// Main error type for kaban operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("version conflict on task {id}: expected {expected}, found {found}")]
    Conflict {
        id: String,
        expected: i64,
        found: i64,
    },

    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("Column '{column}' at WIP limit ({count}/{limit})")]
    WipLimitReached {
        column: String,
        count: i64,
        limit: i64,
    },

    #[error("task {id} is blocked by: {}", .blockers.join(", "))]
    Blocked { id: String, blockers: Vec<String> },

    #[error("dependency cycle detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("link already exists: {from} {link_type} {to}")]
    DuplicateLink {
        from: String,
        to: String,
        link_type: String,
    },

    #[error("ambiguous id '{input}': {}", .matches.join(", "))]
    AmbiguousId {
        input: String,
        matches: Vec<String>,
    },

    #[error("failed to open store at {path}: {message}")]
    StoreOpen { path: String, message: String },

    #[error("migration {name} failed: {message}")]
    Migration { name: String, message: String },

    #[error("database busy after retries")]
    BusyAfterRetry,

    #[error("operation cancelled")]
    Cancelled,

    #[error("sqlite error: {0}")]
    Sql(rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NotFound { .. } => exit_codes::NOT_FOUND,
            Error::Conflict { .. } => exit_codes::CONFLICT,
            Error::Validation { .. } | Error::WipLimitReached { .. } => exit_codes::VALIDATION,
            Error::Blocked { .. } => exit_codes::BLOCKED,
            Error::Cycle { .. } => exit_codes::CYCLE,
            Error::DuplicateLink { .. } => exit_codes::DUPLICATE,
            Error::AmbiguousId { .. } => exit_codes::AMBIGUOUS_ID,
            Error::StoreOpen { .. } | Error::Migration { .. } | Error::BusyAfterRetry => {
                exit_codes::IO
            }
            Error::Io(_) => exit_codes::IO,
            Error::Cancelled | Error::Sql(_) | Error::Json(_) => exit_codes::GENERAL,
        }
    }

    /// Shorthand for a validation error on a named field.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            field,
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, _) = &err {
            if failure.code == rusqlite::ErrorCode::OperationInterrupted {
                return Error::Cancelled;
            }
        }
        Error::Sql(err)
    }
}

/// Result type alias for kaban operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in the JSON envelope format
///
/// Serializes as `{"success": false, "error": {"code": N, "message": "..."}}`.
#[derive(Debug, Serialize)]
pub struct JsonError {
    pub success: bool,
    pub error: JsonErrorBody,
}

#[derive(Debug, Serialize)]
pub struct JsonErrorBody {
    pub code: i32,
    pub message: String,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        Self {
            success: false,
            error: JsonErrorBody {
                code: err.exit_code(),
                message: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_stable() {
        let not_found = Error::NotFound {
            entity: "task",
            id: "x".to_string(),
        };
        assert_eq!(not_found.exit_code(), 2);

        let cycle = Error::Cycle {
            path: vec!["#3".to_string(), "#1".to_string(), "#3".to_string()],
        };
        assert_eq!(cycle.exit_code(), 6);

        let wip = Error::WipLimitReached {
            column: "In Progress".to_string(),
            count: 3,
            limit: 3,
        };
        assert_eq!(wip.exit_code(), 4);
        assert_eq!(wip.to_string(), "Column 'In Progress' at WIP limit (3/3)");
    }

    #[test]
    fn cycle_message_renders_path() {
        let err = Error::Cycle {
            path: vec![
                "#3".to_string(),
                "#1".to_string(),
                "#2".to_string(),
                "#3".to_string(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "dependency cycle detected: #3 -> #1 -> #2 -> #3"
        );
    }

    #[test]
    fn json_envelope_shape() {
        let err = Error::NotFound {
            entity: "task",
            id: "42".to_string(),
        };
        let json = serde_json::to_value(JsonError::from(&err)).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], 2);
    }
}
