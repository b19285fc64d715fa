//! Actor identity resolution.
//!
//! Actor resolution order:
//! 1) Explicit value from the caller (CLI flag, MCP parameter)
//! 2) KABAN_AGENT environment variable
//! 3) Default of "user"
//!
//! The resolved actor string is stamped into `created_by`/`updated_by` on
//! every mutating statement so the audit triggers can attribute changes.

/// Environment variable consulted when no actor is supplied.
pub const AGENT_ENV: &str = "KABAN_AGENT";

/// Actor recorded when nothing else is known.
pub const DEFAULT_ACTOR: &str = "user";

/// Resolve the current actor from an explicit value, the environment, or
/// the default.
pub fn resolve_actor(explicit: Option<&str>) -> String {
    if let Some(actor) = non_empty(explicit) {
        return actor.to_string();
    }

    if let Ok(env_actor) = std::env::var(AGENT_ENV) {
        if let Some(actor) = non_empty(Some(env_actor.as_str())) {
            return actor.to_string();
        }
    }

    DEFAULT_ACTOR.to_string()
}

fn non_empty(input: Option<&str>) -> Option<&str> {
    input.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}
