//! Input validators shared by the services.
//!
//! All validators run before any mutation so a failed call leaves the
//! database untouched.

use crate::error::{Error, Result};

/// Maximum title length in characters
pub const MAX_TITLE_LEN: usize = 200;

/// Maximum description length in characters
pub const MAX_DESCRIPTION_LEN: usize = 5000;

/// Maximum label length in characters
pub const MAX_LABEL_LEN: usize = 32;

/// Maximum agent name length in characters
pub const MAX_AGENT_LEN: usize = 64;

/// Validate a task title: non-empty, printable, no surrounding whitespace.
pub fn validate_title(title: &str) -> Result<()> {
    if title.is_empty() {
        return Err(Error::validation("title", "title cannot be empty"));
    }
    if title.trim() != title {
        return Err(Error::validation(
            "title",
            "title cannot have leading or trailing whitespace",
        ));
    }
    let len = title.chars().count();
    if len > MAX_TITLE_LEN {
        return Err(Error::validation(
            "title",
            format!("title is {len} characters (max {MAX_TITLE_LEN})"),
        ));
    }
    if title.chars().any(|ch| ch.is_control()) {
        return Err(Error::validation(
            "title",
            "title cannot contain control characters",
        ));
    }
    Ok(())
}

/// Validate an optional task description.
pub fn validate_description(description: Option<&str>) -> Result<()> {
    let Some(description) = description else {
        return Ok(());
    };
    let len = description.chars().count();
    if len > MAX_DESCRIPTION_LEN {
        return Err(Error::validation(
            "description",
            format!("description is {len} characters (max {MAX_DESCRIPTION_LEN})"),
        ));
    }
    Ok(())
}

/// Validate a column id: a lowercase slug such as `todo` or `in_progress`.
pub fn validate_column_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= MAX_AGENT_LEN
        && id
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-')
        && id.starts_with(|ch: char| ch.is_ascii_lowercase() || ch.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(Error::validation(
            "column",
            format!("'{id}' is not a valid column id (lowercase slug)"),
        ))
    }
}

/// Validate an agent name: alphanumeric plus `-` and `_`, at most 64 chars.
pub fn validate_agent_name(agent: &str) -> Result<()> {
    let valid = !agent.is_empty()
        && agent.len() <= MAX_AGENT_LEN
        && agent
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::validation(
            "agent",
            format!("'{agent}' is not a valid agent name (alphanumeric, '-', '_', max {MAX_AGENT_LEN})"),
        ))
    }
}

/// Validate a label set.
///
/// Commas and newlines are rejected because labels are rendered as a
/// comma-separated list in the Markdown format.
pub fn validate_labels(labels: &[String]) -> Result<()> {
    for label in labels {
        let trimmed = label.trim();
        if trimmed.is_empty() {
            return Err(Error::validation("labels", "label cannot be empty"));
        }
        if trimmed != label {
            return Err(Error::validation(
                "labels",
                format!("label '{label}' cannot have surrounding whitespace"),
            ));
        }
        if label.chars().count() > MAX_LABEL_LEN {
            return Err(Error::validation(
                "labels",
                format!("label '{label}' is too long (max {MAX_LABEL_LEN})"),
            ));
        }
        if label.contains(',') || label.chars().any(|ch| ch.is_control()) {
            return Err(Error::validation(
                "labels",
                format!("label '{label}' cannot contain commas or control characters"),
            ));
        }
    }
    Ok(())
}

/// Validate a file path list attached to a task.
pub fn validate_files(files: &[String]) -> Result<()> {
    for file in files {
        if file.trim().is_empty() {
            return Err(Error::validation("files", "file path cannot be empty"));
        }
        if file.chars().any(|ch| ch.is_control()) {
            return Err(Error::validation(
                "files",
                format!("file path '{file}' cannot contain control characters"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_are_checked() {
        assert!(validate_title("Fix the parser").is_ok());
        assert!(validate_title("").is_err());
        assert!(validate_title(" padded ").is_err());
        assert!(validate_title("tab\there").is_err());
        assert!(validate_title(&"x".repeat(201)).is_err());
        assert!(validate_title(&"x".repeat(200)).is_ok());
    }

    #[test]
    fn unicode_titles_count_chars_not_bytes() {
        let title = "🎉".repeat(200);
        assert!(validate_title(&title).is_ok());
    }

    #[test]
    fn column_ids_are_slugs() {
        assert!(validate_column_id("todo").is_ok());
        assert!(validate_column_id("in_progress").is_ok());
        assert!(validate_column_id("In Progress").is_err());
        assert!(validate_column_id("").is_err());
        assert!(validate_column_id("_leading").is_err());
    }

    #[test]
    fn agent_names_are_checked() {
        assert!(validate_agent_name("claude").is_ok());
        assert!(validate_agent_name("gpt-5").is_ok());
        assert!(validate_agent_name("a b").is_err());
        assert!(validate_agent_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn labels_reject_commas() {
        assert!(validate_labels(&["bug".to_string(), "urgent".to_string()]).is_ok());
        assert!(validate_labels(&["a,b".to_string()]).is_err());
        assert!(validate_labels(&["".to_string()]).is_err());
    }
}
