//! Project configuration.
//!
//! Persistent state lives under `<project>/.kaban/`: the SQLite database
//! (`board.db`) and `config.json` (board name and feature toggles). The
//! default board layout used by `init` is defined here and passed into the
//! board service; the service itself bakes in no defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::markdown::ExportOptions;

/// Name of the per-project state directory
pub const KABAN_DIR: &str = ".kaban";

/// Name of the configuration file inside [`KABAN_DIR`]
pub const CONFIG_FILENAME: &str = "config.json";

/// Project configuration loaded from `.kaban/config.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KabanConfig {
    /// Display name for the board
    #[serde(default = "default_board_name")]
    pub board_name: String,

    /// Feature toggles
    #[serde(default)]
    pub features: Features,
}

impl Default for KabanConfig {
    fn default() -> Self {
        Self {
            board_name: default_board_name(),
            features: Features::default(),
        }
    }
}

fn default_board_name() -> String {
    "Kaban".to_string()
}

/// Feature toggles for optional behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Features {
    /// Embed `<!-- id:... -->` metadata in Markdown exports
    #[serde(default = "default_true")]
    pub export_metadata: bool,

    /// Include archived tasks in Markdown exports
    #[serde(default)]
    pub export_archived: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Features {
    fn default() -> Self {
        Self {
            export_metadata: default_true(),
            export_archived: false,
        }
    }
}

impl KabanConfig {
    /// Load the configuration from `<dir>/config.json`, falling back to the
    /// defaults when the file does not exist.
    pub fn load(kaban_dir: &Path) -> Result<Self> {
        let path = config_path(kaban_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Persist the configuration to `<dir>/config.json`.
    pub fn save(&self, kaban_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(kaban_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path(kaban_dir), json)?;
        Ok(())
    }

    /// Board layout derived from this configuration.
    pub fn board_config(&self) -> BoardConfig {
        BoardConfig {
            name: self.board_name.clone(),
            scorer: None,
            columns: default_columns(),
        }
    }

    /// Export options derived from the feature toggles.
    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            include_metadata: self.features.export_metadata,
            include_archived: self.features.export_archived,
        }
    }
}

fn config_path(kaban_dir: &Path) -> PathBuf {
    kaban_dir.join(CONFIG_FILENAME)
}

/// Board layout used when initializing a database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Display name for the board
    pub name: String,

    /// Default scorer name, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scorer: Option<String>,

    /// Columns in display order
    pub columns: Vec<ColumnSpec>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            name: default_board_name(),
            scorer: None,
            columns: default_columns(),
        }
    }
}

/// One column in a [`BoardConfig`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Stable slug id (`todo`, `in_progress`, ...)
    pub id: String,

    /// Display name
    pub name: String,

    /// Maximum number of non-archived tasks, if limited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wip_limit: Option<i64>,

    /// Completing moves into this column stamp `completed_at`
    #[serde(default)]
    pub is_terminal: bool,
}

/// The standard five-column layout.
pub fn default_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec {
            id: "backlog".to_string(),
            name: "Backlog".to_string(),
            wip_limit: None,
            is_terminal: false,
        },
        ColumnSpec {
            id: "todo".to_string(),
            name: "To Do".to_string(),
            wip_limit: None,
            is_terminal: false,
        },
        ColumnSpec {
            id: "in_progress".to_string(),
            name: "In Progress".to_string(),
            wip_limit: Some(3),
            is_terminal: false,
        },
        ColumnSpec {
            id: "review".to_string(),
            name: "Review".to_string(),
            wip_limit: Some(2),
            is_terminal: false,
        },
        ColumnSpec {
            id: "done".to_string(),
            name: "Done".to_string(),
            wip_limit: None,
            is_terminal: true,
        },
    ]
}

/// Column id new tasks land in when none is given.
pub const DEFAULT_COLUMN_ID: &str = "todo";

/// Column id whose first entry stamps `started_at`.
pub const IN_PROGRESS_COLUMN_ID: &str = "in_progress";

/// Column id exempt from blocker enforcement on moves.
pub const BACKLOG_COLUMN_ID: &str = "backlog";
