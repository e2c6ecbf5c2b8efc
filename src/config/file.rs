//! Optional TOML configuration file

use crate::results::CommandResult;
use crate::types::SyncError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Defaults read from `--config <file>`; command-line flags win.
///
/// ```toml
/// store_root = "/srv/objects"
/// page_size = 500
/// max_concurrent_requests = 16
/// guess_mime_type = true
/// follow_symlinks = false
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Directory holding one sub-directory per bucket
    pub store_root: Option<PathBuf>,
    pub page_size: Option<usize>,
    pub max_concurrent_requests: Option<usize>,
    pub guess_mime_type: Option<bool>,
    pub follow_symlinks: Option<bool>,
}

impl FileConfig {
    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let text = fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// Process exit code for a finished command.
///
/// 1 when any task failed, otherwise 2 when any file was skipped with a
/// warning, otherwise 0.
pub fn exit_code(result: &CommandResult) -> i32 {
    if result.num_tasks_failed > 0 {
        1
    } else if result.num_tasks_warned > 0 {
        2
    } else {
        0
    }
}
