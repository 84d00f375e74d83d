//! Configuration loading.
//!
//! Precedence: built-in defaults < `~/.task-spooler/relink.toml` (or an
//! explicit `--config` path) < command-line flags. The binary applies the
//! flags; this module handles the first two layers.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{RelinkError, Result};
use crate::filter::{
    Mode, StalenessWindow, FULL_WINDOW_DAYS, MAX_WINDOW_DAYS, RECENT_WINDOW_DAYS,
};
use crate::process::CommandRewrite;
use crate::submit::QueueDialect;

const DEFAULT_CONFIG_RELATIVE_PATH: &str = ".task-spooler/relink.toml";
const DEFAULT_LOG_RELATIVE_PATH: &str = "task-spooler/log.txt";

/// On-disk configuration. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub log_path: Option<PathBuf>,
    pub mode: Option<Mode>,
    pub recent_days: Option<u32>,
    pub full_days: Option<u32>,
    #[serde(default)]
    pub queue: QueueFileConfig,
    #[serde(default, rename = "rewrite")]
    pub rewrites: Vec<CommandRewrite>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct QueueFileConfig {
    pub program: Option<String>,
    pub dialect: Option<QueueDialect>,
}

/// Resolved settings handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelinkConfig {
    pub log_path: PathBuf,
    pub window: StalenessWindow,
    pub queue_program: String,
    pub dialect: QueueDialect,
    pub rewrites: Vec<CommandRewrite>,
    pub dry_run: bool,
}

/// Command-line overrides, applied on top of the file layer.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub log_path: Option<PathBuf>,
    pub mode: Option<Mode>,
    pub days: Option<u32>,
    pub queue_program: Option<String>,
    pub dialect: Option<QueueDialect>,
    pub dry_run: bool,
}

pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(RelinkError::HomeDirNotFound)?;
    Ok(home.join(DEFAULT_CONFIG_RELATIVE_PATH))
}

pub fn default_log_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(RelinkError::HomeDirNotFound)?;
    Ok(home.join(DEFAULT_LOG_RELATIVE_PATH))
}

/// Loads the config file. An explicit path must exist; a missing default
/// file yields defaults.
pub fn load_file_config(path: Option<&Path>) -> Result<FileConfig> {
    let (config_path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (default_config_path()?, false),
    };

    if !explicit && !config_path.exists() {
        return Ok(FileConfig::default());
    }

    let content =
        fs_err::read_to_string(&config_path).map_err(|err| RelinkError::ConfigMalformed {
            path: config_path.clone(),
            details: err.to_string(),
        })?;
    parse_file_config(&content).map_err(|details| RelinkError::ConfigMalformed {
        path: config_path,
        details,
    })
}

pub fn parse_file_config(content: &str) -> std::result::Result<FileConfig, String> {
    toml::from_str(content).map_err(|err| err.to_string())
}

impl RelinkConfig {
    /// Merges the file layer with command-line overrides.
    pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Self> {
        let log_path = match overrides.log_path.or(file.log_path) {
            Some(path) => path,
            None => default_log_path()?,
        };

        let days = match overrides.days {
            Some(days) => days,
            None => match overrides.mode.or(file.mode).unwrap_or_default() {
                Mode::Recent => file.recent_days.unwrap_or(RECENT_WINDOW_DAYS),
                Mode::Full => file.full_days.unwrap_or(FULL_WINDOW_DAYS),
            },
        };
        let window = StalenessWindow::from_days(days).ok_or_else(|| {
            RelinkError::InvalidConfig(format!(
                "staleness window must be between 1 and {MAX_WINDOW_DAYS} days, got {days}"
            ))
        })?;

        let dialect = overrides
            .dialect
            .or(file.queue.dialect)
            .unwrap_or_default();
        let queue_program = overrides
            .queue_program
            .or(file.queue.program)
            .unwrap_or_else(|| dialect.default_program().to_string());
        if queue_program.trim().is_empty() {
            return Err(RelinkError::InvalidConfig(
                "queue program must not be empty".to_string(),
            ));
        }

        Ok(Self {
            log_path,
            window,
            queue_program,
            dialect,
            rewrites: file.rewrites,
            dry_run: overrides.dry_run,
        })
    }
}
