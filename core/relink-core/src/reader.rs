//! Task log loading.

use std::path::Path;

use crate::error::{RelinkError, Result};
use crate::record::LogLine;

/// Reads the task log into trimmed, non-empty lines, keeping file order and
/// original line numbers.
pub fn read_log(path: &Path) -> Result<Vec<LogLine>> {
    let content = fs_err::read_to_string(path).map_err(|source| RelinkError::FileAccess {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(split_lines(&content))
}

pub fn split_lines(content: &str) -> Vec<LogLine> {
    content
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let trimmed = line.trim();
            (!trimmed.is_empty()).then(|| LogLine::new(idx + 1, trimmed))
        })
        .collect()
}
