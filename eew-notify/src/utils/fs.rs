//! Filesystem helpers shared across modules.
//!
//! These helpers attach the operation and path to IO errors so log lines and
//! startup failures say what was being touched.

use std::path::Path;

use crate::{Error, Result};

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// Ensure a directory exists (synchronous variant) with a custom operation label.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| io_error(op, path, e))
}

/// Read a UTF-8 file into a string, used for the settings file and region catalog.
pub fn read_to_string_with_op(op: &'static str, path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| io_error(op, path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        let err = read_to_string_with_op("reading settings", &path).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("reading settings"));
        assert!(msg.contains("missing.toml"));
    }

    #[test]
    fn test_ensure_dir_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");

        ensure_dir_all_sync_with_op("creating log directory", &nested).unwrap();
        assert!(nested.is_dir());
    }
}
