//! File collaborator for the editor UI: whole-file reads and writes by path.
//!
//! Plain synchronous I/O; callers on an async runtime should wrap these in
//! `spawn_blocking`.

use std::path::Path;

use crate::errors::FileError;

/// Read the full UTF-8 contents of `path`.
pub fn read_file(path: &Path) -> Result<String, FileError> {
    if !path.exists() {
        return Err(FileError::NotFound(path.to_path_buf()));
    }

    std::fs::read_to_string(path).map_err(|source| FileError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Replace the contents of `path`, creating missing parent directories.
pub fn write_file(path: &Path, content: &str) -> Result<(), FileError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| FileError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    std::fs::write(path, content).map_err(|source| FileError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(path = %path.display(), bytes = content.len(), "file saved");
    Ok(())
}
