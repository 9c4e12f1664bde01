//! The stop semaphore file and the pipeline PID file (spec 4.1.2 step
//! 1, 4.2.1, 6).

use std::fs;
use std::path::Path;

use crate::error::{Result, StoreError};

/// Whether the stop semaphore is present. Checked at the top of every
/// main-loop iteration.
pub fn is_stop_requested(path: &Path) -> bool {
    path.exists()
}

pub fn request_stop(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_owned(),
            source,
        })?;
    }
    fs::write(path, b"").map_err(|source| StoreError::Io {
        path: path.to_owned(),
        source,
    })
}

pub fn clear_stop(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Io {
            path: path.to_owned(),
            source,
        }),
    }
}

/// Write the pipeline's own PID file at startup.
pub fn write_pid_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_owned(),
            source,
        })?;
    }
    fs::write(path, std::process::id().to_string()).map_err(|source| StoreError::Io {
        path: path.to_owned(),
        source,
    })
}

pub fn read_pid_file(path: &Path) -> Result<Option<u32>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(raw.trim().parse().ok()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io {
            path: path.to_owned(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn stop_semaphore_lifecycle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plans").join(".stop");
        assert!(!is_stop_requested(&path));
        request_stop(&path).unwrap();
        assert!(is_stop_requested(&path));
        clear_stop(&path).unwrap();
        assert!(!is_stop_requested(&path));
    }

    #[test]
    fn pid_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.pid");
        write_pid_file(&path).unwrap();
        let pid = read_pid_file(&path).unwrap().unwrap();
        assert_eq!(pid, std::process::id());
    }

    #[test]
    fn read_pid_file_missing_is_none() {
        let dir = tempdir().unwrap();
        assert!(read_pid_file(&dir.path().join("gone.pid")).unwrap().is_none());
    }
}
