//! Read, clear, and write the task-status handshake file (spec 3.4).
//!
//! Single-writer (the agent), single-reader (the orchestrator)
//! protocol: the orchestrator clears the file before spawning the
//! agent so a missing file after the subprocess exits means the agent
//! never wrote one, and a `task_id` mismatch means it's a stale write
//! from an earlier, already-timed-out attempt.

use std::fs;
use std::path::Path;

use catalyst_types::HandshakeFile;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};

/// Remove any existing handshake file so a stale write from a previous
/// attempt can't be mistaken for this attempt's result.
pub fn clear(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Io {
            path: path.to_owned(),
            source,
        }),
    }
}

/// Read the handshake file if present. Returns `Ok(None)` when the
/// agent never wrote one (the distinguishing signal for "missing").
pub fn read(path: &Path) -> Result<Option<HandshakeFile>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_owned(),
                source,
            })
        }
    };
    let handshake: HandshakeFile = serde_json::from_str(&raw).map_err(|source| StoreError::Json {
        path: path.to_owned(),
        source,
    })?;
    Ok(Some(handshake))
}

/// Read the handshake and discard it if it doesn't belong to
/// `expected_task_id` -- the stale-write case from spec 3.4.
pub fn read_for_task(path: &Path, expected_task_id: &str) -> Result<Option<HandshakeFile>> {
    match read(path)? {
        Some(h) if h.matches_task(expected_task_id) => Ok(Some(h)),
        Some(h) => {
            warn!(
                expected = expected_task_id,
                found = %h.task_id,
                "ignoring stale handshake file from a previous task"
            );
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Write a handshake file. Only ever called by test fixtures and the
/// agent-adapter's own test doubles -- in production the agent CLI
/// writes this file itself.
pub fn write(path: &Path, handshake: &HandshakeFile) -> Result<()> {
    let json = serde_json::to_string_pretty(handshake).map_err(|source| StoreError::Json {
        path: path.to_owned(),
        source,
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_owned(),
            source,
        })?;
    }
    fs::write(path, json).map_err(|source| StoreError::Io {
        path: path.to_owned(),
        source,
    })?;
    debug!(path = %path.display(), task_id = %handshake.task_id, "wrote handshake file");
    Ok(())
}
