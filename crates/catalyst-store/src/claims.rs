//! Read-check-write access to the claims and per-worker status files
//! (spec 3.5) under an exclusive filesystem lock, as spec 5 requires:
//! "workers must read-check-write with an exclusive filesystem lock or
//! atomic rename."

use std::fs::{self, OpenOptions};
use std::path::Path;

use catalyst_types::{ClaimsFile, WorkerStatus, WorkerStatusFile};
use fs2::FileExt;

use crate::error::{Result, StoreError};

/// Run `f` with an exclusive lock held on the claims file, reading the
/// current contents in, passing them to `f`, and writing the result
/// back before releasing the lock. This is the read-check-write cycle
/// spec 5 mandates for the claims file's multiple writers.
pub fn with_claims_file<T>(
    path: &Path,
    f: impl FnOnce(&mut ClaimsFile) -> T,
) -> Result<T> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_owned(),
            source,
        })?;
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| StoreError::Io {
            path: path.to_owned(),
            source,
        })?;
    file.lock_exclusive().map_err(|source| StoreError::Io {
        path: path.to_owned(),
        source,
    })?;

    let result = (|| -> Result<T> {
        let raw = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_owned(),
            source,
        })?;
        let mut claims: ClaimsFile = if raw.trim().is_empty() {
            ClaimsFile::new()
        } else {
            serde_json::from_str(&raw).map_err(|source| StoreError::Json {
                path: path.to_owned(),
                source,
            })?
        };
        let out = f(&mut claims);
        let json = serde_json::to_string_pretty(&claims).map_err(|source| StoreError::Json {
            path: path.to_owned(),
            source,
        })?;
        fs::write(path, json).map_err(|source| StoreError::Io {
            path: path.to_owned(),
            source,
        })?;
        Ok(out)
    })();

    // Best-effort: an unlock failure shouldn't mask the real result.
    let _ = FileExt::unlock(&file);
    result
}

pub fn write_worker_status(path: &Path, status: &WorkerStatusFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_owned(),
            source,
        })?;
    }
    let json = serde_json::to_string_pretty(status).map_err(|source| StoreError::Json {
        path: path.to_owned(),
        source,
    })?;
    fs::write(path, json).map_err(|source| StoreError::Io {
        path: path.to_owned(),
        source,
    })
}

pub fn read_worker_status(path: &Path) -> Result<Option<WorkerStatusFile>> {
    match fs::read_to_string(path) {
        Ok(raw) => {
            let status = serde_json::from_str(&raw).map_err(|source| StoreError::Json {
                path: path.to_owned(),
                source,
            })?;
            Ok(Some(status))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io {
            path: path.to_owned(),
            source,
        }),
    }
}

/// Scan a directory of per-worker status files into `worker_id -> status`.
pub fn scan_worker_statuses(
    dir: &Path,
) -> Result<std::collections::HashMap<String, WorkerStatus>> {
    let mut out = std::collections::HashMap::new();
    if !dir.exists() {
        return Ok(out);
    }
    let entries = fs::read_dir(dir).map_err(|source| StoreError::Io {
        path: dir.to_owned(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| StoreError::Io {
            path: dir.to_owned(),
            source,
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(status) = read_worker_status(&path)? {
            out.insert(status.worker_id.clone(), status.status);
        }
    }
    Ok(out)
}
