//! Suspension marker files (spec 3.6).

use std::fs;
use std::path::Path;

use catalyst_types::SuspensionMarker;

use crate::error::{Result, StoreError};
use crate::paths::StoreRoot;

pub fn write(path: &Path, marker: &SuspensionMarker) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_owned(),
            source,
        })?;
    }
    let json = serde_json::to_string_pretty(marker).map_err(|source| StoreError::Json {
        path: path.to_owned(),
        source,
    })?;
    fs::write(path, json).map_err(|source| StoreError::Io {
        path: path.to_owned(),
        source,
    })
}

pub fn read(path: &Path) -> Result<Option<SuspensionMarker>> {
    match fs::read_to_string(path) {
        Ok(raw) => {
            let marker = serde_json::from_str(&raw).map_err(|source| StoreError::Json {
                path: path.to_owned(),
                source,
            })?;
            Ok(Some(marker))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io {
            path: path.to_owned(),
            source,
        }),
    }
}

pub fn remove(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Io {
            path: path.to_owned(),
            source,
        }),
    }
}

/// Every unanswered suspension marker currently parked in
/// `.claude/suspended/` -- used by backlog scans to hide the item it
/// refers to, and by the bridge to know what's still awaiting a reply.
pub fn scan_pending(root: &StoreRoot) -> Result<Vec<SuspensionMarker>> {
    let dir = root.suspended_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(&dir).map_err(|source| StoreError::Io {
        path: dir.clone(),
        source,
    })? {
        let entry = entry.map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(marker) = read(&path)? {
            if marker.is_pending() {
                out.push(marker);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn marker(slug: &str, answer: Option<&str>) -> SuspensionMarker {
        SuspensionMarker {
            slug: slug.into(),
            item_type: "defect".into(),
            item_path: format!("docs/defect-backlog/{slug}.md").into(),
            plan_path: format!(".claude/plans/{slug}.yaml").into(),
            task_id: "t1".into(),
            question: "which approach?".into(),
            context: String::new(),
            channel_id: "C1".into(),
            thread_ts: None,
            suspended_at: Utc::now(),
            timeout_minutes: 60,
            answer: answer.map(|s| s.to_string()),
        }
    }

    #[test]
    fn write_then_read_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0001-a.json");
        write(&path, &marker("0001-a", None)).unwrap();
        let read_back = read(&path).unwrap().unwrap();
        assert_eq!(read_back.slug, "0001-a");
    }

    #[test]
    fn scan_pending_excludes_answered_markers() {
        let dir = tempdir().unwrap();
        let root = StoreRoot::new(dir.path());
        write(
            &root.suspension_path("0001-a"),
            &marker("0001-a", None),
        )
        .unwrap();
        write(
            &root.suspension_path("0002-b"),
            &marker("0002-b", Some("use OAuth2")),
        )
        .unwrap();
        let pending = scan_pending(&root).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].slug, "0001-a");
    }

    #[test]
    fn remove_on_missing_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        assert!(remove(&dir.path().join("gone.json")).is_ok());
    }
}
