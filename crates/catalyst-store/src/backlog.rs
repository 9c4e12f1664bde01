//! Scan, parse, and archive backlog items (spec 3.3, 4.2.1, 4.2.3).

use std::fs;
use std::path::Path;

use catalyst_types::{BacklogItem, BacklogStatus, BacklogType};
use regex::Regex;
use tracing::{info, warn};

use crate::error::{Result, StoreError};
use crate::paths::StoreRoot;

fn status_line_re() -> Regex {
    Regex::new(r"(?m)^##\s*Status:\s*(.+?)\s*$").expect("static regex")
}

fn dependencies_section_re() -> Regex {
    Regex::new(r"(?ms)^##\s*Dependencies\s*\n(.*?)(\n##\s|\z)").expect("static regex")
}

fn dependency_item_re() -> Regex {
    Regex::new(r"(?m)^[-*]\s*(\S+)").expect("static regex")
}

/// Derive the integer-prefixed slug from a backlog file's name, e.g.
/// `0042-add-retry-budget.md` -> `0042-add-retry-budget`.
pub fn slug_from_path(path: &Path) -> Option<String> {
    path.file_stem().and_then(|s| s.to_str()).map(str::to_owned)
}

/// Parse a single backlog markdown file.
pub fn parse_item(path: &Path, item_type: BacklogType) -> Result<BacklogItem> {
    let body = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_owned(),
        source,
    })?;

    let status_text = status_line_re()
        .captures(&body)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| "Open".to_string());
    let status = status_text.parse().unwrap_or_else(|_| {
        warn!(path = %path.display(), status = %status_text, "unrecognized backlog status line, treating as Open");
        BacklogStatus::Open
    });

    let dependencies = dependencies_section_re()
        .captures(&body)
        .map(|c| {
            dependency_item_re()
                .captures_iter(&c[1])
                .map(|m| m[1].to_string())
                .collect()
        })
        .unwrap_or_default();

    let slug = slug_from_path(path).unwrap_or_else(|| "unknown".to_string());

    Ok(BacklogItem {
        slug,
        item_type,
        status,
        path: path.to_owned(),
        dependencies,
        body,
    })
}

/// Scan one directory for `.md` items, sorted alphabetically.
fn scan_dir(dir: &Path, item_type: BacklogType) -> Result<Vec<BacklogItem>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<_> = fs::read_dir(dir)
        .map_err(|source| StoreError::Io {
            path: dir.to_owned(),
            source,
        })?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("md"))
        .collect();
    paths.sort();

    paths
        .into_iter()
        .map(|p| parse_item(&p, item_type))
        .collect()
}

/// Scan all backlog directories and return a prioritised list: defects
/// first, then features, then analyses, alphabetical within each type
/// (spec 4.2.1 step 4). Excludes items whose status isn't `Open`,
/// whose slug is in `completed_slugs` or `failed_slugs`, or whose
/// dependencies aren't all in `completed_slugs`.
pub fn scan_backlog(
    root: &StoreRoot,
    completed_slugs: &[String],
    failed_slugs: &[String],
) -> Result<Vec<BacklogItem>> {
    let mut items = Vec::new();
    for item_type in [BacklogType::Defect, BacklogType::Feature, BacklogType::Analysis] {
        items.extend(scan_dir(&root.backlog_dir(item_type), item_type)?);
    }

    Ok(items
        .into_iter()
        .filter(|item| item.status == BacklogStatus::Open)
        .filter(|item| !completed_slugs.contains(&item.slug))
        .filter(|item| !failed_slugs.contains(&item.slug))
        .filter(|item| item.unmet_dependencies(completed_slugs).is_empty())
        .collect())
}

/// Archive a completed item: move it from its backlog directory to the
/// corresponding `completed-backlog` subdirectory.
///
/// Idempotent per spec 4.2.3: if the destination already exists (a
/// prior interrupted run already moved it, leaving this path an
/// orphan), the source is deleted and the call still succeeds -- it
/// must not silently return success *without* removing the orphan,
/// the way the original system's bug allowed, which caused an infinite
/// re-processing loop.
pub fn archive_item(root: &StoreRoot, item: &BacklogItem) -> Result<()> {
    let dest_dir = root.archive_dir(item.item_type);
    fs::create_dir_all(&dest_dir).map_err(|source| StoreError::Io {
        path: dest_dir.clone(),
        source,
    })?;
    let file_name = item
        .path
        .file_name()
        .expect("backlog item path always has a file name");
    let dest = dest_dir.join(file_name);

    if dest.exists() {
        warn!(
            source = %item.path.display(),
            dest = %dest.display(),
            "archive destination already exists, removing orphaned source"
        );
        if item.path.exists() {
            fs::remove_file(&item.path).map_err(|source| StoreError::Io {
                path: item.path.clone(),
                source,
            })?;
        }
        return Ok(());
    }

    fs::rename(&item.path, &dest).map_err(|source| StoreError::Io {
        path: item.path.clone(),
        source,
    })?;
    info!(source = %item.path.display(), dest = %dest.display(), "archived backlog item");
    Ok(())
}

/// Append a `## Status: ...` transition, replacing the prior status
/// line in place (or appending one if none existed).
pub fn set_status(path: &Path, status: BacklogStatus) -> Result<()> {
    let body = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_owned(),
        source,
    })?;
    let re = status_line_re();
    let replacement = format!("## Status: {status}");
    let updated = if re.is_match(&body) {
        re.replace(&body, replacement.as_str()).into_owned()
    } else {
        format!("{body}\n{replacement}\n")
    };
    fs::write(path, updated).map_err(|source| StoreError::Io {
        path: path.to_owned(),
        source,
    })
}

/// Append a freeform section (e.g. `## Verification Log`) to an item's
/// markdown body.
pub fn append_section(path: &Path, heading: &str, content: &str) -> Result<()> {
    let mut body = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_owned(),
        source,
    })?;
    if !body.ends_with('\n') {
        body.push('\n');
    }
    body.push_str(&format!("\n## {heading}\n{content}\n"));
    fs::write(path, body).map_err(|source| StoreError::Io {
        path: path.to_owned(),
        source,
    })
}
