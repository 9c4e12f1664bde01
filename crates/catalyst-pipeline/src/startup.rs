//! Pipeline startup sequence (spec 4.2.1): ensure directories, write
//! the PID file, snapshot source hashes for hot-reload, and sweep any
//! uncommitted changes left in the archival directories from a prior
//! crash into one recovery commit.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use catalyst_store::StoreRoot;

use crate::hotreload::HashSnapshot;

/// Ensure every directory the pipeline expects to exist is present,
/// write the PID file, and return the startup hash snapshot of the
/// watched source paths.
pub fn startup(root: &StoreRoot, watched: &[&Path]) -> Result<HashSnapshot> {
    for dir in root.required_dirs() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating required directory {}", dir.display()))?;
    }
    catalyst_store::stop::write_pid_file(&root.pipeline_pid_path())
        .context("writing pipeline PID file")?;
    sweep_recovery_commit(root).context("sweeping uncommitted archival changes")?;
    HashSnapshot::capture(watched)
}

/// Commit any uncommitted changes under the archival directories
/// (`docs/completed-backlog/`, `docs/ideas/processed/`) left behind by
/// a process that was killed mid-archive. A single recovery commit
/// keeps the repository clean before the main loop starts touching
/// the same paths.
fn sweep_recovery_commit(root: &StoreRoot) -> Result<()> {
    let repo_root = root.root();
    let archive_root = repo_root.join("docs");
    if !archive_root.exists() {
        return Ok(());
    }

    let status = git(repo_root, &["status", "--porcelain", "--", "docs"])?;
    if status.trim().is_empty() {
        return Ok(());
    }

    git(repo_root, &["add", "docs"])?;
    git(
        repo_root,
        &["commit", "-m", "catalyst: recovery sweep of archival directories"],
    )?;
    Ok(())
}

fn git(repo_root: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_root)
        .args(args)
        .output()
        .with_context(|| format!("spawning git {args:?}"))?;
    if !output.status.success() {
        anyhow::bail!(
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
