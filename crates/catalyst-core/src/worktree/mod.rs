//! Git worktree management for parallel task isolation (spec 4.1.3, 5).
//!
//! Each task in a parallel group runs in its own git worktree on branch
//! `parallel/<task-id>`, sharing the object store of the main repository.
//! Merge-back is deliberately **not** `git merge`: two tasks touching
//! unrelated files in the same group should never conflict just because
//! they both edited the plan file or a status file along the way. So we
//! diff the branch against its fork point, drop the paths the orchestrator
//! itself writes (`.claude/plans/`, `.claude/subagent-status/`,
//! `.claude/agent-claims`), and apply only the task's real file changes
//! into the main tree.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Prefixes excluded from diff-based merge: orchestrator-owned state that
/// every parallel worker's worktree independently mutates and that must
/// never be copied back verbatim.
const EXCLUDED_PREFIXES: &[&str] = &[
    ".claude/plans/",
    ".claude/subagent-status/",
    ".claude/agent-claims",
];

#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error("not a git repository: {0}")]
    NotAGitRepo(PathBuf),

    #[error("git command failed: {message}")]
    GitCommand {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git {command} failed (exit {code}): {stderr}")]
    GitExit {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("failed to parse worktree list output: {0}")]
    ParseError(String),
}

/// One line of `git diff --name-status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    pub path: String,
    pub status: ChangeStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
    Other,
}

/// Information about a single git worktree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: Option<String>,
    pub head_commit: String,
}

/// Manages git worktrees for parallel-group task isolation.
///
/// Git serialises mutating operations on a repository's object store via
/// its own lock file; we add an in-process mutex on top so concurrent
/// async tasks in this orchestrator don't hammer that lock simultaneously.
#[derive(Debug)]
pub struct WorktreeManager {
    repo_path: PathBuf,
    worktree_base: PathBuf,
    git_lock: Arc<Mutex<()>>,
}

impl Clone for WorktreeManager {
    fn clone(&self) -> Self {
        Self {
            repo_path: self.repo_path.clone(),
            worktree_base: self.worktree_base.clone(),
            git_lock: Arc::clone(&self.git_lock),
        }
    }
}

impl WorktreeManager {
    pub fn new(
        repo_path: impl Into<PathBuf>,
        worktree_base: Option<PathBuf>,
    ) -> Result<Self, WorktreeError> {
        let repo_path = repo_path.into();

        let output = Command::new("git")
            .arg("rev-parse")
            .arg("--git-dir")
            .current_dir(&repo_path)
            .output()
            .map_err(|e| WorktreeError::GitCommand {
                message: "failed to run git rev-parse".into(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(WorktreeError::NotAGitRepo(repo_path));
        }

        let worktree_base = worktree_base.unwrap_or_else(|| {
            let repo_name = repo_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("repo");
            let base_name = format!("{repo_name}-parallel-worktrees");
            repo_path
                .parent()
                .map(|p| p.join(&base_name))
                .unwrap_or_else(|| PathBuf::from(base_name))
        });

        Ok(Self {
            repo_path,
            worktree_base,
            git_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn worktree_base(&self) -> &Path {
        &self.worktree_base
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Conventional branch name for a task running in a parallel group.
    pub fn branch_name(task_id: &str) -> String {
        format!("parallel/{task_id}")
    }

    /// Create a worktree for `branch_name`, creating the branch from
    /// the current HEAD if it doesn't yet exist. Idempotent: an
    /// existing worktree at the expected path and branch is returned
    /// as-is.
    pub fn create_worktree(&self, branch_name: &str) -> Result<WorktreeInfo, WorktreeError> {
        let _lock = self.git_lock.lock().unwrap_or_else(|e| e.into_inner());

        let dir_name = branch_name.replace('/', "--");
        let worktree_path = self.worktree_base.join(&dir_name);

        if let Ok(existing) = self.find_worktree_by_path(&worktree_path) {
            if existing.branch.as_deref() == Some(branch_name) || existing.branch.is_none() {
                tracing::info!(
                    path = %worktree_path.display(),
                    branch = branch_name,
                    "worktree already exists, returning existing"
                );
                return Ok(existing);
            }
        }

        if !self.worktree_base.exists() {
            std::fs::create_dir_all(&self.worktree_base).map_err(|e| WorktreeError::GitCommand {
                message: format!(
                    "failed to create worktree base directory: {}",
                    self.worktree_base.display()
                ),
                source: e,
            })?;
        }

        let branch_exists = self.branch_exists(branch_name)?;

        let output = if branch_exists {
            Command::new("git")
                .args(["worktree", "add"])
                .arg(&worktree_path)
                .arg(branch_name)
                .current_dir(&self.repo_path)
                .output()
        } else {
            Command::new("git")
                .args(["worktree", "add", "-b"])
                .arg(branch_name)
                .arg(&worktree_path)
                .current_dir(&self.repo_path)
                .output()
        }
        .map_err(|e| WorktreeError::GitCommand {
            message: "failed to run git worktree add".into(),
            source: e,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            self.cleanup_partial(&worktree_path);
            return Err(WorktreeError::GitExit {
                command: "worktree add".into(),
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        self.find_worktree_by_path(&worktree_path)
    }

    /// The main repo's current `HEAD` commit, used as a parallel-group
    /// task's fork point before its worktree is created.
    pub fn head_commit(&self) -> Result<String, WorktreeError> {
        let output = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| WorktreeError::GitCommand {
                message: "failed to run git rev-parse HEAD".into(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(WorktreeError::GitExit {
                command: "rev-parse HEAD".into(),
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Stage and commit everything an agent changed inside a worktree.
    /// Returns `false` (no-op) if the agent left nothing to commit.
    pub fn commit_all(&self, worktree_path: &Path, message: &str) -> Result<bool, WorktreeError> {
        let add = Command::new("git")
            .args(["add", "-A"])
            .current_dir(worktree_path)
            .output()
            .map_err(|e| WorktreeError::GitCommand {
                message: "failed to run git add".into(),
                source: e,
            })?;
        if !add.status.success() {
            let stderr = String::from_utf8_lossy(&add.stderr).to_string();
            return Err(WorktreeError::GitExit {
                command: "add".into(),
                code: add.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let status = Command::new("git")
            .args(["status", "--porcelain"])
            .current_dir(worktree_path)
            .output()
            .map_err(|e| WorktreeError::GitCommand {
                message: "failed to run git status".into(),
                source: e,
            })?;
        if String::from_utf8_lossy(&status.stdout).trim().is_empty() {
            return Ok(false);
        }

        let commit = Command::new("git")
            .args(["commit", "-m"])
            .arg(message)
            .current_dir(worktree_path)
            .output()
            .map_err(|e| WorktreeError::GitCommand {
                message: "failed to run git commit".into(),
                source: e,
            })?;
        if !commit.status.success() {
            let stderr = String::from_utf8_lossy(&commit.stderr).to_string();
            return Err(WorktreeError::GitExit {
                command: "commit".into(),
                code: commit.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(true)
    }

    /// Remove a worktree by path. No-op if it doesn't exist.
    pub fn remove_worktree(&self, path: &Path) -> Result<(), WorktreeError> {
        let _lock = self.git_lock.lock().unwrap_or_else(|e| e.into_inner());

        if self.find_worktree_by_path(path).is_err() {
            if path.exists() {
                let _ = std::fs::remove_dir_all(path);
            }
            return Ok(());
        }

        let output = Command::new("git")
            .args(["worktree", "remove", "--force"])
            .arg(path)
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| WorktreeError::GitCommand {
                message: "failed to run git worktree remove".into(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            if stderr.contains("is not a working tree") {
                return Ok(());
            }
            return Err(WorktreeError::GitExit {
                command: "worktree remove".into(),
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(())
    }

    pub fn list_worktrees(&self) -> Result<Vec<WorktreeInfo>, WorktreeError> {
        let output = Command::new("git")
            .args(["worktree", "list", "--porcelain"])
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| WorktreeError::GitCommand {
                message: "failed to run git worktree list".into(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(WorktreeError::GitExit {
                command: "worktree list".into(),
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        parse_porcelain_output(&String::from_utf8_lossy(&output.stdout))
    }

    pub fn cleanup_stale(&self) -> Result<(), WorktreeError> {
        let output = Command::new("git")
            .args(["worktree", "prune"])
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| WorktreeError::GitCommand {
                message: "failed to run git worktree prune".into(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(WorktreeError::GitExit {
                command: "worktree prune".into(),
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(())
    }

    /// Diff `branch_name` against `fork_point`, excluding orchestrator-
    /// owned state paths (spec 4.1.3).
    pub fn diff_against_fork_point(
        &self,
        branch_name: &str,
        fork_point: &str,
    ) -> Result<Vec<ChangedFile>, WorktreeError> {
        let output = Command::new("git")
            .args(["diff", "--name-status"])
            .arg(format!("{fork_point}..{branch_name}"))
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| WorktreeError::GitCommand {
                message: "failed to run git diff --name-status".into(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(WorktreeError::GitExit {
                command: "diff --name-status".into(),
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(parse_name_status(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Apply a branch's changes into the main repo's working tree
    /// without `git merge`: each surviving (non-excluded) changed path
    /// is checked out from the branch, or removed if the branch deleted
    /// it. Returns the list of paths actually applied.
    pub fn diff_merge(
        &self,
        branch_name: &str,
        fork_point: &str,
    ) -> Result<Vec<String>, WorktreeError> {
        let _lock = self.git_lock.lock().unwrap_or_else(|e| e.into_inner());

        let changes = self.diff_against_fork_point(branch_name, fork_point)?;
        let mut applied = Vec::new();

        for change in changes {
            if is_excluded(&change.path) {
                continue;
            }

            match change.status {
                ChangeStatus::Deleted => {
                    let output = Command::new("git")
                        .args(["rm", "-f", "--ignore-unmatch"])
                        .arg(&change.path)
                        .current_dir(&self.repo_path)
                        .output()
                        .map_err(|e| WorktreeError::GitCommand {
                            message: "failed to run git rm".into(),
                            source: e,
                        })?;
                    if !output.status.success() {
                        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                        return Err(WorktreeError::GitExit {
                            command: "rm".into(),
                            code: output.status.code().unwrap_or(-1),
                            stderr,
                        });
                    }
                }
                _ => {
                    let output = Command::new("git")
                        .args(["checkout", branch_name, "--"])
                        .arg(&change.path)
                        .current_dir(&self.repo_path)
                        .output()
                        .map_err(|e| WorktreeError::GitCommand {
                            message: "failed to run git checkout".into(),
                            source: e,
                        })?;
                    if !output.status.success() {
                        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                        return Err(WorktreeError::GitExit {
                            command: "checkout".into(),
                            code: output.status.code().unwrap_or(-1),
                            stderr,
                        });
                    }
                }
            }

            applied.push(change.path);
        }

        Ok(applied)
    }

    pub fn delete_branch(&self, branch_name: &str) -> Result<(), WorktreeError> {
        let _lock = self.git_lock.lock().unwrap_or_else(|e| e.into_inner());

        let output = Command::new("git")
            .args(["branch", "-D", branch_name])
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| WorktreeError::GitCommand {
                message: "failed to run git branch -D".into(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            if stderr.contains("not found") {
                return Ok(());
            }
            return Err(WorktreeError::GitExit {
                command: "branch -D".into(),
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(())
    }

    pub fn branch_exists(&self, branch_name: &str) -> Result<bool, WorktreeError> {
        let output = Command::new("git")
            .args(["rev-parse", "--verify"])
            .arg(format!("refs/heads/{branch_name}"))
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| WorktreeError::GitCommand {
                message: "failed to run git rev-parse --verify".into(),
                source: e,
            })?;

        Ok(output.status.success())
    }

    fn find_worktree_by_path(&self, path: &Path) -> Result<WorktreeInfo, WorktreeError> {
        let worktrees = self.list_worktrees()?;
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        for wt in worktrees {
            let wt_canonical = wt.path.canonicalize().unwrap_or_else(|_| wt.path.clone());
            if wt_canonical == canonical {
                return Ok(wt);
            }
        }

        Err(WorktreeError::ParseError(format!(
            "worktree not found at path: {}",
            path.display()
        )))
    }

    fn cleanup_partial(&self, path: &Path) {
        if path.exists() {
            let _ = std::fs::remove_dir_all(path);
        }
        let _ = self.cleanup_stale();
    }
}

fn is_excluded(path: &str) -> bool {
    EXCLUDED_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

fn parse_name_status(output: &str) -> Vec<ChangedFile> {
    output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let mut parts = line.splitn(2, char::is_whitespace);
            let code = parts.next()?;
            let path = parts.next()?.trim().to_string();
            let status = match code.chars().next()? {
                'A' => ChangeStatus::Added,
                'M' => ChangeStatus::Modified,
                'D' => ChangeStatus::Deleted,
                _ => ChangeStatus::Other,
            };
            Some(ChangedFile { path, status })
        })
        .collect()
}

fn parse_porcelain_output(output: &str) -> Result<Vec<WorktreeInfo>, WorktreeError> {
    let mut worktrees = Vec::new();
    let mut current_path: Option<PathBuf> = None;
    let mut current_head: Option<String> = None;
    let mut current_branch: Option<String> = None;

    for line in output.lines() {
        if line.is_empty() {
            if let (Some(path), Some(head)) = (current_path.take(), current_head.take()) {
                worktrees.push(WorktreeInfo {
                    path,
                    branch: current_branch.take(),
                    head_commit: head,
                });
            } else {
                current_path = None;
                current_head = None;
                current_branch = None;
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("worktree ") {
            current_path = Some(PathBuf::from(rest));
        } else if let Some(rest) = line.strip_prefix("HEAD ") {
            current_head = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("branch ") {
            current_branch = Some(rest.strip_prefix("refs/heads/").unwrap_or(rest).to_string());
        }
    }

    if let (Some(path), Some(head)) = (current_path, current_head) {
        worktrees.push(WorktreeInfo {
            path,
            branch: current_branch,
            head_commit: head,
        });
    }

    Ok(worktrees)
}
