//! Shared test fixtures for orchestrator/pipeline/bridge/cli integration
//! tests.
//!
//! Provides a throwaway project directory -- a real git repository with
//! the store's required subdirectories already created -- instead of the
//! shared Postgres container this crate used to manage. Every test gets
//! its own [`TestProject`]; nothing is shared across tests.

use std::path::{Path, PathBuf};
use std::process::Command;

use catalyst_store::StoreRoot;
use catalyst_types::Plan;
use tempfile::TempDir;

/// A throwaway project root: a temp directory, initialized as a git
/// repository with one commit, with every directory
/// [`StoreRoot::required_dirs`] expects already created.
///
/// The `TempDir` is removed when this value is dropped, so keep it
/// alive for as long as the test needs the filesystem state.
pub struct TestProject {
    dir: TempDir,
    root: StoreRoot,
}

impl TestProject {
    /// Create a new project fixture.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        init_git_repo(dir.path());

        let root = StoreRoot::new(dir.path());
        for d in root.required_dirs() {
            std::fs::create_dir_all(&d).unwrap_or_else(|e| panic!("failed to create {}: {e}", d.display()));
        }

        Self { dir, root }
    }

    /// The project root path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The [`StoreRoot`] handle for this project.
    pub fn root(&self) -> &StoreRoot {
        &self.root
    }

    /// Write `plan` to `.claude/plans/<slug>.yaml`.
    pub fn write_plan(&self, slug: &str, plan: &Plan) {
        let path = self.root.plan_path(slug);
        catalyst_store::plan::save_plan(&path, plan).unwrap_or_else(|e| panic!("failed to write plan {slug}: {e}"));
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize `path` as a git repository with a committed `README.md`,
/// the way every `WorktreeManager` test needs a real repo to operate
/// against.
pub fn init_git_repo(path: &Path) {
    let run = |args: &[&str]| {
        let output = Command::new("git")
            .args(args)
            .current_dir(path)
            .output()
            .unwrap_or_else(|e| panic!("git {} failed: {e}", args.join(" ")));
        assert!(output.status.success(), "git {} failed: {}", args.join(" "), String::from_utf8_lossy(&output.stderr));
    };

    run(&["init"]);
    run(&["config", "user.email", "test@catalyst.dev"]);
    run(&["config", "user.name", "Catalyst Test"]);

    std::fs::write(path.join("README.md"), "# Test repo\n").expect("failed to write README.md");
    run(&["add", "."]);
    run(&["commit", "-m", "Initial commit"]);
}

/// A worktree-base directory sibling to a [`TestProject`], for tests
/// that want `WorktreeManager::new`'s second argument to be explicit
/// rather than derived.
pub fn temp_worktree_base() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let path = dir.path().to_path_buf();
    (dir, path)
}
