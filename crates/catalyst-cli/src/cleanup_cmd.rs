//! `catalyst cleanup <plan>` command: remove worktrees left behind by a
//! plan's parallel-group tasks.

use anyhow::{Context, Result};
use catalyst_core::WorktreeManager;
use catalyst_store::{plan as plan_store, StoreRoot};
use catalyst_types::TaskStatus;

/// Run the cleanup command.
pub fn run_cleanup(root: &StoreRoot, slug: &str, all: bool) -> Result<()> {
    let path = root.plan_path(slug);
    let plan = plan_store::load_plan(&path).with_context(|| format!("loading plan at {}", path.display()))?;

    let worktree_manager = WorktreeManager::new(root.root(), None).map_err(|e| anyhow::anyhow!("{e}"))?;
    let worktrees = worktree_manager.list_worktrees().map_err(|e| anyhow::anyhow!("{e}"))?;

    let mut removed = 0;
    let mut skipped = 0;

    for task in plan.tasks() {
        let dominated_by_policy = all || task.status == TaskStatus::Completed;
        if !dominated_by_policy {
            skipped += 1;
            continue;
        }

        let branch = WorktreeManager::branch_name(&task.id);
        let Some(info) = worktrees.iter().find(|w| w.branch.as_deref() == Some(branch.as_str())) else {
            skipped += 1;
            continue;
        };

        match worktree_manager.remove_worktree(&info.path) {
            Ok(()) => {
                println!("  Removed: {} ({})", task.name, info.path.display());
                removed += 1;
            }
            Err(e) => {
                eprintln!("  Warning: failed to remove worktree for {}: {e}", task.name);
            }
        }
    }

    let _ = worktree_manager.cleanup_stale();

    println!("\nCleanup complete: {removed} worktree(s) removed, {skipped} skipped.");

    Ok(())
}
