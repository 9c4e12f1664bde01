//! `catalyst log` command: show the recorded attempt log for a task.

use anyhow::{Context, Result};
use catalyst_store::StoreRoot;

/// Run the log command.
///
/// Prints the per-attempt log `Orchestrator::with_log_dir` appends to
/// while dispatching this task, one line per attempt.
pub fn run_log(root: &StoreRoot, task_id: &str) -> Result<()> {
    let path = root.task_log_path(task_id);

    if !path.is_file() {
        println!("No log recorded for task {task_id}.");
        return Ok(());
    }

    let contents = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;

    if contents.trim().is_empty() {
        println!("No log recorded for task {task_id}.");
        return Ok(());
    }

    print!("{contents}");
    Ok(())
}
