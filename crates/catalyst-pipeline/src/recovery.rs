//! Recovery scan (spec 4.2.1 step 3): plans left with an `in_progress`
//! task after a crash are reset to `pending` and handed back to the
//! Executor on the next loop iteration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use catalyst_store::{paths::StoreRoot, plan};
use catalyst_types::{PlanRunStatus, TaskStatus};

/// A plan found with at least one `in_progress` task, already reset to
/// `pending` and saved back to disk.
pub struct RecoveredPlan {
    pub path: PathBuf,
    pub plan_name: String,
}

/// Scan every plan YAML under `plans_dir`, reset any `in_progress`
/// tasks to `pending` (decrementing `attempts`, spec 4.2.1 step 3), and
/// return the set that needed recovery. Plans with `meta.status =
/// failed` are terminal (spec 4.2.6) and are skipped entirely.
pub fn recover_in_progress_plans(root: &StoreRoot) -> Result<Vec<RecoveredPlan>> {
    let dir = root.plans_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut recovered = Vec::new();
    let mut entries: Vec<PathBuf> = std::fs::read_dir(&dir)
        .with_context(|| format!("reading plans directory {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("yaml"))
        .collect();
    entries.sort();

    for path in entries {
        let mut loaded = match plan::load_plan(&path) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unparsable plan during recovery scan");
                continue;
            }
        };

        if loaded.meta.status == Some(PlanRunStatus::Failed) {
            continue;
        }

        let had_in_progress = loaded.tasks().any(|t| t.status == TaskStatus::InProgress);
        if !had_in_progress {
            continue;
        }

        for task in loaded.tasks_mut() {
            if task.status == TaskStatus::InProgress {
                task.status = TaskStatus::Pending;
                task.attempts = task.attempts.saturating_sub(1);
            }
        }

        plan::save_plan(&path, &loaded)
            .with_context(|| format!("saving recovered plan {}", path.display()))?;
        tracing::info!(path = %path.display(), "recovered in-progress plan after restart");
        recovered.push(RecoveredPlan {
            path,
            plan_name: loaded.meta.name,
        });
    }

    Ok(recovered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalyst_types::{PlanMeta, Section, Task};
    use chrono::Utc;
    use tempfile::tempdir;

    fn task(id: &str, status: TaskStatus, attempts: u32) -> Task {
        Task {
            id: id.into(),
            name: id.into(),
            description: String::new(),
            status,
            attempts,
            max_attempts: 3,
            depends_on: vec![],
            parallel_group: None,
            exclusive_resources: vec![],
            agent: None,
            validation_findings: None,
            model_used: None,
            usage: None,
        }
    }

    fn write_plan(root: &StoreRoot, slug: &str, status: Option<PlanRunStatus>, tasks: Vec<Task>) {
        let p = catalyst_types::Plan {
            meta: PlanMeta {
                name: slug.into(),
                plan_doc: None,
                created: Utc::now(),
                status,
                pause_reason: None,
                budget: None,
                model_escalation: None,
                validation: None,
                step_notifications: None,
                judge_model: None,
            },
            sections: vec![Section {
                id: "s1".into(),
                name: "s".into(),
                status: TaskStatus::Pending,
                tasks,
            }],
        };
        plan::save_plan(&root.plan_path(slug), &p).unwrap();
    }

    #[test]
    fn resets_in_progress_tasks_and_decrements_attempts() {
        let dir = tempdir().unwrap();
        let root = StoreRoot::new(dir.path());
        write_plan(
            &root,
            "0001-a",
            None,
            vec![task("t1", TaskStatus::InProgress, 2)],
        );
        let recovered = recover_in_progress_plans(&root).unwrap();
        assert_eq!(recovered.len(), 1);
        let reloaded = plan::load_plan(&root.plan_path("0001-a")).unwrap();
        let t = reloaded.find_task("t1").unwrap();
        assert_eq!(t.status, TaskStatus::Pending);
        assert_eq!(t.attempts, 1);
    }

    #[test]
    fn skips_plans_with_no_in_progress_tasks() {
        let dir = tempdir().unwrap();
        let root = StoreRoot::new(dir.path());
        write_plan(&root, "0001-a", None, vec![task("t1", TaskStatus::Completed, 1)]);
        let recovered = recover_in_progress_plans(&root).unwrap();
        assert!(recovered.is_empty());
    }

    #[test]
    fn skips_plans_marked_failed() {
        let dir = tempdir().unwrap();
        let root = StoreRoot::new(dir.path());
        write_plan(
            &root,
            "0001-a",
            Some(PlanRunStatus::Failed),
            vec![task("t1", TaskStatus::InProgress, 1)],
        );
        let recovered = recover_in_progress_plans(&root).unwrap();
        assert!(recovered.is_empty());
    }

    #[test]
    fn missing_plans_dir_returns_empty() {
        let dir = tempdir().unwrap();
        let root = StoreRoot::new(dir.path());
        let recovered = recover_in_progress_plans(&root).unwrap();
        assert!(recovered.is_empty());
    }
}
