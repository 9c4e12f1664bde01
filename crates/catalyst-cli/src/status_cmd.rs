//! `catalyst status` command: show plan progress and per-task status.

use anyhow::{Context, Result};
use catalyst_store::{plan as plan_store, StoreRoot};
use catalyst_types::{Plan, TaskStatus};

/// Run the status command.
///
/// When `slug` is `Some`, shows detailed status for that plan. When
/// `None`, lists every plan under the store's plans directory with a
/// progress summary.
pub fn run_status(root: &StoreRoot, slug: Option<&str>) -> Result<()> {
    match slug {
        Some(slug) => run_plan_status(root, slug),
        None => run_fleet_status(root),
    }
}

/// Show detailed status for a single plan.
fn run_plan_status(root: &StoreRoot, slug: &str) -> Result<()> {
    let path = root.plan_path(slug);
    let plan = plan_store::load_plan(&path).with_context(|| format!("loading plan at {}", path.display()))?;

    println!("Plan: {}", plan.meta.name);
    if let Some(status) = plan.meta.status {
        println!("Status: {status}");
    }
    if let Some(ref reason) = plan.meta.pause_reason {
        println!("Pause reason: {reason}");
    }
    if let Some(ref budget) = plan.meta.budget {
        if let Some(limit) = budget.effective_limit() {
            println!("Budget: ${limit:.2} effective limit");
        }
    }
    println!();

    // Progress summary.
    let (done, total) = progress_counts(&plan);
    println!("Progress: {done}/{total} terminal");
    println!(
        "  pending={} in_progress={} completed={} failed={} skipped={} suspended={}",
        count(&plan, TaskStatus::Pending),
        count(&plan, TaskStatus::InProgress),
        count(&plan, TaskStatus::Completed),
        count(&plan, TaskStatus::Failed),
        count(&plan, TaskStatus::Skipped),
        count(&plan, TaskStatus::Suspended),
    );
    println!();

    // Per-task listing.
    println!("Tasks:");
    for task in plan.tasks() {
        let icon = status_icon(task.status);
        println!(
            "  [{icon}] {} (attempt {}/{}, {})",
            task.name, task.attempts, task.max_attempts, task.status
        );
    }

    Ok(())
}

/// List all plans under the store's plans directory with a progress summary.
fn run_fleet_status(root: &StoreRoot) -> Result<()> {
    let slugs = list_plan_slugs(root)?;

    if slugs.is_empty() {
        println!("No plans found.");
        return Ok(());
    }

    println!("{:<38} {:<12} {:>10}", "NAME", "STATUS", "PROGRESS");
    println!("{}", "-".repeat(62));

    for slug in &slugs {
        let path = root.plan_path(slug);
        let plan = match plan_store::load_plan(&path) {
            Ok(plan) => plan,
            Err(e) => {
                eprintln!("  warning: failed to load {slug}: {e}");
                continue;
            }
        };
        let (done, total) = progress_counts(&plan);
        let status = plan.meta.status.map(|s| s.to_string()).unwrap_or_else(|| "active".to_string());
        let name_display = if plan.meta.name.len() > 36 {
            format!("{}...", &plan.meta.name[..33])
        } else {
            plan.meta.name.clone()
        };
        println!("{:<38} {:<12} {:>10}", name_display, status, format!("{done}/{total}"));
    }

    Ok(())
}

fn list_plan_slugs(root: &StoreRoot) -> Result<Vec<String>> {
    let dir = root.plans_dir();
    let mut slugs = Vec::new();
    if !dir.is_dir() {
        return Ok(slugs);
    }
    for entry in std::fs::read_dir(&dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("yaml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                slugs.push(stem.to_string());
            }
        }
    }
    slugs.sort();
    Ok(slugs)
}

fn progress_counts(plan: &Plan) -> (usize, usize) {
    let total = plan.tasks().count();
    let done = plan.tasks().filter(|t| t.status.is_terminal()).count();
    (done, total)
}

fn count(plan: &Plan, status: TaskStatus) -> usize {
    plan.tasks().filter(|t| t.status == status).count()
}

fn status_icon(status: TaskStatus) -> char {
    match status {
        TaskStatus::Pending => '.',
        TaskStatus::InProgress => '*',
        TaskStatus::Completed => '+',
        TaskStatus::Failed => '!',
        TaskStatus::Skipped => '-',
        TaskStatus::Suspended => '?',
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalyst_types::{PlanMeta, Section, Task};
    use chrono::Utc;

    fn plan_with(statuses: &[TaskStatus]) -> Plan {
        Plan {
            meta: PlanMeta {
                name: "p".into(),
                plan_doc: None,
                created: Utc::now(),
                status: None,
                pause_reason: None,
                budget: None,
                model_escalation: None,
                validation: None,
                step_notifications: None,
                judge_model: None,
            },
            sections: vec![Section {
                id: "s".into(),
                name: "s".into(),
                status: TaskStatus::Pending,
                tasks: statuses
                    .iter()
                    .enumerate()
                    .map(|(i, s)| Task {
                        id: format!("t{i}"),
                        name: format!("t{i}"),
                        description: String::new(),
                        status: *s,
                        attempts: 0,
                        max_attempts: 3,
                        depends_on: vec![],
                        parallel_group: None,
                        exclusive_resources: vec![],
                        agent: None,
                        validation_findings: None,
                        model_used: None,
                        usage: None,
                    })
                    .collect(),
            }],
        }
    }

    #[test]
    fn progress_counts_counts_only_terminal_statuses() {
        let plan = plan_with(&[TaskStatus::Completed, TaskStatus::Skipped, TaskStatus::Pending]);
        assert_eq!(progress_counts(&plan), (2, 3));
    }

    #[test]
    fn count_filters_by_status() {
        let plan = plan_with(&[TaskStatus::Failed, TaskStatus::Failed, TaskStatus::Pending]);
        assert_eq!(count(&plan, TaskStatus::Failed), 2);
        assert_eq!(count(&plan, TaskStatus::Pending), 1);
    }
}
