//! `catalyst report` command: show token usage and duration report for a plan.

use anyhow::{Context, Result};
use catalyst_store::{plan as plan_store, StoreRoot};
use catalyst_types::TaskStatus;

/// Run the report command.
pub fn run_report(root: &StoreRoot, slug: &str) -> Result<()> {
    let path = root.plan_path(slug);
    let plan = plan_store::load_plan(&path).with_context(|| format!("loading plan at {}", path.display()))?;

    // Plan summary.
    println!("Plan: {}", plan.meta.name);
    if let Some(status) = plan.meta.status {
        println!("Status: {status}");
    }
    println!();

    // Total cost.
    let total_cost = plan.total_cost_usd();
    println!("Cost:");
    println!("  Total:    ${total_cost:.4}");
    if let Some(ref budget) = plan.meta.budget {
        if let Some(limit) = budget.effective_limit() {
            let pct = if limit > 0.0 { (total_cost / limit) * 100.0 } else { 0.0 };
            println!("  Budget:   ${limit:.2} ({pct:.1}% used)");
        }
    }
    println!();

    // Per-task breakdown.
    let mut completed_count: usize = 0;
    let mut total_count: usize = 0;

    println!(
        "{:<30} {:<12} {:>8} {:>10} {:>10}",
        "TASK", "STATUS", "ATTEMPT", "COST", "API TIME"
    );
    println!("{}", "-".repeat(74));

    for task in plan.tasks() {
        total_count += 1;
        if task.status == TaskStatus::Completed {
            completed_count += 1;
        }

        let cost_str = match task.usage {
            Some(ref usage) => format!("${:.4}", usage.total_cost_usd),
            None => "-".to_string(),
        };
        let time_str = match task.usage {
            Some(ref usage) => format!("{}ms", usage.duration_api_ms),
            None => "-".to_string(),
        };

        let name_display = if task.name.len() > 28 {
            format!("{}...", &task.name[..25])
        } else {
            task.name.clone()
        };

        println!(
            "{:<30} {:<12} {:>8} {:>10} {:>10}",
            name_display, task.status, task.attempts, cost_str, time_str
        );
    }

    println!();
    println!(
        "Success rate: {}/{} ({:.0}%)",
        completed_count,
        total_count,
        if total_count > 0 { (completed_count as f64 / total_count as f64) * 100.0 } else { 0.0 }
    );

    Ok(())
}
