//! Deadlock detection and next-task selection (spec 4.1.11).

use std::collections::HashSet;

use catalyst_types::{Plan, Task, TaskStatus};

/// A plan is deadlocked when every non-terminal task is blocked on a
/// dependency that will never complete (failed with attempts exhausted,
/// or suspended). Returns the ids of the blocked tasks when deadlocked.
pub fn detect_deadlock(plan: &Plan) -> Option<Vec<String>> {
    let blocking: HashSet<&str> = plan
        .tasks()
        .filter(|t| {
            t.status == TaskStatus::Suspended
                || (t.status == TaskStatus::Failed && t.has_exhausted_attempts())
        })
        .map(|t| t.id.as_str())
        .collect();

    if blocking.is_empty() {
        return None;
    }

    let non_terminal: Vec<&Task> = plan
        .tasks()
        .filter(|t| !t.status.is_terminal() && t.status != TaskStatus::Suspended)
        .collect();

    if non_terminal.is_empty() {
        return None;
    }

    let all_blocked = non_terminal
        .iter()
        .all(|t| t.depends_on.iter().any(|d| blocking.contains(d.as_str())));

    if all_blocked {
        Some(non_terminal.iter().map(|t| t.id.clone()).collect())
    } else {
        None
    }
}

/// Find the next dispatchable task: pending, not exhausted, and every
/// dependency completed. Returns tasks in plan order; the caller decides
/// how many to dispatch concurrently.
pub fn find_next_tasks<'a>(plan: &'a Plan) -> Vec<&'a Task> {
    plan.tasks()
        .filter(|t| t.status == TaskStatus::Pending)
        .filter(|t| {
            t.depends_on.iter().all(|dep| {
                plan.find_task(dep)
                    .map(|d| d.status == TaskStatus::Completed || d.status == TaskStatus::Skipped)
                    .unwrap_or(false)
            })
        })
        .collect()
}
