//! Budget guard: pauses a plan once cumulative cost reaches its
//! effective limit (spec 4.1.9).

use catalyst_types::{Budget, Plan, PlanRunStatus};

/// Check the plan's accumulated cost against its configured budget.
/// Returns `Some(reason)` if the plan should be paused, `None` if it is
/// still within budget (or has no budget configured).
pub fn check_budget(plan: &Plan) -> Option<String> {
    let budget = plan.meta.budget.as_ref()?;
    let limit = budget.effective_limit()?;
    let spent = plan.total_cost_usd();
    if spent >= limit {
        Some(format!(
            "cumulative cost ${spent:.2} reached effective budget limit ${limit:.2}"
        ))
    } else {
        None
    }
}

/// Apply a budget pause to a plan's meta in place (spec 3.1: `paused_quota`).
pub fn apply_pause(plan: &mut Plan, reason: String) {
    plan.meta.status = Some(PlanRunStatus::PausedQuota);
    plan.meta.pause_reason = Some(reason);
}

/// True if a plan is currently paused for budget reasons and should not
/// be dispatched against.
pub fn is_paused(plan: &Plan) -> bool {
    matches!(plan.meta.status, Some(PlanRunStatus::PausedQuota))
}

/// Remaining headroom in USD before the budget trips, or `None` if
/// unlimited.
pub fn remaining_headroom(plan: &Plan, budget: &Budget) -> Option<f64> {
    let limit = budget.effective_limit()?;
    Some((limit - plan.total_cost_usd()).max(0.0))
}
