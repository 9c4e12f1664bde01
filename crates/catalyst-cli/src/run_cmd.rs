//! `catalyst run` command: the Executor (spec 4.1) over a single plan
//! file. Resolves config, hands a harness and the loaded plan to the
//! dispatch loop, and persists the plan to disk after every round.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use catalyst_core::{Harness, Orchestrator, OrchestratorConfig, RunOutcome, WorktreeManager};
use catalyst_store::{plan as plan_store, StoreRoot};
use catalyst_types::{Budget, TaskStatus};

pub struct RunArgs {
    pub root: StoreRoot,
    pub harness: Arc<dyn Harness>,
    pub plan_path: PathBuf,
    pub dry_run: bool,
    pub resume_from: Option<String>,
    pub single_task: bool,
    pub parallel: bool,
    pub skip_smoke: bool,
    pub verbose: bool,
    pub max_budget_pct: Option<f64>,
    pub quota_ceiling: Option<f64>,
    pub reserved_budget: Option<f64>,
}

/// Sentinel returned by the `on_round` callback to stop `run_plan`
/// after exactly one dispatch round (`--single-task`), since
/// `Orchestrator::run_plan` otherwise loops to completion.
#[derive(Debug)]
struct SingleTaskStop;

impl fmt::Display for SingleTaskStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "single-task stop requested")
    }
}

impl std::error::Error for SingleTaskStop {}

pub async fn run(args: RunArgs) -> Result<()> {
    let config = OrchestratorConfig::resolve(&args.root.orchestrator_config_path())
        .context("resolving orchestrator config")?;

    let mut plan = plan_store::load_plan(&args.plan_path)
        .with_context(|| format!("loading plan at {}", args.plan_path.display()))?;

    apply_budget_overrides(&mut plan.meta.budget, &args);

    if let Some(ref resume_id) = args.resume_from {
        mark_completed_before(&mut plan, resume_id);
    }

    if args.dry_run {
        let pending: Vec<&str> = plan
            .tasks()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.id.as_str())
            .collect();
        println!("dry run: {} task(s) would be dispatched: {}", pending.len(), pending.join(", "));
        return Ok(());
    }

    let worktree = if args.parallel {
        Some(WorktreeManager::new(args.root.root(), None).map_err(|e| anyhow::anyhow!("{e}"))?)
    } else {
        None
    };

    let orchestrator = Orchestrator::new(
        args.harness,
        worktree,
        args.root.stop_semaphore(),
        config.task_timeout_secs,
        config.max_parallel_agents,
        plan.meta.model_escalation.as_ref().map(|m| m.starting_model.clone()).unwrap_or_else(|| "sonnet".to_string()),
    )
    .with_log_dir(args.root.logs_dir());

    let plan_path = args.plan_path.clone();
    let mut rounds: u32 = 0;
    let single_task = args.single_task;
    let outcome_result = orchestrator
        .run_plan(&mut plan, |p| {
            plan_store::save_plan(&plan_path, p)?;
            rounds += 1;
            if single_task && rounds >= 1 {
                anyhow::bail!(SingleTaskStop);
            }
            Ok(())
        })
        .await;

    let outcome = match outcome_result {
        Ok(outcome) => outcome,
        Err(e) if e.downcast_ref::<SingleTaskStop>().is_some() => {
            println!("single-task run complete, stopping after one dispatch round");
            RunOutcome::Completed
        }
        Err(e) => return Err(e),
    };

    plan_store::save_plan(&args.plan_path, &plan)?;

    if args.verbose {
        println!("plan {}: {outcome:?}", plan.meta.name);
    }

    match &outcome {
        RunOutcome::Completed => {
            if !args.skip_smoke {
                run_smoke_test(&args.root, &config)?;
            }
            println!("plan {} completed.", plan.meta.name);
        }
        RunOutcome::Stopped => println!("plan {} stopped (stop semaphore present).", plan.meta.name),
        RunOutcome::BudgetPaused(reason) => println!("plan {} paused on budget: {reason}", plan.meta.name),
        RunOutcome::Deadlocked(blocked) => {
            anyhow::bail!("plan {} deadlocked, blocked tasks: {}", plan.meta.name, blocked.join(", "));
        }
        RunOutcome::CircuitOpen { remaining_secs } => {
            anyhow::bail!("plan {} circuit breaker open, retry in {remaining_secs}s", plan.meta.name);
        }
    }

    Ok(())
}

/// Apply `--max-budget-pct`/`--quota-ceiling`/`--reserved-budget`
/// overrides on top of whatever budget the plan file already declares.
fn apply_budget_overrides(budget: &mut Option<Budget>, args: &RunArgs) {
    if args.max_budget_pct.is_none() && args.quota_ceiling.is_none() && args.reserved_budget.is_none() {
        return;
    }
    let mut effective = budget.unwrap_or_default();
    if let Some(pct) = args.max_budget_pct {
        effective.max_quota_percent = Some(pct);
    }
    if let Some(ceiling) = args.quota_ceiling {
        effective.quota_ceiling_usd = Some(ceiling);
    }
    if let Some(reserved) = args.reserved_budget {
        effective.reserved_budget_usd = Some(reserved);
    }
    *budget = Some(effective);
}

/// `--resume-from <id>`: treat every task before `resume_id` in plan
/// order as already done, so dispatch picks up from that task onward
/// instead of re-running work a prior invocation already finished.
fn mark_completed_before(plan: &mut catalyst_types::Plan, resume_id: &str) {
    let ids: Vec<String> = plan.tasks().map(|t| t.id.clone()).collect();
    let Some(cutoff) = ids.iter().position(|id| id == resume_id) else {
        tracing::warn!(resume_id, "resume-from task ID not found in plan, ignoring");
        return;
    };
    for id in &ids[..cutoff] {
        if let Some(task) = plan.find_task_mut(id) {
            if !task.status.is_terminal() {
                task.status = TaskStatus::Completed;
            }
        }
    }
}

fn run_smoke_test(root: &StoreRoot, config: &OrchestratorConfig) -> Result<()> {
    let Some(command) = config.effective_smoke_command() else {
        return Ok(());
    };
    println!("running smoke test: {command}");
    let status = std::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(root.root())
        .status()
        .with_context(|| format!("spawning smoke test command: {command}"))?;
    if !status.success() {
        println!("warning: smoke test command exited non-zero ({status})");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalyst_types::{Plan, PlanMeta, Section, Task};
    use chrono::Utc;

    fn sample_plan() -> Plan {
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
                id: "s1".into(),
                name: "s".into(),
                status: TaskStatus::Pending,
                tasks: vec![
                    Task {
                        id: "a".into(),
                        name: "a".into(),
                        description: String::new(),
                        status: TaskStatus::Pending,
                        attempts: 0,
                        max_attempts: 3,
                        depends_on: vec![],
                        parallel_group: None,
                        exclusive_resources: vec![],
                        agent: None,
                        validation_findings: None,
                        model_used: None,
                        usage: None,
                    },
                    Task {
                        id: "b".into(),
                        name: "b".into(),
                        description: String::new(),
                        status: TaskStatus::Pending,
                        attempts: 0,
                        max_attempts: 3,
                        depends_on: vec!["a".into()],
                        parallel_group: None,
                        exclusive_resources: vec![],
                        agent: None,
                        validation_findings: None,
                        model_used: None,
                        usage: None,
                    },
                ],
            }],
        }
    }

    #[test]
    fn mark_completed_before_marks_only_earlier_tasks() {
        let mut plan = sample_plan();
        mark_completed_before(&mut plan, "b");
        assert_eq!(plan.find_task("a").unwrap().status, TaskStatus::Completed);
        assert_eq!(plan.find_task("b").unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn mark_completed_before_ignores_unknown_id() {
        let mut plan = sample_plan();
        mark_completed_before(&mut plan, "nonexistent");
        assert_eq!(plan.find_task("a").unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn apply_budget_overrides_is_noop_with_no_flags() {
        let mut budget = None;
        let args = RunArgs {
            root: StoreRoot::new("/tmp"),
            harness: Arc::new(NoopHarnessForTest),
            plan_path: "/tmp/p.yaml".into(),
            dry_run: false,
            resume_from: None,
            single_task: false,
            parallel: false,
            skip_smoke: false,
            verbose: false,
            max_budget_pct: None,
            quota_ceiling: None,
            reserved_budget: None,
        };
        apply_budget_overrides(&mut budget, &args);
        assert!(budget.is_none());
    }

    #[test]
    fn apply_budget_overrides_sets_only_the_given_fields() {
        let mut budget = None;
        let args = RunArgs {
            root: StoreRoot::new("/tmp"),
            harness: Arc::new(NoopHarnessForTest),
            plan_path: "/tmp/p.yaml".into(),
            dry_run: false,
            resume_from: None,
            single_task: false,
            parallel: false,
            skip_smoke: false,
            verbose: false,
            max_budget_pct: None,
            quota_ceiling: Some(50.0),
            reserved_budget: None,
        };
        apply_budget_overrides(&mut budget, &args);
        let b = budget.unwrap();
        assert_eq!(b.quota_ceiling_usd, Some(50.0));
        assert_eq!(b.max_quota_percent, None);
    }

    struct NoopHarnessForTest;

    #[async_trait::async_trait]
    impl Harness for NoopHarnessForTest {
        fn name(&self) -> &str {
            "noop"
        }
        async fn run(&self, _invocation: &catalyst_core::AgentInvocation) -> Result<catalyst_types::TaskResult> {
            unreachable!("not called in these tests")
        }
    }
}
