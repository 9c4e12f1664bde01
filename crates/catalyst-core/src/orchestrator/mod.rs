//! Plan executor main loop: sequential dispatch (spec 4.1.2) and
//! parallel-group worktree dispatch (spec 4.1.3).
//!
//! No database: every iteration mutates the in-memory `Plan` and the
//! caller persists it via `catalyst_store::plan::save_plan` after each
//! round, so a crash mid-run resumes from the last saved state.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use catalyst_types::{ModelEscalationConfig, Plan, Task, TaskStatus, Verdict};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use regex::Regex;
use tokio::sync::Semaphore;

use crate::budget;
use crate::circuit::CircuitBreaker;
use crate::deadlock::{detect_deadlock, find_next_tasks};
use crate::escalation::effective_model;
use crate::harness::{AgentInvocation, Harness, OutputFormat, PermissionMode};
use crate::prompt::{assemble_prompt, resolve_role, AgentRole, PermissionProfile, PromptInputs};
use crate::validation::parse_validator_output;
use crate::worktree::WorktreeManager;

/// Outcome of a single `run_plan` call. The pipeline (spec 4.2) decides
/// what to do next based on this: a completed plan moves the backlog item
/// to done, a deadlocked or paused plan gets surfaced to the operator.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    /// Stop semaphore was present; the loop exited without finishing.
    Stopped,
    /// Budget guard tripped; `plan.meta.pause_reason` carries the detail.
    BudgetPaused(String),
    /// No dispatchable task remains and the named tasks can never run.
    Deadlocked(Vec<String>),
    /// Circuit breaker is open; retry after this many seconds.
    CircuitOpen { remaining_secs: u64 },
}

/// Everything the executor needs to run one plan to completion (or to a
/// pause/stop point).
pub struct Orchestrator {
    harness: Arc<dyn Harness>,
    worktree: Option<WorktreeManager>,
    stop_semaphore: PathBuf,
    task_timeout_secs: u64,
    max_parallel_agents: usize,
    base_model: String,
    /// Directory to append a per-task attempt log to (`task-{id}.log`),
    /// matching `catalyst_store::paths::StoreRoot::task_log_path`'s
    /// naming. `None` skips logging (used by tests).
    log_dir: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(
        harness: Arc<dyn Harness>,
        worktree: Option<WorktreeManager>,
        stop_semaphore: PathBuf,
        task_timeout_secs: u64,
        max_parallel_agents: usize,
        base_model: String,
    ) -> Self {
        Self {
            harness,
            worktree,
            stop_semaphore,
            task_timeout_secs,
            max_parallel_agents,
            base_model,
            log_dir: None,
        }
    }

    pub fn with_log_dir(mut self, log_dir: PathBuf) -> Self {
        self.log_dir = Some(log_dir);
        self
    }

    /// Append one line recording this attempt's outcome. Best-effort:
    /// a write failure here must never fail the dispatch itself.
    fn log_attempt(&self, task: &Task) {
        let Some(ref dir) = self.log_dir else { return };
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!(error = %e, "failed to create task log directory");
            return;
        }
        let path = dir.join(format!("task-{}.log", task.id));
        let cost = task.usage.map(|u| u.total_cost_usd).unwrap_or(0.0);
        let line = format!(
            "[{}] attempt {} -> {} (model={}, cost=${cost:.4})\n",
            chrono::Utc::now().to_rfc3339(),
            task.attempts,
            task.status,
            task.model_used.as_deref().unwrap_or("?"),
        );
        use std::io::Write;
        match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(mut file) => {
                if let Err(e) = file.write_all(line.as_bytes()) {
                    tracing::warn!(error = %e, path = %path.display(), "failed to append task log");
                }
            }
            Err(e) => tracing::warn!(error = %e, path = %path.display(), "failed to open task log"),
        }
    }

    /// Run `plan` until it completes, stalls, or is told to stop.
    /// `on_round` is invoked after every dispatch round with the
    /// in-memory plan so the caller can persist it (spec 3.7: the
    /// executor owns the plan file).
    pub async fn run_plan(
        &self,
        plan: &mut Plan,
        mut on_round: impl FnMut(&Plan) -> Result<()>,
    ) -> Result<RunOutcome> {
        let mut circuit = CircuitBreaker::default();

        loop {
            if self.stop_semaphore.exists() {
                tracing::info!("stop semaphore present, halting dispatch");
                return Ok(RunOutcome::Stopped);
            }

            if let Some(reason) = budget::check_budget(plan) {
                budget::apply_pause(plan, reason.clone());
                on_round(plan)?;
                return Ok(RunOutcome::BudgetPaused(reason));
            }

            if plan.all_tasks_terminal() {
                return Ok(RunOutcome::Completed);
            }

            if let Some(blocked) = detect_deadlock(plan) {
                return Ok(RunOutcome::Deadlocked(blocked));
            }

            let now = SystemTime::now();
            if let Some(remaining) = circuit.remaining_cooldown(now) {
                return Ok(RunOutcome::CircuitOpen {
                    remaining_secs: remaining.as_secs(),
                });
            }

            let ready_ids: Vec<String> = find_next_tasks(plan).iter().map(|t| t.id.clone()).collect();
            if ready_ids.is_empty() {
                // Nothing ready and not deadlocked: a validation retry or an
                // in-flight parallel group elsewhere will eventually free one up.
                // In this single-threaded-per-plan model that means we're stuck;
                // surface it the same way a deadlock would be.
                return Ok(RunOutcome::Deadlocked(vec![]));
            }

            let (grouped, ungrouped) = partition_by_group(plan, &ready_ids);

            let interrupted = if !ungrouped.is_empty() {
                let task_id = &ungrouped[0];
                self.dispatch_one(plan, task_id, &mut circuit).await?
            } else {
                let mut interrupted = false;
                for (_group, ids) in grouped {
                    if self.dispatch_parallel_group(plan, &ids, &mut circuit).await? {
                        interrupted = true;
                        break;
                    }
                }
                interrupted
            };

            on_round(plan)?;

            if interrupted {
                return Ok(RunOutcome::Stopped);
            }
        }
    }

    /// Run one task in place (no worktree isolation): spec 4.1.2's
    /// sequential path. Returns `true` if a rate-limit wait was aborted
    /// by SIGINT (spec 4.1.7), in which case the caller should stop.
    async fn dispatch_one(
        &self,
        plan: &mut Plan,
        task_id: &str,
        circuit: &mut CircuitBreaker,
    ) -> Result<bool> {
        let plan_doc_path = plan.meta.plan_doc.as_ref().map(PathBuf::from);
        let model_escalation = plan.meta.model_escalation.clone();
        let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let task_snapshot = plan
            .find_task(task_id)
            .with_context(|| format!("task {task_id} disappeared before dispatch"))?
            .clone();

        let invocation = self.build_invocation(
            &task_snapshot,
            model_escalation.as_ref(),
            plan_doc_path.as_deref(),
            &working_dir,
            None,
        );

        {
            let task = plan.find_task_mut(task_id).expect("task present");
            task.status = TaskStatus::InProgress;
            task.attempts += 1;
            task.model_used = Some(invocation.model.clone());
        }

        let result = self.harness.run(&invocation).await;

        let task = plan.find_task_mut(task_id).expect("task present");
        let rate_limit_reset = apply_result(task, result, circuit);
        self.log_attempt(task);
        let completed = task.status == TaskStatus::Completed;

        if let Some(reset) = rate_limit_reset {
            if self.wait_for_rate_limit(reset).await {
                return Ok(true);
            }
        }

        if completed {
            self.run_validation_gate(plan, task_id).await?;
        }

        Ok(false)
    }

    /// Sleep until `reset + 30s` (spec 4.1.7). Returns `true` if the
    /// wait was aborted by SIGINT instead of running to completion.
    async fn wait_for_rate_limit(&self, reset: DateTime<Utc>) -> bool {
        let target = reset + chrono::Duration::seconds(30);
        let wait = (target - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tracing::info!(wait_secs = wait.as_secs(), reset = %target.to_rfc3339(), "rate limited, sleeping until reset");

        tokio::select! {
            _ = tokio::time::sleep(wait) => false,
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("rate-limit wait aborted by SIGINT");
                true
            }
        }
    }

    /// Run every ready task in `ids` concurrently, each in its own
    /// worktree, then merge each branch's diff back into the main repo
    /// (spec 4.1.3, 5). Falls back to sequential dispatch with no
    /// isolation if no [`WorktreeManager`] was configured, or if the
    /// group's tasks conflict over the same files. Returns `true` if a
    /// rate-limit wait was aborted by SIGINT.
    async fn dispatch_parallel_group(
        &self,
        plan: &mut Plan,
        ids: &[String],
        circuit: &mut CircuitBreaker,
    ) -> Result<bool> {
        let Some(worktree) = &self.worktree else {
            tracing::warn!("parallel group dispatched without a worktree manager, running inline");
            for id in ids {
                if self.dispatch_one(plan, id, circuit).await? {
                    return Ok(true);
                }
            }
            return Ok(false);
        };

        if group_has_conflict(plan, ids) {
            tracing::info!(group = ?ids, "parallel group tasks reference overlapping paths, running sequentially");
            for id in ids {
                if self.dispatch_one(plan, id, circuit).await? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }

        let semaphore = Arc::new(Semaphore::new(self.max_parallel_agents.max(1)));
        let fork_point = worktree.head_commit()?;
        let plan_doc_path = plan.meta.plan_doc.as_ref().map(PathBuf::from);
        let model_escalation = plan.meta.model_escalation.clone();

        let mut invocations = Vec::new();
        for id in ids {
            let branch = WorktreeManager::branch_name(id);
            let info = worktree.create_worktree(&branch)?;

            let task_snapshot = plan.find_task(id).expect("task present").clone();
            let sibling_ids: Vec<String> = ids.iter().filter(|s| s.as_str() != id).cloned().collect();
            let ctx = crate::prompt::SubagentContext {
                worker_id: id.clone(),
                worktree_path: info.path.clone(),
                sibling_task_ids: sibling_ids,
            };

            let invocation = self.build_invocation(
                &task_snapshot,
                model_escalation.as_ref(),
                plan_doc_path.as_deref(),
                &info.path,
                Some(&ctx),
            );

            let task = plan.find_task_mut(id).expect("task present");
            task.status = TaskStatus::InProgress;
            task.attempts += 1;
            task.model_used = Some(invocation.model.clone());

            invocations.push((id.clone(), branch, info.path.clone(), invocation));
        }

        let harness = Arc::clone(&self.harness);
        let futures = invocations.into_iter().map(|(id, branch, path, invocation)| {
            let harness = Arc::clone(&harness);
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");
                let result = harness.run(&invocation).await;
                (id, branch, path, result)
            }
        });

        let outcomes = join_all(futures).await;

        // spec 4.1.3: any task reporting rate-limited abandons the whole
        // round -- no merges happen, every group task goes back to
        // pending with its attempt refunded, and the group retries after
        // waiting on the latest reset time.
        let latest_reset = outcomes
            .iter()
            .filter_map(|(_, _, _, result)| match result {
                Ok(r) if r.rate_limited => {
                    Some(r.rate_limit_reset_time.unwrap_or_else(|| Utc::now() + chrono::Duration::hours(1)))
                }
                _ => None,
            })
            .max();

        if let Some(reset) = latest_reset {
            for (id, branch, path, _) in &outcomes {
                let task = plan.find_task_mut(id).expect("task present");
                task.attempts = task.attempts.saturating_sub(1);
                task.status = TaskStatus::Pending;
                self.log_attempt(task);
                let _ = worktree.remove_worktree(path);
                let _ = worktree.delete_branch(branch);
            }

            return Ok(self.wait_for_rate_limit(reset).await);
        }

        for (id, branch, path, result) in outcomes {
            if let Ok(ref task_result) = result {
                if task_result.success {
                    let _ = worktree.commit_all(&path, &format!("catalyst: {id}"));
                    match worktree.diff_merge(&branch, &fork_point) {
                        Ok(applied) => {
                            tracing::info!(task_id = %id, files = applied.len(), "merged parallel task");
                        }
                        Err(e) => {
                            tracing::error!(task_id = %id, error = %e, "diff merge failed");
                        }
                    }
                }
            }

            let task = plan.find_task_mut(&id).expect("task present");
            apply_result(task, result, circuit);
            self.log_attempt(task);
            let completed = task.status == TaskStatus::Completed;

            let _ = worktree.remove_worktree(&path);
            let _ = worktree.delete_branch(&branch);

            if completed {
                self.run_validation_gate(plan, &id).await?;
            }
        }

        Ok(false)
    }

    /// After a task's primary agent completes, dispatch any configured
    /// validators and gate on their aggregated verdict (spec 4.1.12).
    async fn run_validation_gate(&self, plan: &mut Plan, task_id: &str) -> Result<()> {
        let Some(validation) = plan.meta.validation.clone() else {
            return Ok(());
        };
        if !validation.enabled || !validation.run_after.iter().any(|t| t == task_id) {
            return Ok(());
        }
        if validation.validators.is_empty() {
            return Ok(());
        }

        let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let plan_doc_path = plan.meta.plan_doc.as_ref().map(PathBuf::from);

        let mut findings = Vec::new();
        let mut worst = Verdict::Pass;

        for validator in &validation.validators {
            let task = plan.find_task(task_id).expect("task present").clone();
            let role = AgentRole::Validator(validator.clone());
            let prompt = assemble_prompt(&PromptInputs {
                role: &role,
                role_markdown: None,
                subagent_context: None,
                task: &task,
                plan_doc_path: plan_doc_path.as_deref(),
                retry_findings: None,
            });

            let model = plan
                .meta
                .model_escalation
                .as_ref()
                .map(|c| c.validation_model.clone())
                .unwrap_or_else(|| self.base_model.clone());

            let invocation = AgentInvocation {
                task_id: format!("{task_id}-validate-{validator}"),
                prompt,
                model,
                working_dir: working_dir.clone(),
                add_dirs: vec![],
                allowed_tools: role.permission_profile().allowed_tools().to_string(),
                permission_mode: PermissionMode::Default,
                output_format: OutputFormat::Json,
                timeout_secs: self.task_timeout_secs,
                env_vars: Default::default(),
            };

            let result = self.harness.run(&invocation).await;
            if let Ok(task_result) = result {
                let (mut parsed_findings, verdict) = parse_validator_output(&task_result.message);
                findings.append(&mut parsed_findings);
                worst = Verdict::aggregate([worst, verdict]);
            } else {
                worst = Verdict::Fail;
            }
        }

        let task = plan.find_task_mut(task_id).expect("task present");
        task.validation_findings = Some(findings);

        if worst == Verdict::Fail {
            if task.has_exhausted_attempts() {
                task.status = TaskStatus::Failed;
            } else {
                task.status = TaskStatus::Pending;
            }
        }

        Ok(())
    }

    fn build_invocation(
        &self,
        task: &Task,
        model_escalation: Option<&ModelEscalationConfig>,
        plan_doc_path: Option<&std::path::Path>,
        working_dir: &std::path::Path,
        subagent_context: Option<&crate::prompt::SubagentContext>,
    ) -> AgentInvocation {
        let role = resolve_role(task);
        let retry_findings = if task.attempts > 0 {
            task.validation_findings.as_deref()
        } else {
            None
        };

        let prompt = assemble_prompt(&PromptInputs {
            role: &role,
            role_markdown: None,
            subagent_context,
            task,
            plan_doc_path,
            retry_findings,
        });

        let model = effective_model(
            model_escalation
                .map(|c| c.starting_model.as_str())
                .unwrap_or(&self.base_model),
            task.attempts + 1,
            model_escalation,
        );

        let permission_mode = match role.permission_profile() {
            PermissionProfile::Write => PermissionMode::AcceptEdits,
            _ => PermissionMode::Default,
        };

        AgentInvocation {
            task_id: task.id.clone(),
            prompt,
            model,
            working_dir: working_dir.to_path_buf(),
            add_dirs: vec![],
            allowed_tools: role.permission_profile().allowed_tools().to_string(),
            permission_mode,
            output_format: OutputFormat::Json,
            timeout_secs: self.task_timeout_secs,
            env_vars: Default::default(),
        }
    }
}

fn partition_by_group(plan: &Plan, ready_ids: &[String]) -> (Vec<(String, Vec<String>)>, Vec<String>) {
    let mut groups: std::collections::BTreeMap<String, Vec<String>> = Default::default();
    let mut ungrouped = Vec::new();

    for id in ready_ids {
        let task = plan.find_task(id).expect("ready task exists");
        match &task.parallel_group {
            Some(group) => groups.entry(group.clone()).or_default().push(id.clone()),
            None => ungrouped.push(id.clone()),
        }
    }

    (groups.into_iter().collect(), ungrouped)
}

/// Source-tree path prefixes recognized when scanning task text for
/// referenced files (spec 4.1.3's conflict check).
const PATH_PREFIXES: &[&str] = &[
    "src", "lib", "crates", "tests", "test", "app", "pkg", "cmd", "internal", "components", "scripts",
];

/// Common source/config extensions recognized alongside `PATH_PREFIXES`.
const PATH_EXTENSIONS: &str = "rs|ts|tsx|js|jsx|py|go|java|rb|yaml|yml|json|toml|md";

fn path_reference_regex() -> Option<Regex> {
    let prefixes = PATH_PREFIXES.join("|");
    Regex::new(&format!(r"(?:{prefixes})(?:/[\w.-]+)+\.(?:{PATH_EXTENSIONS})")).ok()
}

/// Deterministically extract file paths mentioned in `text` -- a plain
/// scan for common source-tree prefixes and extensions, not a general
/// path parser.
fn extract_referenced_paths(text: &str) -> HashSet<String> {
    let Some(re) = path_reference_regex() else {
        return HashSet::new();
    };
    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// True if any two tasks in `ids` reference overlapping resources, via
/// either their `exclusive_resources` list or paths mentioned in their
/// name/description (spec 4.1.3: "parse each task description for
/// referenced file paths... compare their `exclusive_resources`
/// sets... any pairwise overlap forces the group to run sequentially").
fn group_has_conflict(plan: &Plan, ids: &[String]) -> bool {
    let resource_sets: Vec<HashSet<String>> = ids
        .iter()
        .map(|id| {
            let task = plan.find_task(id).expect("ready task exists");
            let mut resources: HashSet<String> = task.exclusive_resources.iter().cloned().collect();
            resources.extend(extract_referenced_paths(&task.name));
            resources.extend(extract_referenced_paths(&task.description));
            resources
        })
        .collect();

    for i in 0..resource_sets.len() {
        for other in &resource_sets[i + 1..] {
            if resource_sets[i].intersection(other).next().is_some() {
                return true;
            }
        }
    }
    false
}

/// Apply a harness result (or error) to `task` in place: status
/// transition, usage accumulation, circuit-breaker feedback. Returns
/// the rate-limit reset instant to wait on, if the result reported one
/// (spec 4.1.7).
fn apply_result(
    task: &mut Task,
    result: Result<catalyst_types::TaskResult>,
    circuit: &mut CircuitBreaker,
) -> Option<DateTime<Utc>> {
    let now = SystemTime::now();

    let task_result = match result {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(task_id = %task.id, error = %e, "harness run errored");
            circuit.record_failure(now);
            task.status = if task.has_exhausted_attempts() {
                TaskStatus::Failed
            } else {
                TaskStatus::Pending
            };
            return None;
        }
    };

    let mut usage = task.usage.unwrap_or_default();
    usage.add(&task_result.usage);
    task.usage = Some(usage);

    if task_result.rate_limited {
        // Rate limiting is not a task-quality failure: don't burn a retry
        // attempt or trip the circuit breaker, just fall back to pending
        // and tell the caller how long to wait before retrying.
        task.attempts = task.attempts.saturating_sub(1);
        task.status = TaskStatus::Pending;
        return Some(task_result.rate_limit_reset_time.unwrap_or_else(|| Utc::now() + chrono::Duration::hours(1)));
    }

    if task_result.success {
        circuit.record_success();
        task.status = TaskStatus::Completed;
    } else {
        circuit.record_failure(now);
        task.status = if task.has_exhausted_attempts() {
            TaskStatus::Failed
        } else {
            TaskStatus::Pending
        };
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use catalyst_types::{PlanMeta, Section, TaskResult, TaskUsage};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedHarness {
        calls: AtomicUsize,
        responses: Vec<Result<TaskResult>>,
    }

    impl ScriptedHarness {
        fn always_success() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                responses: vec![],
            }
        }
    }

    #[async_trait]
    impl Harness for ScriptedHarness {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn run(&self, _invocation: &AgentInvocation) -> Result<TaskResult> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(r) = self.responses.get(idx) {
                match r {
                    Ok(tr) => Ok(tr.clone()),
                    Err(e) => Err(anyhow::anyhow!("{e}")),
                }
            } else {
                Ok(success_result())
            }
        }
    }

    fn success_result() -> TaskResult {
        TaskResult {
            success: true,
            message: "done".to_string(),
            duration_s: 1.0,
            plan_modified: true,
            rate_limited: false,
            rate_limit_reset_time: None,
            usage: TaskUsage {
                total_cost_usd: 0.05,
                ..Default::default()
            },
        }
    }

    fn failure_result() -> TaskResult {
        TaskResult {
            success: false,
            message: "failed".to_string(),
            duration_s: 1.0,
            plan_modified: false,
            rate_limited: false,
            rate_limit_reset_time: None,
            usage: TaskUsage::default(),
        }
    }

    fn task(id: &str, deps: &[&str]) -> Task {
        Task {
            id: id.to_string(),
            name: format!("Task {id}"),
            description: "do something".to_string(),
            status: TaskStatus::Pending,
            attempts: 0,
            max_attempts: 3,
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            parallel_group: None,
            exclusive_resources: vec![],
            agent: None,
            validation_findings: None,
            model_used: None,
            usage: None,
        }
    }

    fn plan(tasks: Vec<Task>) -> Plan {
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
                tasks,
            }],
        }
    }

    fn orchestrator(harness: Arc<dyn Harness>, stop_path: PathBuf) -> Orchestrator {
        Orchestrator::new(harness, None, stop_path, 600, 4, "sonnet".to_string())
    }

    #[tokio::test]
    async fn completes_a_simple_two_task_plan() {
        let dir = tempfile::tempdir().unwrap();
        let harness: Arc<dyn Harness> = Arc::new(ScriptedHarness::always_success());
        let orch = orchestrator(harness, dir.path().join(".stop"));

        let mut p = plan(vec![task("a", &[]), task("b", &["a"])]);
        let outcome = orch.run_plan(&mut p, |_| Ok(())).await.unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
        assert!(p.tasks().all(|t| t.status == TaskStatus::Completed));
    }

    #[tokio::test]
    async fn with_log_dir_appends_an_attempt_line_per_task() {
        let dir = tempfile::tempdir().unwrap();
        let harness: Arc<dyn Harness> = Arc::new(ScriptedHarness::always_success());
        let log_dir = dir.path().join("logs");
        let orch = orchestrator(harness, dir.path().join(".stop")).with_log_dir(log_dir.clone());

        let mut p = plan(vec![task("a", &[])]);
        orch.run_plan(&mut p, |_| Ok(())).await.unwrap();

        let log = std::fs::read_to_string(log_dir.join("task-a.log")).unwrap();
        assert!(log.contains("attempt 1"));
        assert!(log.contains("completed"));
    }

    #[tokio::test]
    async fn stop_semaphore_halts_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let stop_path = dir.path().join(".stop");
        std::fs::write(&stop_path, b"").unwrap();

        let harness: Arc<dyn Harness> = Arc::new(ScriptedHarness::always_success());
        let orch = orchestrator(harness, stop_path);

        let mut p = plan(vec![task("a", &[])]);
        let outcome = orch.run_plan(&mut p, |_| Ok(())).await.unwrap();
        assert_eq!(outcome, RunOutcome::Stopped);
        assert_eq!(p.find_task("a").unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn exhausted_failure_eventually_deadlocks_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let harness: Arc<dyn Harness> = Arc::new(ScriptedHarness {
            calls: AtomicUsize::new(0),
            responses: vec![Ok(failure_result()), Ok(failure_result()), Ok(failure_result())],
        });
        let orch = orchestrator(harness, dir.path().join(".stop"));

        let mut t = task("a", &[]);
        t.max_attempts = 3;
        let mut p = plan(vec![t, task("b", &["a"])]);

        let outcome = orch.run_plan(&mut p, |_| Ok(())).await.unwrap();
        match outcome {
            RunOutcome::Deadlocked(blocked) => assert!(blocked.contains(&"b".to_string())),
            other => panic!("expected deadlock, got {other:?}"),
        }
        assert_eq!(p.find_task("a").unwrap().status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn rate_limited_result_does_not_consume_an_attempt() {
        let rate_limited = TaskResult {
            success: false,
            message: "usage limit reached|9999999999".to_string(),
            duration_s: 0.5,
            plan_modified: false,
            rate_limited: true,
            rate_limit_reset_time: None,
            usage: TaskUsage::default(),
        };
        let mut t = task("a", &[]);
        let mut circuit = CircuitBreaker::default();
        let reset = apply_result(&mut t, Ok(rate_limited), &mut circuit);
        assert_eq!(t.status, TaskStatus::Pending);
        assert_eq!(t.attempts, 0);
        // no rate_limit_reset_time on the result: falls back to roughly
        // one hour out rather than returning None.
        assert!(reset.is_some());
        assert!(reset.unwrap() > Utc::now() + chrono::Duration::minutes(55));
    }

    #[test]
    fn extract_referenced_paths_finds_source_tree_paths() {
        let found = extract_referenced_paths("update src/auth/login.ts and leave README alone");
        assert!(found.contains("src/auth/login.ts"));
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn extract_referenced_paths_ignores_plain_prose() {
        assert!(extract_referenced_paths("implement the login flow").is_empty());
    }

    #[test]
    fn group_has_conflict_true_when_descriptions_share_a_path() {
        let mut a = task("a", &[]);
        a.description = "edit src/x/y.ts to add validation".into();
        let mut b = task("b", &[]);
        b.description = "refactor src/x/y.ts for clarity".into();
        let p = plan(vec![a, b]);

        assert!(group_has_conflict(&p, &["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn group_has_conflict_true_when_exclusive_resources_overlap() {
        let mut a = task("a", &[]);
        a.exclusive_resources = vec!["db/schema.sql".to_string()];
        let mut b = task("b", &[]);
        b.exclusive_resources = vec!["db/schema.sql".to_string()];
        let p = plan(vec![a, b]);

        assert!(group_has_conflict(&p, &["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn group_has_conflict_false_for_disjoint_tasks() {
        let mut a = task("a", &[]);
        a.description = "edit src/x/y.ts".into();
        let mut b = task("b", &[]);
        b.description = "edit src/z/w.ts".into();
        let p = plan(vec![a, b]);

        assert!(!group_has_conflict(&p, &["a".to_string(), "b".to_string()]));
    }

    fn conflicting_group_plan() -> Plan {
        let mut a = task("a", &[]);
        a.parallel_group = Some("g1".into());
        a.description = "edit src/x/y.ts".into();
        let mut b = task("b", &[]);
        b.parallel_group = Some("g1".into());
        b.description = "also touches src/x/y.ts".into();
        plan(vec![a, b])
    }

    #[tokio::test]
    async fn conflicting_parallel_group_runs_sequentially_with_no_worktrees() {
        let project = catalyst_test_utils::TestProject::new();
        let worktree = WorktreeManager::new(project.path(), None).unwrap();

        let harness: Arc<dyn Harness> = Arc::new(ScriptedHarness::always_success());
        let orch = Orchestrator::new(
            harness,
            Some(worktree),
            project.path().join(".stop"),
            600,
            4,
            "sonnet".to_string(),
        );

        let mut p = conflicting_group_plan();
        let outcome = orch.run_plan(&mut p, |_| Ok(())).await.unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
        assert!(p.tasks().all(|t| t.status == TaskStatus::Completed));

        let orch_worktree = WorktreeManager::new(project.path(), None).unwrap();
        assert!(orch_worktree.list_worktrees().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rate_limited_group_member_resets_the_whole_group_and_waits() {
        let project = catalyst_test_utils::TestProject::new();
        let worktree = WorktreeManager::new(project.path(), None).unwrap();

        let rate_limited = TaskResult {
            success: false,
            message: "usage limit reached|9999999999".to_string(),
            duration_s: 0.1,
            plan_modified: false,
            rate_limited: true,
            rate_limit_reset_time: Some(Utc::now()),
            usage: TaskUsage::default(),
        };
        let harness: Arc<dyn Harness> = Arc::new(ScriptedHarness {
            calls: AtomicUsize::new(0),
            responses: vec![Ok(success_result()), Ok(rate_limited)],
        });

        let orch = Orchestrator::new(
            harness,
            Some(worktree),
            project.path().join(".stop"),
            600,
            4,
            "sonnet".to_string(),
        );

        let mut a = task("a", &[]);
        a.parallel_group = Some("g1".into());
        let mut b = task("b", &[]);
        b.parallel_group = Some("g1".into());
        let mut p = plan(vec![a, b]);

        let interrupted = orch
            .dispatch_parallel_group(&mut p, &["a".to_string(), "b".to_string()], &mut CircuitBreaker::default())
            .await
            .unwrap();

        assert!(!interrupted);
        // both tasks go back to pending with attempts refunded, regardless
        // of which one actually reported rate-limited.
        assert_eq!(p.find_task("a").unwrap().status, TaskStatus::Pending);
        assert_eq!(p.find_task("a").unwrap().attempts, 0);
        assert_eq!(p.find_task("b").unwrap().status, TaskStatus::Pending);
        assert_eq!(p.find_task("b").unwrap().attempts, 0);

        let check_worktree = WorktreeManager::new(project.path(), None).unwrap();
        assert!(check_worktree.list_worktrees().unwrap().is_empty());
    }
}
