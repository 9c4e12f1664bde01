//! Invoke the Executor as a genuine child process (spec 4.2.2 phase 2):
//! `<executable> run --plan <path> ...`, stdout/stderr streamed and
//! tagged with a compact plan label, then the plan reloaded from disk
//! to read back its final `meta.status`.
//!
//! A real subprocess boundary rather than an in-process function call,
//! since the pipeline and the single-plan executor are meant to be
//! separable processes (one can be killed and restarted independently
//! of the other).

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use catalyst_store::plan;
use catalyst_types::PlanRunStatus;

/// Outcome of running one plan to completion through a child Executor
/// process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorOutcome {
    /// Exited zero and the plan is not in a failed state.
    Success,
    /// Exited zero but `meta.status = paused_quota`.
    BudgetPaused,
    /// Exited non-zero, or exited zero with `meta.status = failed`.
    Failed,
}

/// Run `plan_path` through a freshly spawned Executor child process,
/// line-prefixing its combined output with `label` (spec 4.2.2 phase 2:
/// "streaming its output tagged with a compact plan label").
pub fn invoke_executor(
    executable_path: &Path,
    plan_path: &Path,
    label: &str,
    extra_args: &[&str],
) -> Result<ExecutorOutcome> {
    let mut command = Command::new(executable_path);
    command
        .arg("run")
        .arg("--plan")
        .arg(plan_path)
        .args(extra_args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning executor for {}", plan_path.display()))?;

    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");
    let label_owned = label.to_string();

    let stdout_thread = std::thread::spawn(move || stream_tagged(stdout, &label_owned, false));
    let label_owned = label.to_string();
    let stderr_thread = std::thread::spawn(move || stream_tagged(stderr, &label_owned, true));

    let status = child.wait().context("waiting on executor child process")?;
    let _ = stdout_thread.join();
    let _ = stderr_thread.join();

    if !status.success() {
        tracing::warn!(%label, code = ?status.code(), "executor child process exited non-zero");
        return Ok(ExecutorOutcome::Failed);
    }

    match plan::load_plan(plan_path) {
        Ok(reloaded) => match reloaded.meta.status {
            Some(PlanRunStatus::Failed) => Ok(ExecutorOutcome::Failed),
            Some(PlanRunStatus::PausedQuota) => Ok(ExecutorOutcome::BudgetPaused),
            None => Ok(ExecutorOutcome::Success),
        },
        Err(e) => {
            tracing::warn!(%label, error = %e, "could not reload plan after executor run");
            Ok(ExecutorOutcome::Failed)
        }
    }
}

fn stream_tagged(reader: impl std::io::Read, label: &str, is_stderr: bool) {
    let buffered = BufReader::new(reader);
    for line in buffered.lines() {
        let Ok(line) = line else { break };
        if is_stderr {
            eprintln!("[{label}] {line}");
        } else {
            println!("[{label}] {line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalyst_types::{Plan, PlanMeta, Section, Task, TaskStatus};
    use chrono::Utc;
    use tempfile::tempdir;

    fn write_minimal_plan(path: &Path, status: Option<PlanRunStatus>) {
        let p = Plan {
            meta: PlanMeta {
                name: "t".into(),
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
                status: TaskStatus::Completed,
                tasks: vec![Task {
                    id: "t1".into(),
                    name: "t1".into(),
                    description: String::new(),
                    status: TaskStatus::Completed,
                    attempts: 1,
                    max_attempts: 3,
                    depends_on: vec![],
                    parallel_group: None,
                    exclusive_resources: vec![],
                    agent: None,
                    validation_findings: None,
                    model_used: None,
                    usage: None,
                }],
            }],
        };
        plan::save_plan(path, &p).unwrap();
    }

    /// Uses `/bin/true` and `/bin/false` as stand-ins for the real
    /// binary: this module only cares about exit-status interpretation
    /// and plan reload, not the real Executor's own behavior.
    #[test]
    fn success_exit_with_no_terminal_status_is_success() {
        let dir = tempdir().unwrap();
        let plan_path = dir.path().join("p.yaml");
        write_minimal_plan(&plan_path, None);
        let outcome = invoke_executor(Path::new("/bin/true"), &plan_path, "test", &[]).unwrap();
        assert_eq!(outcome, ExecutorOutcome::Success);
    }

    #[test]
    fn nonzero_exit_is_failed_regardless_of_plan_status() {
        let dir = tempdir().unwrap();
        let plan_path = dir.path().join("p.yaml");
        write_minimal_plan(&plan_path, None);
        let outcome = invoke_executor(Path::new("/bin/false"), &plan_path, "test", &[]).unwrap();
        assert_eq!(outcome, ExecutorOutcome::Failed);
    }

    #[test]
    fn zero_exit_with_failed_status_is_failed() {
        let dir = tempdir().unwrap();
        let plan_path = dir.path().join("p.yaml");
        write_minimal_plan(&plan_path, Some(PlanRunStatus::Failed));
        let outcome = invoke_executor(Path::new("/bin/true"), &plan_path, "test", &[]).unwrap();
        assert_eq!(outcome, ExecutorOutcome::Failed);
    }

    #[test]
    fn zero_exit_with_paused_quota_is_budget_paused() {
        let dir = tempdir().unwrap();
        let plan_path = dir.path().join("p.yaml");
        write_minimal_plan(&plan_path, Some(PlanRunStatus::PausedQuota));
        let outcome = invoke_executor(Path::new("/bin/true"), &plan_path, "test", &[]).unwrap();
        assert_eq!(outcome, ExecutorOutcome::BudgetPaused);
    }
}
