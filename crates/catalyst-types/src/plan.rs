//! The plan data model (YAML document: meta, sections, tasks).
//!
//! Mirrors the on-disk shape exactly: `catalyst-store` round-trips these
//! types through `serde_yaml` without any intermediate format.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::usage::TaskUsage;

// ---------------------------------------------------------------------------
// Task status
// ---------------------------------------------------------------------------

/// Status of a single task (spec 3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
    Suspended,
}

impl TaskStatus {
    /// A task in this status will never be picked up again.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Skipped)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Suspended => "suspended",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task status: {:?}", self.0)
    }
}

impl std::error::Error for TaskStatusParseError {}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            "suspended" => Ok(Self::Suspended),
            other => Err(TaskStatusParseError(other.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// Verdicts (shared by validation findings and verification reports)
// ---------------------------------------------------------------------------

/// Verdict emitted by a validator or verifier agent (spec 4.1.12, 4.2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pass => "PASS",
            Self::Warn => "WARN",
            Self::Fail => "FAIL",
        };
        f.write_str(s)
    }
}

impl Verdict {
    /// Aggregate a set of findings' verdicts into a single plan-level verdict:
    /// any FAIL wins, else any WARN wins, else PASS.
    pub fn aggregate(verdicts: impl IntoIterator<Item = Verdict>) -> Verdict {
        let mut worst = Verdict::Pass;
        for v in verdicts {
            match (worst, v) {
                (_, Verdict::Fail) => return Verdict::Fail,
                (Verdict::Pass, Verdict::Warn) => worst = Verdict::Warn,
                _ => {}
            }
        }
        worst
    }
}

/// A single `- [PASS|WARN|FAIL] description with file:line` line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub verdict: Verdict,
    pub description: String,
}

// ---------------------------------------------------------------------------
// Plan-level configuration blocks
// ---------------------------------------------------------------------------

/// Cost budget guard configuration (spec 4.1.9).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Budget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_quota_percent: Option<f64>,
    /// `0` (or absent) means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_ceiling_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_budget_usd: Option<f64>,
}

impl Budget {
    /// `effective_limit = min(ceiling * pct/100, ceiling - reserved)`.
    /// Returns `None` when unlimited (ceiling absent or zero).
    pub fn effective_limit(&self) -> Option<f64> {
        let ceiling = self.quota_ceiling_usd.unwrap_or(0.0);
        if ceiling <= 0.0 {
            return None;
        }
        let pct = self.max_quota_percent.unwrap_or(100.0);
        let reserved = self.reserved_budget_usd.unwrap_or(0.0);
        Some((ceiling * pct / 100.0).min(ceiling - reserved))
    }
}

/// Model escalation ladder configuration (spec 4.1.10).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEscalationConfig {
    #[serde(default)]
    pub enabled: bool,
    pub escalate_after: u32,
    pub max_model: String,
    pub validation_model: String,
    pub starting_model: String,
}

/// Validation-dispatch configuration (spec 4.1.12).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub run_after: Vec<String>,
    #[serde(default)]
    pub validators: Vec<String>,
    #[serde(default = "default_max_validation_attempts")]
    pub max_validation_attempts: u32,
}

fn default_max_validation_attempts() -> u32 {
    3
}

/// Terminal meta-level status a plan can be parked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanRunStatus {
    PausedQuota,
    Failed,
}

impl fmt::Display for PlanRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PausedQuota => "paused_quota",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Plan document
// ---------------------------------------------------------------------------

/// Plan metadata (the `meta:` block).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanMeta {
    pub name: String,
    /// Path to the reference design document this plan implements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_doc: Option<String>,
    pub created: DateTime<Utc>,
    /// Absent (`None`) means the plan is actively runnable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PlanRunStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<Budget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_escalation: Option<ModelEscalationConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_notifications: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_model: Option<String>,
}

/// A single task (spec 3.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_group: Option<String>,
    #[serde(default)]
    pub exclusive_resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_findings: Option<Vec<ValidationFinding>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TaskUsage>,
}

fn default_max_attempts() -> u32 {
    3
}

impl Task {
    /// Terminal-and-immutable per spec 3.1's invariant.
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    pub fn has_exhausted_attempts(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// An ordered section of tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

/// The full plan document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub meta: PlanMeta,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Plan {
    /// Iterate all tasks across all sections, in plan order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.sections.iter().flat_map(|s| s.tasks.iter())
    }

    /// Mutable variant of [`Plan::tasks`].
    pub fn tasks_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.sections.iter_mut().flat_map(|s| s.tasks.iter_mut())
    }

    pub fn find_task(&self, id: &str) -> Option<&Task> {
        self.tasks().find(|t| t.id == id)
    }

    pub fn find_task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks_mut().find(|t| t.id == id)
    }

    /// True once every task is in a terminal status (completed or skipped)
    /// or otherwise can never run again (failed with no attempts left,
    /// suspended).
    pub fn all_tasks_terminal(&self) -> bool {
        self.tasks().all(|t| {
            t.status.is_terminal()
                || t.status == TaskStatus::Suspended
                || (t.status == TaskStatus::Failed && t.has_exhausted_attempts())
        })
    }

    /// Sum of `usage.total_cost_usd` across every task that has usage
    /// recorded.
    pub fn total_cost_usd(&self) -> f64 {
        self.tasks()
            .filter_map(|t| t.usage.as_ref())
            .map(|u| u.total_cost_usd)
            .sum()
    }
}
