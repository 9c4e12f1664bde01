//! Agent role resolution and prompt assembly (spec 4.1.4, 4.1.5).

use std::path::Path;

use catalyst_types::{Task, ValidationFinding};

/// The permission profile a role maps to (spec 4.1.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionProfile {
    ReadOnly,
    Write,
    Verification,
    Design,
}

impl PermissionProfile {
    /// The `--allowedTools` value for this profile.
    pub fn allowed_tools(self) -> &'static str {
        match self {
            Self::ReadOnly => "Read Grep Glob Bash(read:*)",
            Self::Write => "Read Grep Glob Edit Write Bash(build:*) Bash(test:*)",
            Self::Verification => "Read Grep Glob Bash(test:*)",
            Self::Design => "Read Grep Glob Edit(docs/**) Write(docs/**)",
        }
    }
}

/// An agent role as resolved for a task (explicit or inferred).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentRole {
    Coder,
    CodeReviewer,
    QaAuditor,
    SpecVerifier,
    UxReviewer,
    FrontendCoder,
    SystemsDesigner,
    Planner,
    Validator(String),
}

impl AgentRole {
    pub fn name(&self) -> String {
        match self {
            Self::Coder => "coder".to_string(),
            Self::CodeReviewer => "code-reviewer".to_string(),
            Self::QaAuditor => "qa-auditor".to_string(),
            Self::SpecVerifier => "spec-verifier".to_string(),
            Self::UxReviewer => "ux-reviewer".to_string(),
            Self::FrontendCoder => "frontend-coder".to_string(),
            Self::SystemsDesigner => "systems-designer".to_string(),
            Self::Planner => "planner".to_string(),
            Self::Validator(name) => name.clone(),
        }
    }

    pub fn permission_profile(&self) -> PermissionProfile {
        match self {
            Self::Coder | Self::FrontendCoder => PermissionProfile::Write,
            Self::CodeReviewer
            | Self::QaAuditor
            | Self::SpecVerifier
            | Self::UxReviewer
            | Self::SystemsDesigner => PermissionProfile::ReadOnly,
            Self::Planner => PermissionProfile::Design,
            Self::Validator(_) => PermissionProfile::Verification,
        }
    }
}

/// Ordered keyword tables (spec 4.1.4): every phrase is multi-word so
/// "implement review UI" infers `coder` while "code review pass"
/// infers `code-reviewer`.
const ROLE_KEYWORD_TABLE: &[(&str, &[&str])] = &[
    (
        "planner",
        &["create a plan", "design the plan", "break down the work", "plan the implementation"],
    ),
    (
        "code-reviewer",
        &["code review pass", "review the diff", "review the pull request", "review the implementation"],
    ),
    (
        "qa-auditor",
        &["qa audit", "quality assurance audit", "audit test coverage"],
    ),
    (
        "spec-verifier",
        &["verify against spec", "check spec compliance", "validate the specification"],
    ),
    (
        "ux-reviewer",
        &["review the ui", "review user experience", "ux review pass"],
    ),
    (
        "frontend-coder",
        &["implement the component", "build the frontend", "implement review ui"],
    ),
    (
        "systems-designer",
        &["design the architecture", "design the system", "architect the service"],
    ),
];

/// Resolve the agent role for a task: explicit `agent` field wins,
/// otherwise infer from `name + description` against the ordered
/// keyword tables, falling back to `coder`.
pub fn resolve_role(task: &Task) -> AgentRole {
    if let Some(agent) = &task.agent {
        return role_from_name(agent);
    }

    let haystack = format!("{} {}", task.name, task.description).to_lowercase();
    for (role_name, phrases) in ROLE_KEYWORD_TABLE {
        if phrases.iter().any(|p| haystack.contains(p)) {
            return role_from_name(role_name);
        }
    }
    AgentRole::Coder
}

fn role_from_name(name: &str) -> AgentRole {
    match name {
        "coder" => AgentRole::Coder,
        "code-reviewer" => AgentRole::CodeReviewer,
        "qa-auditor" => AgentRole::QaAuditor,
        "spec-verifier" => AgentRole::SpecVerifier,
        "ux-reviewer" => AgentRole::UxReviewer,
        "frontend-coder" => AgentRole::FrontendCoder,
        "systems-designer" => AgentRole::SystemsDesigner,
        "planner" => AgentRole::Planner,
        other => AgentRole::Validator(other.to_string()),
    }
}

/// Context injected into the prompt of a task running in a parallel
/// worktree group (spec 4.1.3).
#[derive(Debug, Clone)]
pub struct SubagentContext {
    pub worker_id: String,
    pub worktree_path: std::path::PathBuf,
    pub sibling_task_ids: Vec<String>,
}

/// Everything needed to assemble a task's prompt (spec 4.1.4).
#[derive(Debug, Clone)]
pub struct PromptInputs<'a> {
    pub role: &'a AgentRole,
    pub role_markdown: Option<&'a str>,
    pub subagent_context: Option<&'a SubagentContext>,
    pub task: &'a Task,
    pub plan_doc_path: Option<&'a Path>,
    pub retry_findings: Option<&'a [ValidationFinding]>,
}

/// Build the full prompt text in the order spec 4.1.4 mandates.
pub fn assemble_prompt(inputs: &PromptInputs) -> String {
    let mut sections = Vec::new();

    if let Some(md) = inputs.role_markdown {
        sections.push(md.to_string());
    }

    if let Some(ctx) = inputs.subagent_context {
        sections.push(format!(
            "## Parallel Worker Context\n\
             You are worker `{}` operating in worktree `{}`. Sibling tasks running \
             concurrently: {}. Claim any file you intend to modify in the shared \
             claims file before editing it, and heartbeat your status file \
             periodically.",
            ctx.worker_id,
            ctx.worktree_path.display(),
            ctx.sibling_task_ids.join(", "),
        ));
    }

    sections.push(format!(
        "## Task: {}\n\n{}",
        inputs.task.name, inputs.task.description
    ));

    if let Some(path) = inputs.plan_doc_path {
        sections.push(format!("Reference design document: {}", path.display()));
    }

    if let Some(findings) = inputs.retry_findings {
        if !findings.is_empty() {
            let lines: Vec<String> = findings
                .iter()
                .map(|f| format!("- [{}] {}", f.verdict, f.description))
                .collect();
            sections.push(format!(
                "## Retry Context: Previous Validation Findings\n{}",
                lines.join("\n")
            ));
        }
    }

    sections.push(attempt_aware_preamble(inputs.task.attempts));
    sections.push(handshake_contract());

    sections.join("\n\n")
}

fn attempt_aware_preamble(attempts: u32) -> String {
    if attempts <= 1 {
        "This is a fresh start; status is in_progress because the orchestrator assigned \
         it to you."
            .to_string()
    } else {
        format!(
            "Attempt {attempts}; a previous attempt failed, verify state first before \
             making further changes."
        )
    }
}

fn handshake_contract() -> String {
    "## Handshake Contract\n\
     When you finish, write a JSON object to the task-status handshake file with \
     fields {task_id, status: completed|failed|suspended, message, timestamp, \
     plan_modified, slack_messages (optional), validation_findings (optional)}."
        .to_string()
}
