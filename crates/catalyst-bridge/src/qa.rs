//! Question answering with a rolling conversation window (spec 4.3.5).
//!
//! Grounded on `catalyst-pipeline::ingest`'s one-shot `Harness::run`
//! call shape; the state-gathering here reads the same on-disk layout
//! `catalyst-pipeline::recovery` and `catalyst-store::backlog` read.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use anyhow::{Context, Result};
use catalyst_core::{AgentInvocation, Harness, OutputFormat, PermissionMode, PermissionProfile};
use catalyst_store::paths::StoreRoot;
use catalyst_types::BacklogType;

const QA_TASK_ID: &str = "bridge-question-answer";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
struct Exchange {
    question: String,
    answer: String,
}

/// A bounded, thread-safe window of recent (question, answer) turns
/// (spec 4.3.5's "mutex for true parallel runtimes" requirement --
/// tokio tasks are real OS threads under the multi-thread runtime, so a
/// plain `Mutex` rather than a GIL-style assumption is used here).
pub struct RollingHistory {
    window: Mutex<VecDeque<Exchange>>,
    capacity: usize,
}

impl RollingHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    fn push(&self, question: String, answer: String) {
        let mut window = self.window.lock().expect("rolling history mutex poisoned");
        window.push_back(Exchange { question, answer });
        while window.len() > self.capacity {
            window.pop_front();
        }
    }

    fn render(&self) -> String {
        let window = self.window.lock().expect("rolling history mutex poisoned");
        if window.is_empty() {
            return String::new();
        }
        let mut out = String::from("## Recent conversation\n");
        for exchange in window.iter() {
            out.push_str(&format!("Q: {}\nA: {}\n", exchange.question, exchange.answer));
        }
        out
    }
}

/// Answer one inbound question (spec 4.3.3's `question`/`info_request`
/// classifications), using on-disk state plus the rolling history as
/// context for a fast/cheap-tier model call.
pub async fn answer_question(
    root: &StoreRoot,
    harness: &Arc<dyn Harness>,
    fast_model: &str,
    history: &RollingHistory,
    question: &str,
) -> Result<String> {
    let state = gather_state_summary(root)?;
    let history_block = history.render();

    let prompt = format!(
        "{history_block}\n## Current orchestrator state\n{state}\n\n\
         Answer this question concisely using only the state above. If the \
         state doesn't cover it, say so plainly instead of guessing.\n\nQuestion: {question}"
    );

    let invocation = AgentInvocation {
        task_id: QA_TASK_ID.to_string(),
        prompt,
        model: fast_model.to_string(),
        working_dir: root.root().to_path_buf(),
        add_dirs: vec![],
        allowed_tools: PermissionProfile::ReadOnly.allowed_tools().to_string(),
        permission_mode: PermissionMode::Default,
        output_format: OutputFormat::Json,
        timeout_secs: DEFAULT_TIMEOUT_SECS,
        env_vars: Default::default(),
    };

    let result = harness.run(&invocation).await?;
    if !result.success {
        anyhow::bail!("question-answering agent reported failure: {}", result.message);
    }

    history.push(question.to_string(), result.message.clone());
    Ok(result.message)
}

/// Render active plans, backlog sizes, and a cost estimate as plain
/// text (spec 4.3.5). Never panics on a missing or corrupt plan; it is
/// skipped and counted separately.
fn gather_state_summary(root: &StoreRoot) -> Result<String> {
    let mut lines = Vec::new();

    let plans_dir = root.plans_dir();
    let mut active_plans = Vec::new();
    let mut total_cost = 0.0f64;
    if plans_dir.exists() {
        let mut entries: Vec<_> = std::fs::read_dir(&plans_dir)
            .with_context(|| format!("reading {}", plans_dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("yaml"))
            .collect();
        entries.sort();
        for path in entries {
            match catalyst_store::plan::load_plan(&path) {
                Ok(plan) => {
                    total_cost += plan.total_cost_usd();
                    if !plan.all_tasks_terminal() {
                        active_plans.push(plan.meta.name);
                    }
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable plan in state summary"),
            }
        }
    }

    lines.push(if active_plans.is_empty() {
        "Active plans: none".to_string()
    } else {
        format!("Active plans: {}", active_plans.join(", "))
    });

    for item_type in [BacklogType::Defect, BacklogType::Feature, BacklogType::Analysis] {
        let dir = root.backlog_dir(item_type);
        let count = if dir.exists() {
            std::fs::read_dir(&dir)
                .map(|entries| entries.filter_map(|e| e.ok()).filter(|e| e.path().extension().and_then(|e| e.to_str()) == Some("md")).count())
                .unwrap_or(0)
        } else {
            0
        };
        lines.push(format!("Open {item_type} items: {count}"));
    }

    lines.push(format!(
        "Session cost so far: ~${total_cost:.4} (API-equivalent estimate, not actual subscription charges)"
    ));

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_history_trims_to_capacity() {
        let history = RollingHistory::new(2);
        history.push("q1".into(), "a1".into());
        history.push("q2".into(), "a2".into());
        history.push("q3".into(), "a3".into());
        let rendered = history.render();
        assert!(!rendered.contains("q1"));
        assert!(rendered.contains("q2"));
        assert!(rendered.contains("q3"));
    }

    #[test]
    fn empty_history_renders_empty_string() {
        let history = RollingHistory::new(3);
        assert_eq!(history.render(), "");
    }

    #[test]
    fn gather_state_summary_reports_zero_counts_on_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = StoreRoot::new(dir.path());
        let summary = gather_state_summary(&root).unwrap();
        assert!(summary.contains("Active plans: none"));
        assert!(summary.contains("not actual subscription charges"));
    }
}
