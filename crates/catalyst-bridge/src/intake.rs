//! 5-Whys intake (spec 4.3.4): an immediate threaded acknowledgement,
//! then a background LLM call that turns a chat submission into a
//! backlog markdown file.
//!
//! Grounded on `catalyst-pipeline::ingest`'s one-shot classify-and-write
//! agent call shape, generalized from a raw idea file to a chat message
//! and from a single free-form write to a structured 5-Whys parse.

use std::sync::Arc;

use anyhow::{Context, Result};
use catalyst_core::{AgentInvocation, Harness, OutputFormat, PermissionMode, PermissionProfile};
use catalyst_store::paths::StoreRoot;
use catalyst_types::BacklogType;

use crate::transport::ChatTransport;

const INTAKE_TASK_ID: &str = "bridge-intake-5whys";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct WhyPair {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone)]
pub struct FiveWhysResult {
    pub title: String,
    pub classification: BacklogType,
    pub description: String,
    pub whys: Vec<WhyPair>,
    pub root_need: String,
}

impl FiveWhysResult {
    fn is_complete(&self) -> bool {
        self.whys.len() >= 5
    }
}

/// Entry point for a `new_feature`/`new_defect` classified message
/// (spec 4.3.3, 4.3.4). Posts the acknowledgement synchronously, then
/// does everything else -- the LLM call, retry, summary post, and file
/// write -- so the caller should invoke this inside a background task,
/// never awaited inline from the poll loop.
pub async fn handle_submission(
    root: &StoreRoot,
    harness: &Arc<dyn Harness>,
    model: &str,
    transport: &dyn ChatTransport,
    channel_id: &str,
    thread_ts: &str,
    item_type: BacklogType,
    raw_text: &str,
) -> Result<()> {
    transport
        .post_message(
            channel_id,
            &format!("Received your {item_type} request. Analyzing…"),
            Some(thread_ts),
        )
        .await
        .context("posting intake acknowledgement")?;

    let first = run_five_whys(harness, model, item_type, raw_text, None).await?;
    let result = if first.is_complete() {
        first
    } else {
        tracing::warn!(whys = first.whys.len(), "5-Whys came back incomplete, retrying once");
        let retry = run_five_whys(harness, model, item_type, raw_text, Some(&first)).await?;
        if retry.whys.len() > first.whys.len() {
            retry
        } else {
            tracing::warn!(
                whys = first.whys.len(),
                "accepting incomplete 5-Whys result after retry (graceful degradation)"
            );
            first
        }
    };

    let slug = next_slug(root, result.classification)?;
    let path = root.backlog_dir(result.classification).join(format!("{slug}.md"));
    std::fs::create_dir_all(root.backlog_dir(result.classification))
        .with_context(|| format!("creating {}", root.backlog_dir(result.classification).display()))?;
    std::fs::write(&path, render_backlog_markdown(&result))
        .with_context(|| format!("writing {}", path.display()))?;

    commit_new_item(root, &path)?;

    transport
        .post_message(
            channel_id,
            &format!(
                "Filed as `{slug}`.\n*Title:* {}\n*Classification:* {}\n*Root need:* {}",
                result.title, result.classification, result.root_need
            ),
            Some(thread_ts),
        )
        .await
        .context("posting intake summary")?;

    Ok(())
}

async fn run_five_whys(
    harness: &Arc<dyn Harness>,
    model: &str,
    item_type: BacklogType,
    raw_text: &str,
    prior_incomplete: Option<&FiveWhysResult>,
) -> Result<FiveWhysResult> {
    let mut prompt = format!(
        "A user submitted this {item_type} request over chat:\n\n---\n{raw_text}\n---\n\n\
         Run a 5-Whys analysis to find the root cause or root need. Respond with exactly \
         this structure:\n\
         Title: <one line>\n\
         Classification: feature|defect\n\
         Description: <one paragraph>\n\
         Why 1: <question>\nAnswer 1: <answer>\n\
         Why 2: <question>\nAnswer 2: <answer>\n\
         Why 3: <question>\nAnswer 3: <answer>\n\
         Why 4: <question>\nAnswer 4: <answer>\n\
         Why 5: <question>\nAnswer 5: <answer>\n\
         Root Need: <one line>\n"
    );

    if let Some(prior) = prior_incomplete {
        prompt.push_str(&format!(
            "\nA previous attempt only produced {} of 5 Whys:\n{}\n\
             Produce the full 5 this time.",
            prior.whys.len(),
            render_whys(&prior.whys)
        ));
    }

    let invocation = AgentInvocation {
        task_id: INTAKE_TASK_ID.to_string(),
        prompt,
        model: model.to_string(),
        working_dir: std::env::current_dir().unwrap_or_else(|_| "/".into()),
        add_dirs: vec![],
        allowed_tools: PermissionProfile::ReadOnly.allowed_tools().to_string(),
        permission_mode: PermissionMode::Default,
        output_format: OutputFormat::Json,
        timeout_secs: DEFAULT_TIMEOUT_SECS,
        env_vars: Default::default(),
    };

    let result = harness.run(&invocation).await?;
    if !result.success {
        anyhow::bail!("5-Whys agent reported failure: {}", result.message);
    }
    Ok(parse_five_whys(&result.message, item_type))
}

fn render_whys(whys: &[WhyPair]) -> String {
    whys.iter()
        .enumerate()
        .map(|(i, w)| format!("Why {}: {}\nAnswer {}: {}", i + 1, w.question, i + 1, w.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

fn field(body: &str, label: &str) -> Option<String> {
    body.lines()
        .find_map(|line| line.strip_prefix(&format!("{label}:")).map(|rest| rest.trim().to_string()))
}

fn parse_five_whys(body: &str, fallback_type: BacklogType) -> FiveWhysResult {
    let title = field(body, "Title").unwrap_or_else(|| "Untitled submission".to_string());
    let classification = field(body, "Classification")
        .and_then(|c| c.to_lowercase().parse().ok())
        .unwrap_or(fallback_type);
    let description = field(body, "Description").unwrap_or_default();
    let root_need = field(body, "Root Need").unwrap_or_default();

    let mut whys = Vec::new();
    for i in 1..=5 {
        let question = field(body, &format!("Why {i}"));
        let answer = field(body, &format!("Answer {i}"));
        if let (Some(question), Some(answer)) = (question, answer) {
            whys.push(WhyPair { question, answer });
        }
    }

    FiveWhysResult {
        title,
        classification,
        description,
        whys,
        root_need,
    }
}

fn render_backlog_markdown(result: &FiveWhysResult) -> String {
    let mut out = format!("# {}\n\n## Status: Open\n\n## Description\n{}\n\n", result.title, result.description);
    out.push_str("## 5 Whys\n");
    for (i, w) in result.whys.iter().enumerate() {
        out.push_str(&format!("{}. {} — {}\n", i + 1, w.question, w.answer));
    }
    out.push_str(&format!("\n## Root Need\n{}\n", result.root_need));
    out
}

fn next_slug(root: &StoreRoot, item_type: BacklogType) -> Result<String> {
    let dir = root.backlog_dir(item_type);
    let mut max_seq = 0u32;
    if dir.exists() {
        for entry in std::fs::read_dir(&dir).with_context(|| format!("reading {}", dir.display()))? {
            let entry = entry?;
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if let Some(seq) = stem.split('-').next().and_then(|n| n.parse::<u32>().ok()) {
                    max_seq = max_seq.max(seq);
                }
            }
        }
    }
    Ok(format!("{:04}-chat-submission", max_seq + 1))
}

fn commit_new_item(root: &StoreRoot, path: &std::path::Path) -> Result<()> {
    let status = std::process::Command::new("git")
        .arg("add")
        .arg(path)
        .current_dir(root.root())
        .status()
        .context("spawning git add")?;
    if !status.success() {
        anyhow::bail!("git add failed for {}", path.display());
    }
    let status = std::process::Command::new("git")
        .arg("commit")
        .arg("-m")
        .arg(format!("Add backlog item from chat intake: {}", path.display()))
        .current_dir(root.root())
        .status()
        .context("spawning git commit")?;
    if !status.success() {
        anyhow::bail!("git commit failed for {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_five_whys_extracts_all_fields() {
        let body = "Title: Dark mode\nClassification: feature\nDescription: add a dark theme\n\
                     Why 1: users asked\nAnswer 1: eye strain at night\n\
                     Why 2: why now\nAnswer 2: many requests\n\
                     Why 3: why prioritize\nAnswer 3: low effort\n\
                     Why 4: why low effort\nAnswer 4: css variables exist\n\
                     Why 5: why not done already\nAnswer 5: nobody asked before\n\
                     Root Need: reduce eye strain for night users\n";
        let parsed = parse_five_whys(body, BacklogType::Feature);
        assert_eq!(parsed.title, "Dark mode");
        assert_eq!(parsed.classification, BacklogType::Feature);
        assert_eq!(parsed.whys.len(), 5);
        assert!(parsed.is_complete());
        assert_eq!(parsed.root_need, "reduce eye strain for night users");
    }

    #[test]
    fn parse_five_whys_tolerates_missing_whys() {
        let body = "Title: X\nClassification: defect\nDescription: d\nWhy 1: a\nAnswer 1: b\n";
        let parsed = parse_five_whys(body, BacklogType::Defect);
        assert_eq!(parsed.whys.len(), 1);
        assert!(!parsed.is_complete());
    }

    #[test]
    fn next_slug_increments_past_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = StoreRoot::new(dir.path());
        std::fs::create_dir_all(root.backlog_dir(BacklogType::Feature)).unwrap();
        std::fs::write(root.backlog_dir(BacklogType::Feature).join("0003-foo.md"), "").unwrap();
        let slug = next_slug(&root, BacklogType::Feature).unwrap();
        assert_eq!(slug, "0004-chat-submission");
    }

    #[test]
    fn render_backlog_markdown_includes_status_and_whys() {
        let result = FiveWhysResult {
            title: "T".into(),
            classification: BacklogType::Feature,
            description: "D".into(),
            whys: vec![WhyPair { question: "q".into(), answer: "a".into() }],
            root_need: "need".into(),
        };
        let md = render_backlog_markdown(&result);
        assert!(md.contains("## Status: Open"));
        assert!(md.contains("q — a"));
        assert!(md.contains("## Root Need\nneed"));
    }
}
