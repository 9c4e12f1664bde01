//! Idea ingestion (spec 4.2.1 step 1): one-shot agent classifies each
//! raw file under `docs/ideas/` into a feature or defect backlog item,
//! then the original is moved to `docs/ideas/processed/`.
//!
//! Grounded on the same `Harness::run` call shape `catalyst-core`'s
//! dispatch loop uses for a task agent, with `PermissionProfile::Design`
//! (the only profile that grants write access under `docs/**`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use catalyst_core::{AgentInvocation, Harness, OutputFormat, PermissionMode, PermissionProfile};
use catalyst_store::paths::StoreRoot;
use catalyst_types::BacklogType;

const CLASSIFY_TASK_ID: &str = "ingest-classify";

/// One idea file that was handed to the classifier, whatever the outcome.
pub struct IngestedIdea {
    pub source: PathBuf,
    pub classified: bool,
    pub message: String,
}

/// Classify every raw file currently under `docs/ideas/` (excluding
/// `processed/`, which is a subdirectory of it) and move each one out
/// of the way regardless of outcome -- a raw idea is one-shot input,
/// never retried by a later scan.
pub async fn ingest_ideas(
    root: &StoreRoot,
    harness: &Arc<dyn Harness>,
    model: &str,
    timeout_secs: u64,
) -> Result<Vec<IngestedIdea>> {
    let ideas_dir = root.backlog_dir(BacklogType::Idea);
    if !ideas_dir.exists() {
        return Ok(Vec::new());
    }
    let processed_dir = root.archive_dir(BacklogType::Idea);

    let mut raw_files: Vec<PathBuf> = std::fs::read_dir(&ideas_dir)
        .with_context(|| format!("reading ideas directory {}", ideas_dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    raw_files.sort();

    let mut ingested = Vec::new();
    for raw in raw_files {
        let result = classify_one(root, harness, model, timeout_secs, &raw).await;

        std::fs::create_dir_all(&processed_dir)
            .with_context(|| format!("creating {}", processed_dir.display()))?;
        let dest = processed_dir.join(raw.file_name().expect("idea file has a name"));
        if dest.exists() {
            std::fs::remove_file(&raw).ok();
        } else {
            std::fs::rename(&raw, &dest)
                .with_context(|| format!("moving {} to processed", raw.display()))?;
        }

        match result {
            Ok(message) => ingested.push(IngestedIdea {
                source: raw,
                classified: true,
                message,
            }),
            Err(e) => {
                tracing::warn!(path = %raw.display(), error = %e, "idea classification failed, idea archived unclassified");
                ingested.push(IngestedIdea {
                    source: raw,
                    classified: false,
                    message: e.to_string(),
                });
            }
        }
    }

    Ok(ingested)
}

async fn classify_one(
    root: &StoreRoot,
    harness: &Arc<dyn Harness>,
    model: &str,
    timeout_secs: u64,
    raw: &Path,
) -> Result<String> {
    let raw_body = std::fs::read_to_string(raw)
        .with_context(|| format!("reading raw idea {}", raw.display()))?;

    let prompt = format!(
        "A raw idea was submitted:\n\n---\n{raw_body}\n---\n\n\
         Decide whether this is a Feature or a Defect. Write exactly one \
         backlog markdown file under `{}` or `{}` (whichever applies), \
         named `NNNN-slug.md` using the next unused four-digit sequence \
         number in that directory. The file must contain a top-level \
         heading, a `## Status: Open` line, and a `## Description` \
         section restating the idea in your own words. Do not modify \
         any other file.",
        root.backlog_dir(BacklogType::Feature).display(),
        root.backlog_dir(BacklogType::Defect).display(),
    );

    let invocation = AgentInvocation {
        task_id: CLASSIFY_TASK_ID.to_string(),
        prompt,
        model: model.to_string(),
        working_dir: root.root().to_path_buf(),
        add_dirs: vec![],
        allowed_tools: PermissionProfile::Design.allowed_tools().to_string(),
        permission_mode: PermissionMode::AcceptEdits,
        output_format: OutputFormat::Json,
        timeout_secs,
        env_vars: Default::default(),
    };

    let result = harness.run(&invocation).await?;
    if !result.success {
        anyhow::bail!("classification agent reported failure: {}", result.message);
    }
    Ok(result.message)
}
