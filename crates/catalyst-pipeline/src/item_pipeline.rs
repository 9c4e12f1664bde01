//! Feature/defect item pipeline (spec 4.2.2): plan -> execute -> verify
//! -> archive, with a bounded FAIL-retry loop back to plan creation.
//!
//! Phase 1 reuses the same budget/circuit-guard posture
//! `catalyst-core::orchestrator` applies to a single task dispatch, just
//! one level up: instead of guarding one task's agent call, it guards
//! one item's planner call.

use std::time::SystemTime;

use anyhow::{Context, Result};
use catalyst_core::{validation, AgentInvocation, CircuitBreaker, OutputFormat, PermissionMode, PermissionProfile};
use catalyst_store::{backlog, plan as plan_store};
use catalyst_types::{BacklogItem, BacklogStatus, Verdict};

use crate::context::PipelineContext;
use crate::executor_invoke::{invoke_executor, ExecutorOutcome};
use crate::notify::Notifier;

/// Cycle cap on plan-creation/verification-failure loops (spec 4.2.2
/// step 4: "up to a fixed cycle cap, default 3").
const DEFAULT_CYCLE_CAP: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Archived,
    ArchivedVerificationFailed,
    Failed,
}

/// Run one feature/defect backlog item through its full pipeline.
pub async fn process_item(
    ctx: &PipelineContext,
    notifier: &dyn Notifier,
    item: &BacklogItem,
    circuit: &mut CircuitBreaker,
) -> Result<ItemOutcome> {
    let model = ctx.default_model.clone();

    for cycle in 0..DEFAULT_CYCLE_CAP {
        if circuit.is_open(SystemTime::now()) {
            anyhow::bail!(
                "circuit breaker open, refusing to start item pipeline for {}",
                item.slug
            );
        }

        let plan_path = match plan_creation(ctx, item, &model, cycle).await {
            Ok(path) => {
                circuit.record_success();
                path
            }
            Err(e) => {
                circuit.record_failure(SystemTime::now());
                tracing::warn!(slug = %item.slug, error = %e, "plan creation failed");
                continue;
            }
        };

        let label = format!("{}#{}", item.slug, cycle + 1);
        let outcome = invoke_executor(&ctx.executable_path, &plan_path, &label, &["--verbose"])
            .with_context(|| format!("invoking executor for {}", item.slug))?;

        match outcome {
            ExecutorOutcome::Failed => {
                circuit.record_failure(SystemTime::now());
                tracing::warn!(slug = %item.slug, "executor run failed, retrying item from plan creation");
                let _ = std::fs::remove_file(&plan_path);
                continue;
            }
            ExecutorOutcome::BudgetPaused => {
                tracing::info!(slug = %item.slug, "item paused on plan budget, leaving plan in place");
                return Ok(ItemOutcome::Failed);
            }
            ExecutorOutcome::Success => {}
        }

        let verdict = verify_item(ctx, item, &model).await?;
        match verdict {
            Verdict::Pass | Verdict::Warn => {
                archive_completed(ctx, notifier, item)?;
                return Ok(ItemOutcome::Archived);
            }
            Verdict::Fail => {
                let _ = std::fs::remove_file(&plan_path);
                tracing::warn!(slug = %item.slug, cycle, "verification failed, looping back to plan creation");
            }
        }
    }

    archive_item_force(ctx, notifier, item, "verification cycle cap exhausted")?;
    Ok(ItemOutcome::ArchivedVerificationFailed)
}

async fn plan_creation(
    ctx: &PipelineContext,
    item: &BacklogItem,
    model: &str,
    cycle: u32,
) -> Result<std::path::PathBuf> {
    let prompt = format!(
        "You are the planner for backlog item `{}` (cycle {}).\n\n\
         Item contents:\n---\n{}\n---\n\n\
         Produce a design document under `docs/plans/{}.md` and a YAML \
         plan file under the plans directory describing the tasks \
         needed to implement this item. The plan's `meta.name` must be \
         `{}`.",
        item.slug,
        cycle + 1,
        item.body,
        item.slug,
        item.slug,
    );

    let invocation = AgentInvocation {
        task_id: format!("plan-{}", item.slug),
        prompt,
        model: model.to_string(),
        working_dir: ctx.root.root().to_path_buf(),
        add_dirs: vec![],
        allowed_tools: PermissionProfile::Design.allowed_tools().to_string(),
        permission_mode: PermissionMode::AcceptEdits,
        output_format: OutputFormat::Json,
        timeout_secs: ctx.config.task_timeout_secs,
        env_vars: Default::default(),
    };

    let result = ctx.harness.run(&invocation).await?;
    if !result.success {
        anyhow::bail!("planner agent reported failure: {}", result.message);
    }

    let plan_path = ctx.root.plan_path(&item.slug);
    let plan = plan_store::load_plan(&plan_path)
        .with_context(|| format!("planner did not produce a loadable plan at {}", plan_path.display()))?;
    plan_store::validate_plan(&plan_path, &plan)?;
    Ok(plan_path)
}

async fn verify_item(ctx: &PipelineContext, item: &BacklogItem, model: &str) -> Result<Verdict> {
    let prompt = format!(
        "Verify that backlog item `{}` was correctly implemented.\n\n\
         Item contents:\n---\n{}\n---\n\n\
         Report your findings as `- [PASS|WARN|FAIL] description with \
         file:line` lines, followed by a final `VERDICT: PASS|WARN|FAIL` \
         line.",
        item.slug, item.body,
    );

    let invocation = AgentInvocation {
        task_id: format!("verify-{}", item.slug),
        prompt,
        model: model.to_string(),
        working_dir: ctx.root.root().to_path_buf(),
        add_dirs: vec![],
        allowed_tools: PermissionProfile::ReadOnly.allowed_tools().to_string(),
        permission_mode: PermissionMode::Default,
        output_format: OutputFormat::Json,
        timeout_secs: ctx.config.task_timeout_secs,
        env_vars: Default::default(),
    };

    let result = ctx.harness.run(&invocation).await?;
    let (findings, verdict) = validation::parse_validator_output(&result.message);
    let findings_text = findings
        .iter()
        .map(|f| format!("- [{}] {}", f.verdict, f.description))
        .collect::<Vec<_>>()
        .join("\n");
    backlog::append_section(
        &item.path,
        "Verification Log",
        &format!("{findings_text}\n\nVERDICT: {verdict}"),
    )?;
    Ok(verdict)
}

fn archive_completed(ctx: &PipelineContext, notifier: &dyn Notifier, item: &BacklogItem) -> Result<()> {
    let summary = extract_summary(&item.body);
    backlog::set_status(&item.path, BacklogStatus::Completed)?;
    backlog::archive_item(&ctx.root, item)?;
    notifier.notify_completion(item.item_type, &item.slug, &summary);
    Ok(())
}

fn archive_item_force(
    ctx: &PipelineContext,
    notifier: &dyn Notifier,
    item: &BacklogItem,
    reason: &str,
) -> Result<()> {
    backlog::set_status(&item.path, BacklogStatus::ArchivedVerificationFailed)?;
    if let Err(e) = backlog::archive_item(&ctx.root, item) {
        tracing::error!(slug = %item.slug, error = %e, "archive failed after verification-cycle exhaustion");
        notifier.notify_error(&format!(
            "archive failed for {} ({reason}): {e}",
            item.slug
        ));
        return Err(e.into());
    }
    notifier.notify_completion(
        item.item_type,
        &item.slug,
        &format!("archived without a passing verification verdict ({reason})"),
    );
    Ok(())
}

/// First sentence of the `Root Cause` / `Root Need` / `Summary` section,
/// whichever is present first (spec 4.2.2 phase 4).
fn extract_summary(body: &str) -> String {
    for heading in ["Root Cause", "Root Need", "Summary"] {
        if let Some(text) = section_first_sentence(body, heading) {
            return text;
        }
    }
    "completed".to_string()
}

fn section_first_sentence(body: &str, heading: &str) -> Option<String> {
    let marker = format!("## {heading}");
    let start = body.find(&marker)? + marker.len();
    let rest = &body[start..];
    let end = rest.find("\n##").unwrap_or(rest.len());
    let section = rest[..end].trim();
    let sentence_end = section.find(". ").map(|i| i + 1).unwrap_or(section.len());
    let sentence = section[..sentence_end].trim();
    if sentence.is_empty() {
        None
    } else {
        Some(sentence.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_summary_prefers_root_cause() {
        let body = "# Item\n\n## Root Cause\nThe cache evicted too eagerly. More detail here.\n\n## Summary\nFixed it.\n";
        assert_eq!(extract_summary(body), "The cache evicted too eagerly.");
    }

    #[test]
    fn extract_summary_falls_back_to_summary() {
        let body = "# Item\n\n## Summary\nShipped the retry budget. Done.\n";
        assert_eq!(extract_summary(body), "Shipped the retry budget.");
    }

    #[test]
    fn extract_summary_defaults_when_no_section_present() {
        let body = "# Item\n\nNo sections here.\n";
        assert_eq!(extract_summary(body), "completed");
    }
}
