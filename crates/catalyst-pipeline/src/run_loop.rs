//! The pipeline main loop (spec 4.2.1): ingest ideas, recover crashed
//! plans, scan the backlog, dispatch the first eligible item, check for
//! hot-reload, then idle until there is more to do.

use std::time::Duration;

use anyhow::Result;
use catalyst_core::CircuitBreaker;
use catalyst_store::{backlog, stop};
use catalyst_types::BacklogType;

use crate::context::PipelineContext;
use crate::hotreload::{self, HashSnapshot, RestartFlag};
use crate::notify::Notifier;
use crate::{analysis_pipeline, ingest, item_pipeline, recovery};

/// How long an idle iteration (empty backlog, no code change) waits
/// before checking again, absent a filesystem-watch event (spec 4.2.1
/// step 6's "configurable" timer).
const DEFAULT_IDLE_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Run a single iteration and return, instead of looping (spec 6's
    /// `--once` flag).
    pub once: bool,
    /// Scan and report what would be dispatched without spawning any
    /// agent.
    pub dry_run: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// `--once` completed, or the backlog drained and nothing else to do.
    Idle,
    /// The stop semaphore was set; the loop exited cleanly.
    Stopped,
    /// Hot-reload detected a source change; caller should `execv`.
    RestartPending,
}

/// Run exactly one iteration of the main loop's steps 1-5 (ingest,
/// recovery, backlog scan, dispatch). Step 2 (inbound Slack) and step 6
/// (hot-reload/idle wait) are the caller's concern via
/// [`run_until_idle_or_stopped`]; this function is the unit a `--once`
/// invocation runs.
pub async fn run_once(
    ctx: &PipelineContext,
    notifier: &dyn Notifier,
    circuit: &mut CircuitBreaker,
    options: &PipelineOptions,
) -> Result<bool> {
    if stop::is_stop_requested(&ctx.root.skip_semaphore()) {
        stop::clear_stop(&ctx.root.skip_semaphore())?;
        tracing::info!("skip marker present, skipping this iteration's work item");
        return Ok(false);
    }

    let ingested = ingest::ingest_ideas(&ctx.root, &ctx.harness, &ctx.default_model, ctx.config.task_timeout_secs).await?;
    if options.verbose && !ingested.is_empty() {
        tracing::info!(count = ingested.len(), "ingested raw ideas this iteration");
    }

    let recovered = recovery::recover_in_progress_plans(&ctx.root)?;
    for plan in &recovered {
        tracing::info!(plan = %plan.plan_name, "recovered in-progress plan, re-invoking executor");
        if !options.dry_run {
            if let Err(e) = crate::executor_invoke::invoke_executor(
                &ctx.executable_path,
                &plan.path,
                &plan.plan_name,
                &["--verbose"],
            ) {
                tracing::error!(plan = %plan.plan_name, error = %e, "failed to re-invoke executor for recovered plan");
            }
        }
    }

    let completed_slugs = Vec::new();
    let failed_slugs = Vec::new();
    let mut items = backlog::scan_backlog(&ctx.root, &completed_slugs, &failed_slugs)?;
    items.sort_by(|a, b| {
        backlog_priority(a.item_type)
            .cmp(&backlog_priority(b.item_type))
            .then_with(|| a.slug.cmp(&b.slug))
    });

    let Some(item) = items.into_iter().next() else {
        return Ok(false);
    };

    if options.dry_run {
        tracing::info!(slug = %item.slug, ?item.item_type, "dry run: would dispatch this item");
        return Ok(true);
    }

    let result = if item.item_type == BacklogType::Analysis {
        analysis_pipeline::process_analysis_item(ctx, notifier, &item).await
    } else {
        item_pipeline::process_item(ctx, notifier, &item, circuit)
            .await
            .map(|_| ())
    };

    if let Err(e) = result {
        tracing::error!(slug = %item.slug, error = %e, "item pipeline failed");
        notifier.notify_error(&format!("item {} failed: {e}", item.slug));
    }

    Ok(true)
}

fn backlog_priority(item_type: BacklogType) -> u8 {
    match item_type {
        BacklogType::Defect => 0,
        BacklogType::Feature => 1,
        BacklogType::Analysis => 2,
        BacklogType::Idea => 3,
    }
}

/// Drive the loop until the stop semaphore appears, a hot-reload is
/// pending, or (in `--once` mode) one iteration completes.
pub async fn run_until_idle_or_stopped(
    ctx: &PipelineContext,
    notifier: &dyn Notifier,
    watched_sources: Vec<std::path::PathBuf>,
    options: PipelineOptions,
) -> Result<PipelineOutcome> {
    let mut circuit = CircuitBreaker::default();
    let restart_flag = RestartFlag::new();
    let monitor = hotreload::spawn_monitor(watched_sources.clone(), 10, restart_flag.clone());

    let outcome = loop {
        if stop::is_stop_requested(&ctx.root.stop_semaphore()) {
            break PipelineOutcome::Stopped;
        }

        let did_work = run_once(ctx, notifier, &mut circuit, &options).await?;

        if options.once {
            break PipelineOutcome::Idle;
        }

        if restart_flag.is_set() {
            break PipelineOutcome::RestartPending;
        }

        if !did_work {
            tokio::time::sleep(DEFAULT_IDLE_WAIT).await;
        }
    };

    monitor.abort();
    Ok(outcome)
}

/// Convenience used at startup and after a hot-reload's baseline reset:
/// capture the current hash of the watched sources.
pub fn capture_baseline(watched_sources: &[&std::path::Path]) -> Result<HashSnapshot> {
    HashSnapshot::capture(watched_sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use catalyst_core::{AgentInvocation, Harness, OrchestratorConfig};
    use catalyst_store::paths::StoreRoot;
    use catalyst_types::TaskResult;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct NoopHarness;

    #[async_trait]
    impl Harness for NoopHarness {
        fn name(&self) -> &str {
            "noop"
        }

        async fn run(&self, _invocation: &AgentInvocation) -> Result<TaskResult> {
            Ok(TaskResult {
                success: true,
                message: "VERDICT: PASS".to_string(),
                duration_s: 0.1,
                plan_modified: false,
                rate_limited: false,
                rate_limit_reset_time: None,
                usage: Default::default(),
            })
        }
    }

    #[tokio::test]
    async fn run_once_is_idle_on_empty_backlog() {
        let dir = tempdir().unwrap();
        let root = StoreRoot::new(dir.path());
        for d in root.required_dirs() {
            std::fs::create_dir_all(d).unwrap();
        }
        let ctx = PipelineContext::new(
            root,
            OrchestratorConfig::default(),
            Arc::new(NoopHarness) as Arc<dyn Harness>,
            dir.path().join("catalyst"),
            "sonnet".to_string(),
        );
        let notifier = crate::notify::NullNotifier;
        let mut circuit = CircuitBreaker::default();
        let did_work = run_once(&ctx, &notifier, &mut circuit, &PipelineOptions::default())
            .await
            .unwrap();
        assert!(!did_work);
    }

    #[tokio::test]
    async fn dry_run_does_not_dispatch() {
        let dir = tempdir().unwrap();
        let root = StoreRoot::new(dir.path());
        for d in root.required_dirs() {
            std::fs::create_dir_all(d).unwrap();
        }
        std::fs::write(
            root.backlog_dir(BacklogType::Feature).join("0001-a.md"),
            "# A\n\n## Status: Open\n",
        )
        .unwrap();
        let ctx = PipelineContext::new(
            root,
            OrchestratorConfig::default(),
            Arc::new(NoopHarness) as Arc<dyn Harness>,
            dir.path().join("catalyst"),
            "sonnet".to_string(),
        );
        let notifier = crate::notify::NullNotifier;
        let mut circuit = CircuitBreaker::default();
        let options = PipelineOptions {
            dry_run: true,
            ..Default::default()
        };
        let did_work = run_once(&ctx, &notifier, &mut circuit, &options).await.unwrap();
        assert!(did_work);
        assert!(ctx.root.backlog_dir(BacklogType::Feature).join("0001-a.md").exists());
    }
}
