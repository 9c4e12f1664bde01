//! Analysis item pipeline (spec 4.2.4): a single read-only agent pass,
//! no plan, no verification cycle.

use anyhow::{Context, Result};
use catalyst_core::{AgentInvocation, OutputFormat, PermissionMode, PermissionProfile};
use catalyst_store::backlog;
use catalyst_types::{BacklogItem, BacklogStatus};

use crate::context::PipelineContext;
use crate::notify::Notifier;

/// The `## Analysis Type` field selects which read-only agent persona
/// handles the item; the `## Output Format` field selects the delivery
/// channel. Both default to the plainest option when absent.
fn field(body: &str, name: &str) -> Option<String> {
    let marker = format!("## {name}");
    let start = body.find(&marker)? + marker.len();
    let rest = &body[start..];
    let end = rest.find("\n##").unwrap_or(rest.len());
    let value = rest[..end].trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub async fn process_analysis_item(ctx: &PipelineContext, notifier: &dyn Notifier, item: &BacklogItem) -> Result<()> {
    let analysis_type = field(&item.body, "Analysis Type").unwrap_or_else(|| "general".to_string());
    let output_format = field(&item.body, "Output Format").unwrap_or_else(|| "report".to_string());

    let prompt = format!(
        "You are a read-only `{analysis_type}` analysis agent. Produce a \
         markdown report answering the scope below; do not modify any \
         file.\n\nScope:\n---\n{}\n---",
        item.body
    );

    let invocation = AgentInvocation {
        task_id: format!("analysis-{}", item.slug),
        prompt,
        model: ctx.default_model.clone(),
        working_dir: ctx.root.root().to_path_buf(),
        add_dirs: vec![],
        allowed_tools: PermissionProfile::ReadOnly.allowed_tools().to_string(),
        permission_mode: PermissionMode::Default,
        output_format: OutputFormat::Json,
        timeout_secs: ctx.config.task_timeout_secs,
        env_vars: Default::default(),
    };

    let result = ctx.harness.run(&invocation).await?;
    if !result.success {
        anyhow::bail!("analysis agent reported failure: {}", result.message);
    }

    if output_format.eq_ignore_ascii_case("slack") || output_format.eq_ignore_ascii_case("chat") {
        notifier.post_report(&item.slug, &result.message);
    } else {
        let reports_dir = ctx.root.reports_dir();
        std::fs::create_dir_all(&reports_dir)
            .with_context(|| format!("creating {}", reports_dir.display()))?;
        let report_path = reports_dir.join(format!("{}.md", item.slug));
        std::fs::write(&report_path, &result.message)
            .with_context(|| format!("writing report to {}", report_path.display()))?;
    }

    backlog::set_status(&item.path, BacklogStatus::Completed)?;
    backlog::archive_item(&ctx.root, item)?;
    notifier.notify_completion(item.item_type, &item.slug, "analysis delivered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_extracts_analysis_type() {
        let body = "# Item\n\n## Analysis Type\nSecurity\n\n## Output Format\nSlack\n";
        assert_eq!(field(body, "Analysis Type").as_deref(), Some("Security"));
        assert_eq!(field(body, "Output Format").as_deref(), Some("Slack"));
    }

    #[test]
    fn field_absent_returns_none() {
        let body = "# Item\n\nNo fields here.\n";
        assert_eq!(field(body, "Analysis Type"), None);
    }

    use async_trait::async_trait;
    use catalyst_core::{Harness, OrchestratorConfig};
    use catalyst_store::paths::StoreRoot;
    use catalyst_types::{BacklogType, TaskResult};
    use std::sync::Arc;
    use tempfile::tempdir;

    struct StubHarness;

    #[async_trait]
    impl Harness for StubHarness {
        fn name(&self) -> &str {
            "stub"
        }

        async fn run(&self, _invocation: &AgentInvocation) -> anyhow::Result<TaskResult> {
            Ok(TaskResult {
                success: true,
                message: "# Findings\n\nNothing notable.".to_string(),
                duration_s: 0.1,
                plan_modified: false,
                rate_limited: false,
                rate_limit_reset_time: None,
                usage: Default::default(),
            })
        }
    }

    #[tokio::test]
    async fn writes_report_file_for_non_slack_output() {
        let dir = tempdir().unwrap();
        let root = StoreRoot::new(dir.path());
        std::fs::create_dir_all(root.backlog_dir(BacklogType::Analysis)).unwrap();
        let item_path = root.backlog_dir(BacklogType::Analysis).join("0001-a.md");
        std::fs::write(
            &item_path,
            "# Item\n\n## Status: Open\n\n## Analysis Type\nSecurity\n\n## Output Format\nFile\n",
        )
        .unwrap();
        let item = backlog::parse_item(&item_path, BacklogType::Analysis).unwrap();

        let ctx = PipelineContext::new(
            root.clone(),
            OrchestratorConfig::default(),
            Arc::new(StubHarness) as Arc<dyn Harness>,
            dir.path().join("catalyst"),
            "sonnet".to_string(),
        );
        let notifier = crate::notify::NullNotifier;
        process_analysis_item(&ctx, &notifier, &item).await.unwrap();

        assert!(root.reports_dir().join("0001-a.md").exists());
        assert!(root.archive_dir(BacklogType::Analysis).join("0001-a.md").exists());
    }
}
