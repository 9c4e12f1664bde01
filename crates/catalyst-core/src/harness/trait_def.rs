//! The `Harness` trait -- the adapter interface for agent CLIs.
//!
//! A harness runs one [`AgentInvocation`] to completion (spec 4.1.6's
//! subprocess contract is one-shot: `--print`, wait for exit, parse the
//! final JSON result) and returns the authoritative [`TaskResult`].

use anyhow::Result;
use async_trait::async_trait;
use catalyst_types::TaskResult;

use super::types::AgentInvocation;

/// Adapter interface for running an LLM coding-agent CLI to completion.
///
/// Object-safe so it can be stored as `Box<dyn Harness>`.
#[async_trait]
pub trait Harness: Send + Sync {
    /// Human-readable name for this harness (e.g. "claude-code").
    fn name(&self) -> &str;

    /// Spawn the agent subprocess, wait for it to exit or time out, and
    /// parse its final result into a [`TaskResult`]. A malformed or
    /// missing result never panics; it becomes `success: false`.
    async fn run(&self, invocation: &AgentInvocation) -> Result<TaskResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    use crate::harness::types::{OutputFormat, PermissionMode};

    struct NoopHarness;

    #[async_trait]
    impl Harness for NoopHarness {
        fn name(&self) -> &str {
            "noop"
        }

        async fn run(&self, _invocation: &AgentInvocation) -> Result<TaskResult> {
            Ok(TaskResult {
                success: true,
                message: "noop".to_string(),
                duration_s: 0.0,
                plan_modified: false,
                rate_limited: false,
                rate_limit_reset_time: None,
                usage: Default::default(),
            })
        }
    }

    fn sample_invocation() -> AgentInvocation {
        AgentInvocation {
            task_id: "t1".into(),
            prompt: "do the thing".into(),
            model: "sonnet".into(),
            working_dir: PathBuf::from("/tmp"),
            add_dirs: vec![],
            allowed_tools: "Read".into(),
            permission_mode: PermissionMode::Default,
            output_format: OutputFormat::Json,
            timeout_secs: 600,
            env_vars: HashMap::new(),
        }
    }

    #[test]
    fn harness_is_object_safe() {
        let harness: Box<dyn Harness> = Box::new(NoopHarness);
        assert_eq!(harness.name(), "noop");
    }

    #[tokio::test]
    async fn noop_harness_runs() {
        let harness = NoopHarness;
        let result = harness.run(&sample_invocation()).await.unwrap();
        assert!(result.success);
    }
}
