//! Claude Code harness adapter.
//!
//! Spawns `claude --print --output-format json ...` and waits for it to
//! exit (spec 4.1.6: one-shot subprocess, not an interactive session).
//! stdin is `/dev/null` -- the agent is never expected to read from it.

use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use catalyst_types::{TaskResult, TaskUsage};
use tokio::process::Command;
use tracing::warn;

use super::rate_limit::{mentions_rate_limit, resolve_rate_limit_reset};
use super::trait_def::Harness;
use super::types::AgentInvocation;

/// Harness adapter for [Claude Code](https://docs.anthropic.com/en/docs/claude-code).
#[derive(Clone)]
pub struct ClaudeCodeHarness {
    /// Path to the `claude` binary. Defaults to `"claude"` (found via `$PATH`).
    binary_path: String,
}

impl std::fmt::Debug for ClaudeCodeHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeCodeHarness")
            .field("binary_path", &self.binary_path)
            .finish()
    }
}

impl ClaudeCodeHarness {
    pub fn new() -> Self {
        Self {
            binary_path: "claude".to_string(),
        }
    }

    pub fn with_binary(path: impl Into<String>) -> Self {
        Self {
            binary_path: path.into(),
        }
    }

    fn build_command(&self, invocation: &AgentInvocation) -> Command {
        let mut cmd = Command::new(&self.binary_path);

        cmd.arg("--print")
            .arg("--output-format")
            .arg(invocation.output_format.as_cli_value())
            .arg("--model")
            .arg(&invocation.model)
            .arg("--allowedTools")
            .arg(&invocation.allowed_tools)
            .arg("--permission-mode")
            .arg(invocation.permission_mode.as_cli_value())
            .arg(&invocation.prompt);

        for dir in &invocation.add_dirs {
            cmd.arg("--add-dir").arg(dir);
        }

        cmd.current_dir(&invocation.working_dir);
        for (key, value) in &invocation.env_vars {
            cmd.env(key, value);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }
}

impl Default for ClaudeCodeHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the single JSON result object the `json` output format emits
/// on stdout after the process exits.
fn parse_result_json(stdout: &str) -> Option<ResultPayload> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

#[derive(Debug, serde::Deserialize)]
struct ResultPayload {
    #[serde(default)]
    result: String,
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    num_turns: u32,
    #[serde(default)]
    duration_api_ms: u64,
    #[serde(default)]
    total_cost_usd: f64,
    #[serde(default)]
    usage: Option<UsagePayload>,
}

#[derive(Debug, serde::Deserialize)]
struct UsagePayload {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
}

#[async_trait]
impl Harness for ClaudeCodeHarness {
    fn name(&self) -> &str {
        "claude-code"
    }

    async fn run(&self, invocation: &AgentInvocation) -> Result<TaskResult> {
        let mut cmd = self.build_command(invocation);

        let start = Instant::now();
        let child = cmd.spawn().with_context(|| {
            format!(
                "failed to spawn claude binary at '{}' -- is it installed and on PATH?",
                self.binary_path
            )
        })?;

        let timeout = Duration::from_secs(invocation.timeout_secs);
        let outcome = tokio::time::timeout(timeout, child.wait_with_output()).await;
        let duration_s = start.elapsed().as_secs_f64();

        let output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Ok(TaskResult {
                    success: false,
                    message: format!("agent subprocess error: {e}"),
                    duration_s,
                    plan_modified: false,
                    rate_limited: false,
                    rate_limit_reset_time: None,
                    usage: TaskUsage::default(),
                });
            }
            Err(_) => {
                return Ok(TaskResult {
                    success: false,
                    message: format!("agent subprocess timed out after {}s", invocation.timeout_secs),
                    duration_s,
                    plan_modified: false,
                    rate_limited: false,
                    rate_limit_reset_time: None,
                    usage: TaskUsage::default(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = format!("{stdout}\n{stderr}");

        let rate_limited = mentions_rate_limit(&combined);
        let rate_limit_reset_time = resolve_rate_limit_reset(&combined);

        let Some(payload) = parse_result_json(&stdout) else {
            warn!(
                task_id = %invocation.task_id,
                "claude produced no parseable result JSON on stdout"
            );
            return Ok(TaskResult {
                success: output.status.success() && !rate_limited,
                message: if stderr.trim().is_empty() {
                    "agent produced no parseable result".to_string()
                } else {
                    stderr.trim().to_string()
                },
                duration_s,
                plan_modified: false,
                rate_limited,
                rate_limit_reset_time,
                usage: TaskUsage::default(),
            });
        };

        let usage = payload
            .usage
            .map(|u| TaskUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
                cache_read_tokens: u.cache_read_input_tokens,
                cache_create_tokens: u.cache_creation_input_tokens,
                total_cost_usd: payload.total_cost_usd,
                num_turns: payload.num_turns,
                duration_api_ms: payload.duration_api_ms,
            })
            .unwrap_or_else(|| TaskUsage {
                total_cost_usd: payload.total_cost_usd,
                num_turns: payload.num_turns,
                duration_api_ms: payload.duration_api_ms,
                ..TaskUsage::default()
            });

        Ok(TaskResult {
            success: output.status.success() && !payload.is_error && !rate_limited,
            message: payload.result,
            duration_s,
            plan_modified: false,
            rate_limited,
            rate_limit_reset_time,
            usage,
        })
    }
}
