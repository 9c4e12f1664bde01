//! Orchestrator-wide configuration (spec 6: `.claude/orchestrator-config.yaml`).
//!
//! Resolution chain: CLI flag overrides env var overrides config file
//! overrides compiled-in default.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// `.claude/orchestrator-config.yaml`'s shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub build_command: Option<String>,
    #[serde(default)]
    pub test_command: Option<String>,
    #[serde(default)]
    pub dev_server_command: Option<String>,
    #[serde(default)]
    pub dev_server_port: Option<u16>,
    #[serde(default = "default_agents_dir")]
    pub agents_dir: String,
    #[serde(default)]
    pub spec_dir: Option<String>,
    /// Pluggable smoke-test runner, independent of any dev-server port
    /// assumption. Falls back to `test_command` when absent.
    #[serde(default)]
    pub smoke_command: Option<String>,
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    #[serde(default)]
    pub dangerously_skip_permissions: bool,
    /// Concurrency cap for a parallel-group worktree fan-out (spec 4.1.3).
    #[serde(default = "default_max_parallel_agents")]
    pub max_parallel_agents: usize,
}

fn default_agents_dir() -> String {
    ".claude/agents".to_string()
}

fn default_task_timeout_secs() -> u64 {
    600
}

fn default_max_parallel_agents() -> usize {
    4
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            build_command: None,
            test_command: None,
            dev_server_command: None,
            dev_server_port: None,
            agents_dir: default_agents_dir(),
            spec_dir: None,
            smoke_command: None,
            task_timeout_secs: default_task_timeout_secs(),
            dangerously_skip_permissions: false,
            max_parallel_agents: default_max_parallel_agents(),
        }
    }
}

impl OrchestratorConfig {
    /// Load from `path` if present, else fall back to defaults, then
    /// apply environment variable overrides. CLI-flag overrides are
    /// applied by the caller on top of the returned value (clap's
    /// flags take precedence over everything here).
    pub fn resolve(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&raw)?
        } else {
            Self::default()
        };

        if let Ok(cmd) = env::var("CLAUDE_CMD") {
            config.build_command.get_or_insert(cmd);
        }

        Ok(config)
    }

    /// The effective smoke-test command: `smoke_command` if set, else
    /// `test_command`.
    pub fn effective_smoke_command(&self) -> Option<&str> {
        self.smoke_command
            .as_deref()
            .or(self.test_command.as_deref())
    }

    pub fn agents_dir_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.agents_dir)
    }
}

/// `.claude/slack.local.yaml`'s shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub app_token: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub channel_prefix: Option<String>,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub questions: QuestionsConfig,
    #[serde(default)]
    pub conversation_history: ConversationHistoryConfig,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: None,
            app_token: None,
            channel_id: None,
            channel_prefix: None,
            notify: NotifyConfig::default(),
            questions: QuestionsConfig::default(),
            conversation_history: ConversationHistoryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifyConfig {
    #[serde(default)]
    pub on_completion: bool,
    #[serde(default)]
    pub on_failure: bool,
    #[serde(default)]
    pub on_suspend: bool,
    #[serde(default)]
    pub on_budget_pause: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_question_timeout_minutes")]
    pub timeout_minutes: u32,
    #[serde(default)]
    pub fallback: Option<String>,
}

fn default_question_timeout_minutes() -> u32 {
    60
}

impl Default for QuestionsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_minutes: default_question_timeout_minutes(),
            fallback: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationHistoryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
}

fn default_max_turns() -> u32 {
    20
}

impl Default for ConversationHistoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_turns: default_max_turns(),
        }
    }
}

impl SlackConfig {
    pub fn resolve(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_task_timeout_is_600() {
        assert_eq!(OrchestratorConfig::default().task_timeout_secs, 600);
    }

    #[test]
    fn effective_smoke_command_falls_back_to_test_command() {
        let config = OrchestratorConfig {
            test_command: Some("npm test".into()),
            ..Default::default()
        };
        assert_eq!(config.effective_smoke_command(), Some("npm test"));
    }

    #[test]
    fn effective_smoke_command_prefers_explicit_smoke_command() {
        let config = OrchestratorConfig {
            test_command: Some("npm test".into()),
            smoke_command: Some("npm run smoke".into()),
            ..Default::default()
        };
        assert_eq!(config.effective_smoke_command(), Some("npm run smoke"));
    }

    #[test]
    fn resolve_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config = OrchestratorConfig::resolve(&dir.path().join("missing.yaml")).unwrap();
        assert_eq!(config.task_timeout_secs, 600);
    }

    #[test]
    fn resolve_reads_yaml_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orchestrator-config.yaml");
        std::fs::write(&path, "test_command: \"cargo test\"\ntask_timeout_secs: 120\n").unwrap();
        let config = OrchestratorConfig::resolve(&path).unwrap();
        assert_eq!(config.test_command.as_deref(), Some("cargo test"));
        assert_eq!(config.task_timeout_secs, 120);
    }

    #[test]
    fn default_max_parallel_agents_is_four() {
        assert_eq!(OrchestratorConfig::default().max_parallel_agents, 4);
    }

    #[test]
    fn slack_config_disabled_by_default() {
        let dir = tempdir().unwrap();
        let config = SlackConfig::resolve(&dir.path().join("missing.yaml")).unwrap();
        assert!(!config.enabled);
    }
}
