//! Types describing a single agent subprocess invocation (spec 4.1.6).

use std::collections::HashMap;
use std::path::PathBuf;

/// How the agent CLI should report its final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    StreamJson,
}

impl OutputFormat {
    pub fn as_cli_value(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::StreamJson => "stream-json",
        }
    }
}

/// Permission mode passed to `--permission-mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionMode {
    AcceptEdits,
    Default,
    BypassPermissions,
}

impl PermissionMode {
    pub fn as_cli_value(self) -> &'static str {
        match self {
            Self::AcceptEdits => "acceptEdits",
            Self::Default => "default",
            Self::BypassPermissions => "bypassPermissions",
        }
    }
}

/// Everything the harness needs to spawn one agent subprocess run.
#[derive(Debug, Clone)]
pub struct AgentInvocation {
    pub task_id: String,
    pub prompt: String,
    pub model: String,
    pub working_dir: PathBuf,
    /// Extra directories granted via repeated `--add-dir`.
    pub add_dirs: Vec<PathBuf>,
    pub allowed_tools: String,
    pub permission_mode: PermissionMode,
    pub output_format: OutputFormat,
    pub timeout_secs: u64,
    pub env_vars: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_mode_cli_values() {
        assert_eq!(PermissionMode::AcceptEdits.as_cli_value(), "acceptEdits");
        assert_eq!(PermissionMode::Default.as_cli_value(), "default");
        assert_eq!(PermissionMode::BypassPermissions.as_cli_value(), "bypassPermissions");
    }

    #[test]
    fn output_format_cli_values() {
        assert_eq!(OutputFormat::Json.as_cli_value(), "json");
        assert_eq!(OutputFormat::StreamJson.as_cli_value(), "stream-json");
    }
}
