//! Harness adapter interface for the LLM coding-agent CLI.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator
//!     |
//!     v
//! ClaudeCodeHarness::run(invocation) -> TaskResult
//! ```
//!
//! Unlike an interactive session, a harness run here is one subprocess
//! from spawn to exit: no stdin conversation, no event stream. The
//! orchestrator reads the authoritative result from the process's exit
//! plus its single JSON payload on stdout, and separately from the
//! task-status handshake file the agent itself wrote (see
//! `catalyst_store::handshake`).

pub mod claude_code;
pub mod rate_limit;
pub mod trait_def;
pub mod types;

pub use claude_code::ClaudeCodeHarness;
pub use trait_def::Harness;
pub use types::{AgentInvocation, OutputFormat, PermissionMode};
