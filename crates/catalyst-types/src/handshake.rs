//! The task-status handshake file (spec 3.4): the orchestrator-agent ABI.
//!
//! A single JSON file at a well-known path. The orchestrator clears it
//! before each task and ignores any file whose `task_id` doesn't match
//! the task currently in flight -- this is how a stale write from a
//! previous, timed-out invocation gets discarded rather than misread.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::ValidationFinding;

/// Status the agent reports for the task it just ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeStatus {
    Completed,
    Failed,
    Suspended,
}

impl fmt::Display for HandshakeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Suspended => "suspended",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct HandshakeStatusParseError(pub String);

impl fmt::Display for HandshakeStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid handshake status: {:?}", self.0)
    }
}

impl std::error::Error for HandshakeStatusParseError {}

impl FromStr for HandshakeStatus {
    type Err = HandshakeStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "suspended" => Ok(Self::Suspended),
            other => Err(HandshakeStatusParseError(other.to_owned())),
        }
    }
}

/// A Slack message the agent wants relayed on the executor's behalf
/// (e.g. a progress note posted mid-task).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeSlackMessage {
    pub channel_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

/// The handshake file's JSON shape (spec 3.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeFile {
    pub task_id: String,
    pub status: HandshakeStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub plan_modified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_messages: Option<Vec<HandshakeSlackMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_findings: Option<Vec<ValidationFinding>>,
}

impl HandshakeFile {
    /// Whether this handshake belongs to the task currently in flight.
    /// A mismatch means the file is a stale write from a previous,
    /// already-timed-out invocation and must be ignored.
    pub fn matches_task(&self, expected_task_id: &str) -> bool {
        self.task_id == expected_task_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for v in [
            HandshakeStatus::Completed,
            HandshakeStatus::Failed,
            HandshakeStatus::Suspended,
        ] {
            assert_eq!(v, v.to_string().parse().unwrap());
        }
    }

    #[test]
    fn matches_task_rejects_stale_handshake() {
        let h = HandshakeFile {
            task_id: "t1".into(),
            status: HandshakeStatus::Completed,
            message: "done".into(),
            timestamp: Utc::now(),
            plan_modified: false,
            slack_messages: None,
            validation_findings: None,
        };
        assert!(h.matches_task("t1"));
        assert!(!h.matches_task("t2"));
    }

    #[test]
    fn deserializes_minimal_json() {
        let json = r#"{
            "task_id": "t1",
            "status": "completed",
            "message": "ok",
            "timestamp": "2026-01-01T00:00:00Z",
            "plan_modified": false
        }"#;
        let h: HandshakeFile = serde_json::from_str(json).unwrap();
        assert_eq!(h.status, HandshakeStatus::Completed);
        assert!(h.slack_messages.is_none());
    }
}
