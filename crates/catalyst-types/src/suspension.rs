//! The suspension marker file (spec 3.6): a work item parked pending a
//! human reply in chat. Its presence hides the item from backlog scans
//! until an `answer` is appended, at which point the next pipeline
//! cycle reinstates it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspensionMarker {
    pub slug: String,
    pub item_type: String,
    pub item_path: std::path::PathBuf,
    pub plan_path: std::path::PathBuf,
    pub task_id: String,
    pub question: String,
    #[serde(default)]
    pub context: String,
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    pub suspended_at: DateTime<Utc>,
    pub timeout_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

impl SuspensionMarker {
    /// An item stays hidden from scans only while unanswered.
    pub fn is_pending(&self) -> bool {
        self.answer.is_none()
    }

    pub fn has_timed_out(&self, now: DateTime<Utc>) -> bool {
        let deadline = self.suspended_at + chrono::Duration::minutes(self.timeout_minutes as i64);
        self.is_pending() && now >= deadline
    }
}
