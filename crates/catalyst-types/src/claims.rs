//! Claims and heartbeats for parallel worktree execution (spec 3.5).
//!
//! Two JSON files: a claims file mapping file path -> owning worker id,
//! and a per-worker status file carrying a heartbeat instant. Staleness
//! is judged by age and by the owner's last-known status, not decided
//! here -- that policy lives in `catalyst-store`/`catalyst-core`, this
//! module only holds the shapes.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a parallel worker, as reported in its status file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Running,
    Completed,
    Failed,
}

impl WorkerStatus {
    /// Terminal statuses mean any claim held by this worker is eligible
    /// for collection regardless of age.
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerStatus::Completed | WorkerStatus::Failed)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One worker's claim over a single file path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimEntry {
    pub worker_id: String,
    pub task_id: String,
    pub claimed_at: DateTime<Utc>,
}

/// The claims file: `file_path -> ClaimEntry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ClaimsFile {
    #[serde(flatten)]
    pub claims: HashMap<String, ClaimEntry>,
}

impl ClaimsFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths already claimed by some worker other than `worker_id`.
    pub fn conflicts_for(&self, worker_id: &str, paths: &[String]) -> Vec<String> {
        paths
            .iter()
            .filter(|p| {
                self.claims
                    .get(p.as_str())
                    .is_some_and(|c| c.worker_id != worker_id)
            })
            .cloned()
            .collect()
    }

    pub fn claim(&mut self, path: String, entry: ClaimEntry) {
        self.claims.insert(path, entry);
    }

    pub fn release_worker(&mut self, worker_id: &str) {
        self.claims.retain(|_, c| c.worker_id != worker_id);
    }

    /// Drop claims older than `max_age` or owned by a worker whose
    /// reported status is terminal.
    pub fn collect_stale(
        &mut self,
        now: DateTime<Utc>,
        max_age: chrono::Duration,
        worker_statuses: &HashMap<String, WorkerStatus>,
    ) {
        self.claims.retain(|_, entry| {
            let age = now.signed_duration_since(entry.claimed_at);
            let terminal = worker_statuses
                .get(&entry.worker_id)
                .is_some_and(|s| s.is_terminal());
            age < max_age && !terminal
        });
    }
}

/// A worker's heartbeat status file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatusFile {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub last_heartbeat: DateTime<Utc>,
}
