//! Task results and usage accounting.
//!
//! `TaskUsage` is authoritative from the agent CLI: `total_cost_usd` is
//! never recomputed from token counts, it is copied verbatim from the
//! agent's `result` event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Usage reported by a single agent invocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct TaskUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_create_tokens: u64,
    /// Authoritative cost from the agent CLI. Never derive this from
    /// token counts -- pricing tables drift, the CLI's own number does not.
    pub total_cost_usd: f64,
    pub num_turns: u32,
    pub duration_api_ms: u64,
}

impl TaskUsage {
    /// Fold another usage record into this one (used to accumulate plan
    /// totals across tasks).
    pub fn add(&mut self, other: &TaskUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cache_create_tokens += other.cache_create_tokens;
        self.total_cost_usd += other.total_cost_usd;
        self.num_turns += other.num_turns;
        self.duration_api_ms += other.duration_api_ms;
    }
}

/// The outcome of a single agent invocation, as parsed from the
/// task-status handshake plus process-level observations (duration,
/// rate-limit detection) the agent itself cannot report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub message: String,
    pub duration_s: f64,
    pub plan_modified: bool,
    pub rate_limited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_reset_time: Option<DateTime<Utc>>,
    pub usage: TaskUsage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_accumulates_cost_authoritatively() {
        let mut total = TaskUsage::default();
        total.add(&TaskUsage {
            total_cost_usd: 0.10,
            input_tokens: 100,
            ..Default::default()
        });
        total.add(&TaskUsage {
            total_cost_usd: 0.15,
            input_tokens: 50,
            ..Default::default()
        });
        assert!((total.total_cost_usd - 0.25).abs() < 1e-9);
        assert_eq!(total.input_tokens, 150);
    }
}
