use thiserror::Error;

/// Typed errors from the executor's own control flow -- distinct from
/// `anyhow::Error`, which is what call sites propagate by default. Only
/// the cases a caller actually branches on get a variant here.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("plan deadlocked: {0} non-terminal task(s) blocked on failed/suspended dependencies")]
    Deadlocked(usize),

    #[error("circuit breaker open, {remaining_secs}s until reset")]
    CircuitOpen { remaining_secs: u64 },

    #[error("agent subprocess timed out after {0}s")]
    Timeout(u64),

    #[error("agent subprocess exited with status {0}")]
    NonZeroExit(i32),
}
