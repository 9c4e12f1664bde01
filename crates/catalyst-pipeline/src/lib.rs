//! The Work-Item Pipeline: the outer loop that turns backlog markdown
//! items into plans and drives them through the Executor (spec 4.2).
//!
//! Where `catalyst-core` owns a single plan's dispatch loop, this crate
//! owns the loop above it: ingesting ideas, scanning the backlog,
//! recovering in-progress plans after a crash, running one work item
//! at a time through plan/execute/verify/archive, and hot-reloading
//! itself when the orchestrator's own source changes.

pub mod analysis_pipeline;
pub mod context;
pub mod executor_invoke;
pub mod hotreload;
pub mod ingest;
pub mod item_pipeline;
pub mod notify;
pub mod recovery;
pub mod run_loop;
pub mod startup;

pub use context::PipelineContext;
pub use notify::{NullNotifier, Notifier};
pub use run_loop::{run_once, run_until_idle_or_stopped, PipelineOptions, PipelineOutcome};
