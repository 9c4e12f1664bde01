//! Everything a pipeline iteration needs: the store root, orchestrator
//! config, harness, this binary's own executable path (for re-invoking
//! the Executor as a subprocess and for hot-reload `execv`), and the
//! default model for agent sessions the pipeline spawns directly.

use std::path::PathBuf;
use std::sync::Arc;

use catalyst_core::{Harness, OrchestratorConfig};
use catalyst_store::StoreRoot;

/// Fixed set of names the ideas/5-Whys classifier may assign. Kept
/// narrow on purpose: an analysis item needs an `Analysis Type`, a
/// feature/defect item needs nothing more than this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemClassification {
    Feature,
    Defect,
    Analysis,
}

pub struct PipelineContext {
    pub root: StoreRoot,
    pub config: OrchestratorConfig,
    pub harness: Arc<dyn Harness>,
    /// Path to the `catalyst` executable itself, used to re-invoke the
    /// Executor as a child process (spec 4.2.2 phase 2) and to
    /// hot-reload (spec 4.2.5).
    pub executable_path: PathBuf,
    /// Base model for planner/verifier/classifier agent sessions the
    /// pipeline spawns directly (as opposed to task agents, which read
    /// their model off the plan's own escalation ladder).
    pub default_model: String,
}

impl PipelineContext {
    pub fn new(
        root: StoreRoot,
        config: OrchestratorConfig,
        harness: Arc<dyn Harness>,
        executable_path: PathBuf,
        default_model: String,
    ) -> Self {
        Self {
            root,
            config,
            harness,
            executable_path,
            default_model,
        }
    }
}
