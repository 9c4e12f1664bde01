use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the filesystem persistence layer.
///
/// Call sites that only need to propagate a failure should prefer
/// `anyhow::Result` with `.context()`; this type exists for the handful
/// of cases (`catalyst-core`'s main loop) that need to match on what
/// went wrong.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("plan {path} has a duplicate task id: {task_id}")]
    DuplicateTaskId { path: PathBuf, task_id: String },

    #[error("plan {path} has a dependency cycle involving task {task_id}")]
    DependencyCycle { path: PathBuf, task_id: String },

    #[error("plan {path} task {task_id} depends on unknown task {depends_on}")]
    UnknownDependency {
        path: PathBuf,
        task_id: String,
        depends_on: String,
    },

    #[error("plan {path} is terminal (meta.status = failed) and cannot be resumed")]
    PlanTerminal { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, StoreError>;
