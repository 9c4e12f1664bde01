//! Load, validate, and save plan YAML files (spec 3.1, 3.7).
//!
//! One function per operation over `serde_yaml` calls against a path,
//! with the invariants a relational store would enforce with
//! `FOREIGN KEY`/`UNIQUE` constraints (unique ids, known dependencies,
//! no cycles) checked by hand here at load time instead.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use catalyst_types::Plan;
use tracing::{debug, info};

use crate::error::{Result, StoreError};

/// Read a plan from disk and validate its invariants.
///
/// Returns [`StoreError::DependencyCycle`] eagerly rather than letting
/// the executor discover it later via deadlock detection (spec 9).
pub fn load_plan(path: &Path) -> Result<Plan> {
    let raw = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_owned(),
        source,
    })?;
    let plan: Plan = serde_yaml::from_str(&raw).map_err(|source| StoreError::Yaml {
        path: path.to_owned(),
        source,
    })?;
    validate_plan(path, &plan)?;
    debug!(path = %path.display(), tasks = plan.tasks().count(), "loaded plan");
    Ok(plan)
}

/// Check the invariants from spec 3.1 that aren't enforced by the type
/// system: unique task ids, `depends_on` referencing only existing
/// ids, and no dependency cycle.
pub fn validate_plan(path: &Path, plan: &Plan) -> Result<()> {
    let mut seen = HashSet::new();
    for task in plan.tasks() {
        if !seen.insert(task.id.as_str()) {
            return Err(StoreError::DuplicateTaskId {
                path: path.to_owned(),
                task_id: task.id.clone(),
            });
        }
    }

    let ids: HashSet<&str> = plan.tasks().map(|t| t.id.as_str()).collect();
    for task in plan.tasks() {
        for dep in &task.depends_on {
            if !ids.contains(dep.as_str()) {
                return Err(StoreError::UnknownDependency {
                    path: path.to_owned(),
                    task_id: task.id.clone(),
                    depends_on: dep.clone(),
                });
            }
        }
    }

    detect_cycle(path, plan)?;
    Ok(())
}

/// DFS-based cycle detection over the `depends_on` graph.
fn detect_cycle(path: &Path, plan: &Plan) -> Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        InProgress,
        Done,
    }

    let edges: HashMap<&str, &[String]> = plan
        .tasks()
        .map(|t| (t.id.as_str(), t.depends_on.as_slice()))
        .collect();

    let mut marks: HashMap<&str, Mark> = HashMap::new();

    fn visit<'a>(
        id: &'a str,
        edges: &HashMap<&'a str, &'a [String]>,
        marks: &mut HashMap<&'a str, Mark>,
        path: &Path,
    ) -> Result<()> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                return Err(StoreError::DependencyCycle {
                    path: path.to_owned(),
                    task_id: id.to_owned(),
                })
            }
            None => {}
        }
        marks.insert(id, Mark::InProgress);
        if let Some(deps) = edges.get(id) {
            for dep in deps.iter() {
                visit(dep.as_str(), edges, marks, path)?;
            }
        }
        marks.insert(id, Mark::Done);
        Ok(())
    }

    for id in edges.keys() {
        visit(id, &edges, &mut marks, path)?;
    }
    Ok(())
}

/// Write a plan back to disk, preserving the ban on resuming a
/// terminal plan: callers that already know `meta.status = failed`
/// should short-circuit before reaching this, this just guards the
/// write side against stamping a confusing state.
pub fn save_plan(path: &Path, plan: &Plan) -> Result<()> {
    let yaml = serde_yaml::to_string(plan).map_err(|source| StoreError::Yaml {
        path: path.to_owned(),
        source,
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_owned(),
            source,
        })?;
    }
    // Write to a temp file and rename so a crash mid-write never leaves
    // a half-written plan behind for the next executor run to parse.
    let tmp_path = path.with_extension("yaml.tmp");
    fs::write(&tmp_path, yaml).map_err(|source| StoreError::Io {
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| StoreError::Io {
        path: path.to_owned(),
        source,
    })?;
    info!(path = %path.display(), "saved plan");
    Ok(())
}

/// Reject attempts to operate on a terminal plan (spec 3.1: "A plan
/// with `meta.status = failed` is terminal and must not be resumed").
pub fn ensure_not_terminal(path: &Path, plan: &Plan) -> Result<()> {
    use catalyst_types::PlanRunStatus;
    if plan.meta.status == Some(PlanRunStatus::Failed) {
        return Err(StoreError::PlanTerminal {
            path: path.to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalyst_types::{PlanMeta, Section, Task, TaskStatus};
    use chrono::Utc;
    use tempfile::tempdir;

    fn task(id: &str, deps: &[&str]) -> Task {
        Task {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            status: TaskStatus::Pending,
            attempts: 0,
            max_attempts: 3,
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            parallel_group: None,
            exclusive_resources: vec![],
            agent: None,
            validation_findings: None,
            model_used: None,
            usage: None,
        }
    }

    fn plan_with_tasks(tasks: Vec<Task>) -> Plan {
        Plan {
            meta: PlanMeta {
                name: "test".into(),
                plan_doc: None,
                created: Utc::now(),
                status: None,
                pause_reason: None,
                budget: None,
                model_escalation: None,
                validation: None,
                step_notifications: None,
                judge_model: None,
            },
            sections: vec![Section {
                id: "s1".into(),
                name: "Section 1".into(),
                status: TaskStatus::Pending,
                tasks,
            }],
        }
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plan.yaml");
        let plan = plan_with_tasks(vec![task("a", &[]), task("b", &["a"])]);
        save_plan(&path, &plan).unwrap();
        let loaded = load_plan(&path).unwrap();
        assert_eq!(loaded, plan);
    }

    #[test]
    fn detects_duplicate_task_id() {
        let plan = plan_with_tasks(vec![task("a", &[]), task("a", &[])]);
        let err = validate_plan(Path::new("plan.yaml"), &plan).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateTaskId { .. }));
    }

    #[test]
    fn detects_unknown_dependency() {
        let plan = plan_with_tasks(vec![task("a", &["ghost"])]);
        let err = validate_plan(Path::new("plan.yaml"), &plan).unwrap_err();
        assert!(matches!(err, StoreError::UnknownDependency { .. }));
    }

    #[test]
    fn detects_simple_cycle() {
        let plan = plan_with_tasks(vec![task("a", &["b"]), task("b", &["a"])]);
        let err = validate_plan(Path::new("plan.yaml"), &plan).unwrap_err();
        assert!(matches!(err, StoreError::DependencyCycle { .. }));
    }

    #[test]
    fn accepts_diamond_dependency_shape() {
        let plan = plan_with_tasks(vec![
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("d", &["b", "c"]),
        ]);
        assert!(validate_plan(Path::new("plan.yaml"), &plan).is_ok());
    }

    #[test]
    fn ensure_not_terminal_rejects_failed_plan() {
        use catalyst_types::PlanRunStatus;
        let mut plan = plan_with_tasks(vec![task("a", &[])]);
        plan.meta.status = Some(PlanRunStatus::Failed);
        let err = ensure_not_terminal(Path::new("plan.yaml"), &plan).unwrap_err();
        assert!(matches!(err, StoreError::PlanTerminal { .. }));
    }
}
