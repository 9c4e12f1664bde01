//! Usage report JSON written alongside a plan on every executor run
//! (spec 3.2, 6: `.claude/plans/logs/<plan>-usage-report.json`).

use std::fs;
use std::path::Path;

use catalyst_types::{Plan, TaskUsage};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Per-plan rollup of every task's usage, written once per executor
/// run so the pipeline (and `catalyst report`) don't need to re-walk
/// the plan YAML to total cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub plan_name: String,
    pub total: TaskUsage,
    pub by_task: Vec<TaskUsageEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUsageEntry {
    pub task_id: String,
    pub usage: TaskUsage,
}

impl UsageReport {
    pub fn from_plan(plan: &Plan) -> Self {
        let mut total = TaskUsage::default();
        let by_task = plan
            .tasks()
            .filter_map(|t| t.usage.map(|u| (t.id.clone(), u)))
            .map(|(task_id, usage)| {
                total.add(&usage);
                TaskUsageEntry { task_id, usage }
            })
            .collect();
        UsageReport {
            plan_name: plan.meta.name.clone(),
            total,
            by_task,
        }
    }
}

pub fn write(path: &Path, report: &UsageReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).map_err(|source| StoreError::Json {
        path: path.to_owned(),
        source,
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_owned(),
            source,
        })?;
    }
    fs::write(path, json).map_err(|source| StoreError::Io {
        path: path.to_owned(),
        source,
    })
}

pub fn read(path: &Path) -> Result<UsageReport> {
    let raw = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| StoreError::Json {
        path: path.to_owned(),
        source,
    })
}
