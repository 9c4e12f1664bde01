//! Well-known paths under a project root (spec 6, "Persisted state layout").
//!
//! A single handle every other module takes by reference to find its
//! files, in place of a connection pool: there's no database here, the
//! filesystem is the store.

use std::path::{Path, PathBuf};

use catalyst_types::BacklogType;

/// A project root plus the fixed directory layout the orchestrator
/// expects beneath it.
#[derive(Debug, Clone)]
pub struct StoreRoot {
    root: PathBuf,
}

impl StoreRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn claude(&self) -> PathBuf {
        self.root.join(".claude")
    }

    fn docs(&self) -> PathBuf {
        self.root.join("docs")
    }

    pub fn plans_dir(&self) -> PathBuf {
        self.claude().join("plans")
    }

    pub fn plan_path(&self, slug: &str) -> PathBuf {
        self.plans_dir().join(format!("{slug}.yaml"))
    }

    pub fn stop_semaphore(&self) -> PathBuf {
        self.plans_dir().join(".stop")
    }

    /// Marker written by the `control_skip` inbound classification
    /// (spec 4.3.3): the current work item is abandoned on the next
    /// main-loop check, without halting the whole pipeline.
    pub fn skip_semaphore(&self) -> PathBuf {
        self.plans_dir().join(".skip")
    }

    pub fn task_status_path(&self) -> PathBuf {
        self.plans_dir().join("task-status.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.plans_dir().join("logs")
    }

    pub fn usage_report_path(&self, slug: &str) -> PathBuf {
        self.logs_dir().join(format!("{slug}-usage-report.json"))
    }

    pub fn task_log_path(&self, task_id: &str) -> PathBuf {
        self.logs_dir().join(format!("task-{task_id}.log"))
    }

    pub fn subagent_status_dir(&self) -> PathBuf {
        self.claude().join("subagent-status")
    }

    pub fn subagent_status_path(&self, worker_id: &str) -> PathBuf {
        self.subagent_status_dir().join(format!("{worker_id}.json"))
    }

    pub fn agent_claims_path(&self) -> PathBuf {
        self.claude().join("agent-claims.json")
    }

    pub fn suspended_dir(&self) -> PathBuf {
        self.claude().join("suspended")
    }

    pub fn suspension_path(&self, slug: &str) -> PathBuf {
        self.suspended_dir().join(format!("{slug}.json"))
    }

    pub fn slack_last_read_path(&self) -> PathBuf {
        self.claude().join("slack-last-read.json")
    }

    pub fn pipeline_pid_path(&self) -> PathBuf {
        self.claude().join("pipeline.pid")
    }

    pub fn pipeline_log_path(&self) -> PathBuf {
        self.root.join("logs").join("pipeline.log")
    }

    pub fn slug_log_path(&self, slug: &str) -> PathBuf {
        self.root.join("logs").join(format!("{slug}.log"))
    }

    pub fn agents_dir(&self) -> PathBuf {
        self.claude().join("agents")
    }

    pub fn orchestrator_config_path(&self) -> PathBuf {
        self.claude().join("orchestrator-config.yaml")
    }

    pub fn slack_config_path(&self) -> PathBuf {
        self.claude().join("slack.local.yaml")
    }

    /// `docs/{defect,feature,analysis}-backlog/` or `docs/ideas/`.
    pub fn backlog_dir(&self, item_type: BacklogType) -> PathBuf {
        match item_type.backlog_dir_name() {
            Some(name) => self.docs().join(name),
            None => self.docs().join("ideas"),
        }
    }

    /// `docs/completed-backlog/{defects,features,analyses}/` or
    /// `docs/ideas/processed/`.
    pub fn archive_dir(&self, item_type: BacklogType) -> PathBuf {
        match item_type.backlog_dir_name() {
            Some(_) => self.docs().join("completed-backlog").join(item_type.archive_dir_name()),
            None => self.docs().join("ideas").join("processed"),
        }
    }

    pub fn plans_doc_dir(&self) -> PathBuf {
        self.docs().join("plans")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.docs().join("reports")
    }

    /// All directories the pipeline ensures exist at startup (spec
    /// 4.2.1's "ensure required directories exist").
    pub fn required_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.plans_dir(),
            self.logs_dir(),
            self.subagent_status_dir(),
            self.suspended_dir(),
            self.agents_dir(),
            self.plans_doc_dir(),
            self.reports_dir(),
            self.backlog_dir(BacklogType::Defect),
            self.backlog_dir(BacklogType::Feature),
            self.backlog_dir(BacklogType::Analysis),
            self.backlog_dir(BacklogType::Idea),
            self.archive_dir(BacklogType::Defect),
            self.archive_dir(BacklogType::Feature),
            self.archive_dir(BacklogType::Analysis),
            self.archive_dir(BacklogType::Idea),
            self.root.join("logs"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_path_is_under_plans_dir() {
        let root = StoreRoot::new("/repo");
        assert_eq!(
            root.plan_path("0001-foo"),
            PathBuf::from("/repo/.claude/plans/0001-foo.yaml")
        );
    }

    #[test]
    fn backlog_dir_for_idea_has_no_backlog_suffix() {
        let root = StoreRoot::new("/repo");
        assert_eq!(
            root.backlog_dir(BacklogType::Idea),
            PathBuf::from("/repo/docs/ideas")
        );
    }

    #[test]
    fn archive_dir_matches_spec_layout() {
        let root = StoreRoot::new("/repo");
        assert_eq!(
            root.archive_dir(BacklogType::Defect),
            PathBuf::from("/repo/docs/completed-backlog/defects")
        );
        assert_eq!(
            root.archive_dir(BacklogType::Idea),
            PathBuf::from("/repo/docs/ideas/processed")
        );
    }

    #[test]
    fn skip_semaphore_is_sibling_of_stop_semaphore() {
        let root = StoreRoot::new("/repo");
        assert_eq!(root.skip_semaphore(), PathBuf::from("/repo/.claude/plans/.skip"));
    }

    #[test]
    fn required_dirs_nonempty() {
        let root = StoreRoot::new("/repo");
        assert!(!root.required_dirs().is_empty());
    }
}
