//! Backlog items (spec 3.3): markdown files in one of four directories,
//! each with a required `## Status:` line.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The directory (or idea source) an item was discovered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacklogType {
    Defect,
    Feature,
    Analysis,
    Idea,
}

impl BacklogType {
    /// The `docs/{...}-backlog` directory name this type is scanned from,
    /// or `None` for ideas, which live in `docs/ideas/` instead.
    pub fn backlog_dir_name(self) -> Option<&'static str> {
        match self {
            Self::Defect => Some("defect-backlog"),
            Self::Feature => Some("feature-backlog"),
            Self::Analysis => Some("analysis-backlog"),
            Self::Idea => None,
        }
    }

    /// The `docs/completed-backlog/{...}` archive subdirectory.
    pub fn archive_dir_name(self) -> &'static str {
        match self {
            Self::Defect => "defects",
            Self::Feature => "features",
            Self::Analysis => "analyses",
            Self::Idea => "processed",
        }
    }
}

impl fmt::Display for BacklogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Defect => "defect",
            Self::Feature => "feature",
            Self::Analysis => "analysis",
            Self::Idea => "idea",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct BacklogTypeParseError(pub String);

impl fmt::Display for BacklogTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid backlog type: {:?}", self.0)
    }
}

impl std::error::Error for BacklogTypeParseError {}

impl FromStr for BacklogType {
    type Err = BacklogTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "defect" => Ok(Self::Defect),
            "feature" => Ok(Self::Feature),
            "analysis" => Ok(Self::Analysis),
            "idea" => Ok(Self::Idea),
            other => Err(BacklogTypeParseError(other.to_owned())),
        }
    }
}

/// The required `## Status:` line value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacklogStatus {
    Open,
    Fixed,
    Completed,
    NeedsClarification,
    /// "Archived (verification failed)" -- kept in the source directory
    /// rather than moved, so the archive step can be retried.
    ArchivedVerificationFailed,
}

impl BacklogStatus {
    /// True once a status means the pipeline should stop driving this
    /// item forward (it is either done or needs a human).
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            BacklogStatus::Completed
                | BacklogStatus::NeedsClarification
                | BacklogStatus::ArchivedVerificationFailed
        )
    }
}

impl fmt::Display for BacklogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "Open",
            Self::Fixed => "Fixed",
            Self::Completed => "Completed",
            Self::NeedsClarification => "Needs Clarification",
            Self::ArchivedVerificationFailed => "Archived (verification failed)",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct BacklogStatusParseError(pub String);

impl fmt::Display for BacklogStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid backlog status: {:?}", self.0)
    }
}

impl std::error::Error for BacklogStatusParseError {}

impl FromStr for BacklogStatus {
    type Err = BacklogStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Open" => Ok(Self::Open),
            "Fixed" => Ok(Self::Fixed),
            "Completed" => Ok(Self::Completed),
            "Needs Clarification" => Ok(Self::NeedsClarification),
            "Archived (verification failed)" => Ok(Self::ArchivedVerificationFailed),
            other => Err(BacklogStatusParseError(other.to_owned())),
        }
    }
}

/// A parsed backlog item (spec 3.3). The `body` is the full markdown
/// contents minus the parsed-out status line, kept verbatim so the
/// pipeline can re-embed it in a plan's `plan_doc` prompt context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacklogItem {
    /// Integer-prefixed slug derived from the filename, e.g. `0042-foo`.
    pub slug: String,
    pub item_type: BacklogType,
    pub status: BacklogStatus,
    pub path: std::path::PathBuf,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub body: String,
}

impl BacklogItem {
    /// Dependencies that are not present in `completed`, i.e. this item
    /// isn't ready to be picked up yet.
    pub fn unmet_dependencies<'a>(&'a self, completed: &[String]) -> Vec<&'a str> {
        self.dependencies
            .iter()
            .filter(|d| !completed.iter().any(|c| c == *d))
            .map(String::as_str)
            .collect()
    }

    pub fn is_ready(&self, completed: &[String]) -> bool {
        !self.status.is_settled() && self.unmet_dependencies(completed).is_empty()
    }
}
