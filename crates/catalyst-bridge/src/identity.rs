//! Per-project identity and channel scoping (spec 4.3.2).

use std::collections::HashMap;

/// The signing identity an orchestrator instance stamps onto outbound
/// messages, and filters inbound messages against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub name: String,
}

impl AgentIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Outbound messages carry this marker so a reply that echoes it
    /// back can be recognized as self-authored.
    pub fn signature(&self) -> String {
        format!("_— {}_", self.name)
    }

    pub fn sign(&self, text: &str) -> String {
        format!("{text}\n{}", self.signature())
    }

    pub fn is_self_authored(&self, text: &str) -> bool {
        text.contains(&self.signature())
    }
}

/// The five role-suffixed channels discovered under a configured prefix
/// (`<prefix>-notifications`, `-features`, `-defects`, `-questions`,
/// `-reports`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSet {
    pub notifications: Option<String>,
    pub features: Option<String>,
    pub defects: Option<String>,
    pub questions: Option<String>,
    pub reports: Option<String>,
}

impl ChannelSet {
    /// Build from a prefix and a name->id map as returned by channel
    /// discovery.
    pub fn from_discovered(prefix: &str, discovered: &HashMap<String, String>) -> Self {
        let lookup = |suffix: &str| discovered.get(&format!("{prefix}-{suffix}")).cloned();
        Self {
            notifications: lookup("notifications"),
            features: lookup("features"),
            defects: lookup("defects"),
            questions: lookup("questions"),
            reports: lookup("reports"),
        }
    }

    /// The channel a completion/error notification belongs on.
    pub fn notifications_channel(&self) -> Option<&str> {
        self.notifications.as_deref()
    }

    /// The type-specific channel to cross-post a notification or route
    /// a question to, by backlog item type.
    pub fn channel_for(&self, item_type: catalyst_types::BacklogType) -> Option<&str> {
        use catalyst_types::BacklogType;
        match item_type {
            BacklogType::Defect => self.defects.as_deref(),
            BacklogType::Feature | BacklogType::Idea => self.features.as_deref(),
            BacklogType::Analysis => self.reports.as_deref(),
        }
    }

    pub fn questions_channel(&self) -> Option<&str> {
        self.questions.as_deref()
    }

    /// Every channel id this orchestrator instance should poll, in a
    /// stable order.
    pub fn all_ids(&self) -> Vec<&str> {
        [
            &self.notifications,
            &self.features,
            &self.defects,
            &self.questions,
            &self.reports,
        ]
        .into_iter()
        .filter_map(|c| c.as_deref())
        .collect()
    }
}

/// Parsed addressee set from a message, e.g. leading `@name` mentions.
/// Empty means broadcast (spec 4.3.2: "accept broadcasts: no addressees").
pub fn parse_addressees(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter_map(|word| word.strip_prefix('@'))
        .map(|name| name.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '_').to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// The addressing-rule decision for one inbound message (spec 4.3.2):
/// skip self-authored messages, skip messages addressed to others only,
/// accept explicit addressing or broadcasts.
pub fn should_process(identity: &AgentIdentity, text: &str) -> bool {
    if identity.is_self_authored(text) {
        return false;
    }
    let addressees = parse_addressees(text);
    addressees.is_empty() || addressees.iter().any(|a| a == &identity.name)
}
