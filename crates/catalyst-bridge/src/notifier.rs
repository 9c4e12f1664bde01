//! A `catalyst-pipeline::Notifier` backed by a [`ChatTransport`] (spec
//! 4.2.2 phase 4, 4.2.4, 4.3.2): completion/error notifications on the
//! notifications channel, cross-posted to the type-specific channel,
//! signed with this instance's agent identity.
//!
//! `Notifier`'s methods are synchronous (the pipeline calls them
//! inline from an async function without awaiting); each one spawns a
//! fire-and-forget `tokio::spawn` task so a slow or failing chat
//! transport never blocks the pipeline's main loop, matching spec
//! 4.3.1's "must never block" rule and the error-handling table's
//! "chat transport failure: log, continue" entry.

use std::sync::Arc;

use catalyst_pipeline::Notifier;
use catalyst_types::BacklogType;

use crate::identity::{AgentIdentity, ChannelSet};
use crate::transport::ChatTransport;

pub struct SlackNotifier {
    transport: Arc<dyn ChatTransport>,
    identity: AgentIdentity,
    channels: ChannelSet,
}

impl SlackNotifier {
    pub fn new(transport: Arc<dyn ChatTransport>, identity: AgentIdentity, channels: ChannelSet) -> Self {
        Self { transport, identity, channels }
    }

    fn spawn_post(&self, channel_id: Option<String>, text: String) {
        let Some(channel_id) = channel_id else {
            tracing::warn!(text, "no channel configured for this notification, dropping");
            return;
        };
        let transport = self.transport.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.post_message(&channel_id, &text, None).await {
                tracing::error!(channel = %channel_id, error = %e, "failed to post chat notification, continuing");
            }
        });
    }
}

impl Notifier for SlackNotifier {
    fn notify_completion(&self, item_type: BacklogType, slug: &str, summary: &str) {
        let text = self.identity.sign(&format!("Completed `{slug}` ({item_type}): {summary}"));
        self.spawn_post(self.channels.notifications_channel().map(String::from), text.clone());
        self.spawn_post(self.channels.channel_for(item_type).map(String::from), text);
    }

    fn notify_error(&self, message: &str) {
        let text = self.identity.sign(&format!("Error: {message}"));
        self.spawn_post(self.channels.notifications_channel().map(String::from), text);
    }

    fn post_report(&self, slug: &str, markdown: &str) {
        const MAX_LEN: usize = 3500;
        let body = if markdown.len() > MAX_LEN {
            format!("{}...\n_(truncated)_", &markdown[..MAX_LEN])
        } else {
            markdown.to_string()
        };
        let text = self.identity.sign(&format!("Report for `{slug}`:\n{body}"));
        self.spawn_post(self.channels.reports.clone(), text);
    }
}
