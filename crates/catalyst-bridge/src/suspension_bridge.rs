//! Suspension protocol wiring (spec 4.3.6): post a suspended task's
//! question to chat, record the reply's thread, and reinstate the item
//! once answered.
//!
//! Grounded on `catalyst-store::suspension`'s marker file API, which
//! already implements the pending/answered/timeout state machine this
//! module only needs to drive from the chat side.

use anyhow::{Context, Result};
use catalyst_store::paths::StoreRoot;
use catalyst_store::suspension;
use catalyst_types::SuspensionMarker;

use crate::identity::ChannelSet;
use crate::transport::ChatTransport;

/// Post a freshly-written suspension marker's question to its type
/// channel and record the resulting `thread_ts` back into the marker,
/// so a later reply in that thread can be routed back to this slug.
pub async fn post_question(
    root: &StoreRoot,
    channels: &ChannelSet,
    transport: &dyn ChatTransport,
    marker: &mut SuspensionMarker,
) -> Result<()> {
    let channel_id = channels
        .questions_channel()
        .or_else(|| channels.notifications_channel())
        .context("no questions or notifications channel configured")?;

    let text = if marker.context.is_empty() {
        format!("Question from `{}`:\n{}", marker.slug, marker.question)
    } else {
        format!("Question from `{}`:\n{}\n\n_Context:_ {}", marker.slug, marker.question, marker.context)
    };

    let ts = transport.post_message(channel_id, &text, None).await?;
    marker.channel_id = channel_id.to_string();
    marker.thread_ts = Some(ts);

    suspension::write(&root.suspension_path(&marker.slug), marker)
}

/// Find the pending suspension marker whose thread this reply belongs
/// to, if any (spec 4.3.6's slug->thread mapping).
pub fn find_by_thread(root: &StoreRoot, channel_id: &str, thread_ts: &str) -> Result<Option<SuspensionMarker>> {
    let pending = suspension::scan_pending(root)?;
    Ok(pending
        .into_iter()
        .find(|m| m.channel_id == channel_id && m.thread_ts.as_deref() == Some(thread_ts)))
}

/// Record an inbound reply as the marker's answer. The next pipeline
/// cycle's recovery/backlog scan will see the item is no longer hidden
/// and reinstate it with the answer as additional context.
pub fn record_answer(root: &StoreRoot, slug: &str, answer: &str) -> Result<()> {
    let path = root.suspension_path(slug);
    let mut marker = suspension::read(&path)?.with_context(|| format!("no suspension marker for slug {slug}"))?;
    marker.answer = Some(answer.to_string());
    suspension::write(&path, &marker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct RecordingTransport {
        posted: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn post_message(&self, channel_id: &str, text: &str, _thread_ts: Option<&str>) -> Result<String, crate::transport::TransportError> {
            self.posted.lock().unwrap().push((channel_id.to_string(), text.to_string()));
            Ok("1700000000.000100".to_string())
        }

        async fn discover_channels(&self, _prefix: &str) -> Result<HashMap<String, String>, crate::transport::TransportError> {
            Ok(HashMap::new())
        }

        async fn history_since(&self, _channel_id: &str, _since: chrono::DateTime<Utc>) -> Result<Vec<crate::transport::InboundMessage>, crate::transport::TransportError> {
            Ok(Vec::new())
        }
    }

    fn marker(slug: &str) -> SuspensionMarker {
        SuspensionMarker {
            slug: slug.into(),
            item_type: "defect".into(),
            item_path: format!("docs/defect-backlog/{slug}.md").into(),
            plan_path: format!(".claude/plans/{slug}.yaml").into(),
            task_id: "t1".into(),
            question: "Which auth scheme?".into(),
            context: String::new(),
            channel_id: String::new(),
            thread_ts: None,
            suspended_at: Utc::now(),
            timeout_minutes: 60,
            answer: None,
        }
    }

    #[tokio::test]
    async fn post_question_records_thread_ts() {
        let dir = tempdir().unwrap();
        let root = StoreRoot::new(dir.path());
        let channels = ChannelSet {
            questions: Some("C-Q".to_string()),
            ..Default::default()
        };
        let transport = RecordingTransport { posted: Mutex::new(Vec::new()) };
        let mut m = marker("0001-a");
        post_question(&root, &channels, &transport, &mut m).await.unwrap();
        assert_eq!(m.channel_id, "C-Q");
        assert_eq!(m.thread_ts.as_deref(), Some("1700000000.000100"));

        let reloaded = suspension::read(&root.suspension_path("0001-a")).unwrap().unwrap();
        assert_eq!(reloaded.thread_ts.as_deref(), Some("1700000000.000100"));
    }

    #[test]
    fn find_by_thread_matches_channel_and_ts() {
        let dir = tempdir().unwrap();
        let root = StoreRoot::new(dir.path());
        let mut m = marker("0001-a");
        m.channel_id = "C-Q".to_string();
        m.thread_ts = Some("123.456".to_string());
        suspension::write(&root.suspension_path("0001-a"), &m).unwrap();

        let found = find_by_thread(&root, "C-Q", "123.456").unwrap();
        assert_eq!(found.unwrap().slug, "0001-a");

        let not_found = find_by_thread(&root, "C-Q", "999.999").unwrap();
        assert!(not_found.is_none());
    }

    #[test]
    fn record_answer_sets_answer_field() {
        let dir = tempdir().unwrap();
        let root = StoreRoot::new(dir.path());
        suspension::write(&root.suspension_path("0001-a"), &marker("0001-a")).unwrap();

        record_answer(&root, "0001-a", "use OAuth2").unwrap();

        let reloaded = suspension::read(&root.suspension_path("0001-a")).unwrap().unwrap();
        assert_eq!(reloaded.answer.as_deref(), Some("use OAuth2"));
        assert!(!reloaded.is_pending());
    }
}
