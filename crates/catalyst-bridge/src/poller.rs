//! The inbound polling loop (spec 4.3.1, 4.3.3): periodically pull new
//! messages from every channel in a [`ChannelSet`], filter and
//! classify each, and dispatch to intake, question answering, or the
//! stop/skip semaphores.
//!
//! Grounded on `catalyst-pipeline::hotreload::spawn_monitor`'s
//! `tokio::spawn` background-sampler pattern: a daemon task that polls
//! on an interval and never blocks the caller.

use std::collections::HashMap;
use std::sync::Arc;

use catalyst_core::Harness;
use catalyst_store::paths::StoreRoot;
use catalyst_store::{stop, suspension};
use catalyst_types::BacklogType;
use chrono::Utc;
use tokio::task::JoinHandle;

use crate::classify::{classify_inbound, Classification};
use crate::identity::{should_process, AgentIdentity, ChannelSet};
use crate::intake;
use crate::qa::{answer_question, RollingHistory};
use crate::suspension_bridge;
use crate::transport::ChatTransport;

pub struct PollerConfig {
    pub identity: AgentIdentity,
    pub channels: ChannelSet,
    pub fast_model: String,
    pub intake_model: String,
    pub poll_interval_secs: u64,
    pub history_size: usize,
    pub verbose: bool,
}

/// Spawn the background polling task. The returned handle can be
/// `.abort()`-ed at hot-reload/shutdown the same way
/// `hotreload::spawn_monitor`'s handle is.
pub fn spawn_poller(
    root: StoreRoot,
    transport: Arc<dyn ChatTransport>,
    harness: Arc<dyn Harness>,
    config: PollerConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let history = RollingHistory::new(config.history_size);
        let mut last_read = load_last_read(&root);

        loop {
            if let Err(e) = poll_once(&root, &transport, &harness, &config, &history, &mut last_read).await {
                tracing::error!(error = %e, "poller iteration failed, continuing");
            }
            tokio::time::sleep(std::time::Duration::from_secs(config.poll_interval_secs)).await;
        }
    })
}

fn load_last_read(root: &StoreRoot) -> HashMap<String, chrono::DateTime<Utc>> {
    let path = root.slack_last_read_path();
    match std::fs::read_to_string(&path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
        Err(_) => HashMap::new(),
    }
}

fn save_last_read(root: &StoreRoot, last_read: &HashMap<String, chrono::DateTime<Utc>>) {
    let path = root.slack_last_read_path();
    if let Ok(json) = serde_json::to_string_pretty(last_read) {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&path, json) {
            tracing::warn!(error = %e, "failed to persist slack last-read pointer");
        }
    }
}

async fn poll_once(
    root: &StoreRoot,
    transport: &Arc<dyn ChatTransport>,
    harness: &Arc<dyn Harness>,
    config: &PollerConfig,
    history: &RollingHistory,
    last_read: &mut HashMap<String, chrono::DateTime<Utc>>,
) -> anyhow::Result<()> {
    for channel_id in config.channels.all_ids() {
        let since = last_read.get(channel_id).copied().unwrap_or_else(|| Utc::now() - chrono::Duration::days(1));
        let messages = transport.history_since(channel_id, since).await?;

        for message in &messages {
            if let Err(e) = handle_message(root, transport, harness, config, history, message).await {
                tracing::error!(channel = %message.channel_id, error = %e, "failed to handle inbound message, skipping it");
            }
            last_read.insert(channel_id.to_string(), message.timestamp);
        }
    }

    save_last_read(root, last_read);
    Ok(())
}

async fn handle_message(
    root: &StoreRoot,
    transport: &Arc<dyn ChatTransport>,
    harness: &Arc<dyn Harness>,
    config: &PollerConfig,
    history: &RollingHistory,
    message: &crate::transport::InboundMessage,
) -> anyhow::Result<()> {
    if !should_process(&config.identity, &message.text) {
        if config.verbose {
            tracing::info!(text = %message.text, "filtered out by addressing rules");
        }
        return Ok(());
    }

    if let Some(thread_ts) = &message.thread_ts {
        if let Some(marker) = suspension_bridge::find_by_thread(root, &message.channel_id, thread_ts)? {
            suspension_bridge::record_answer(root, &marker.slug, &message.text)?;
            if config.verbose {
                tracing::info!(slug = %marker.slug, "routed reply to pending suspension");
            }
            return Ok(());
        }
    }

    let classification = classify_inbound(&message.text);
    match classification {
        Classification::NewFeature | Classification::NewDefect => {
            let item_type = if classification == Classification::NewDefect {
                BacklogType::Defect
            } else {
                BacklogType::Feature
            };
            let root = root.clone();
            let transport = transport.clone();
            let harness = harness.clone();
            let model = config.intake_model.clone();
            let channel_id = message.channel_id.clone();
            let thread_ts = message.ts.clone();
            let raw_text = message.text.clone();
            tokio::spawn(async move {
                if let Err(e) = intake::handle_submission(&root, &harness, &model, transport.as_ref(), &channel_id, &thread_ts, item_type, &raw_text).await {
                    tracing::error!(error = %e, "5-Whys intake failed");
                }
            });
        }
        Classification::ControlStop => {
            stop::request_stop(&root.stop_semaphore())?;
        }
        Classification::ControlSkip => {
            stop::request_stop(&root.skip_semaphore())?;
        }
        Classification::InfoRequest | Classification::Question => {
            let answer = answer_question(root, harness, &config.fast_model, history, &message.text).await?;
            transport.post_message(&message.channel_id, &answer, Some(&message.ts)).await?;
        }
        Classification::QuestionAnswer => unreachable!("routed above via suspension thread lookup"),
        Classification::Acknowledgement => {
            if config.verbose {
                tracing::info!(text = %message.text, "acknowledgement, no action");
            }
        }
    }

    Ok(())
}

/// Every pending suspension marker's `(channel_id, thread_ts)` pair, so
/// a caller can tell whether posting a new question still needs doing.
pub fn pending_threads(root: &StoreRoot) -> anyhow::Result<Vec<(String, String)>> {
    Ok(suspension::scan_pending(root)?
        .into_iter()
        .filter_map(|m| m.thread_ts.map(|ts| (m.channel_id, ts)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_threads_empty_on_fresh_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = StoreRoot::new(dir.path());
        assert!(pending_threads(&root).unwrap().is_empty());
    }
}
