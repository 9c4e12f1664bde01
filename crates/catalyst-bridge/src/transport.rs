//! Chat-service transport (spec 4.3.1): post messages, discover
//! channels by prefix, and receive messages either by polling
//! `conversations.history` (implemented here) or a real-time socket
//! listener (left as an extension point behind the same trait).
//!
//! `ChatTransport` is a bidirectional seam over `reqwest`: every
//! inbound path (classification, intake, question-answering) depends
//! on the trait, never on a concrete Slack client.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("chat API request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("chat API returned ok=false: {0}")]
    ApiError(String),
}

/// One message observed in a channel, whether from polling history or a
/// socket event.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
    pub ts: String,
    /// Set when this message is a reply within a thread.
    pub thread_ts: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Adapter interface for a chat service (spec 4.3.1's three
/// capabilities). Implementations must never block the pipeline's main
/// loop; callers run these behind a daemon task.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// `chat.postMessage`-style send. Returns the new message's `ts`
    /// (used as `thread_ts` for follow-up replies).
    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<String, TransportError>;

    /// Discover channel ids whose name starts with `prefix`.
    async fn discover_channels(&self, prefix: &str) -> Result<HashMap<String, String>, TransportError>;

    /// Poll a channel's history for messages after `since`, oldest
    /// first.
    async fn history_since(
        &self,
        channel_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<InboundMessage>, TransportError>;
}

/// Bearer-token HTTP client against a Slack-compatible `chat.postMessage`
/// / `conversations.list` / `conversations.history` API surface.
pub struct SlackTransport {
    client: reqwest::Client,
    base_url: String,
    bot_token: String,
}

impl SlackTransport {
    pub fn new(bot_token: String) -> Self {
        Self::with_base_url(bot_token, "https://slack.com/api".to_string())
    }

    /// Used by tests to point at a local mock server instead of the
    /// real Slack API.
    pub fn with_base_url(bot_token: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            bot_token,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConversationsListResponse {
    ok: bool,
    #[serde(default)]
    channels: Vec<ChannelInfo>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    ok: bool,
    #[serde(default)]
    messages: Vec<HistoryMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryMessage {
    #[serde(default)]
    user: String,
    #[serde(default)]
    text: String,
    ts: String,
    #[serde(default)]
    thread_ts: Option<String>,
}

fn slack_ts_to_datetime(ts: &str) -> DateTime<Utc> {
    ts.split('.')
        .next()
        .and_then(|secs| secs.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
}

#[async_trait]
impl ChatTransport for SlackTransport {
    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<String, TransportError> {
        let mut form = HashMap::new();
        form.insert("channel", channel_id.to_string());
        form.insert("text", text.to_string());
        if let Some(ts) = thread_ts {
            form.insert("thread_ts", ts.to_string());
        }

        let response: PostMessageResponse = self
            .client
            .post(format!("{}/chat.postMessage", self.base_url))
            .bearer_auth(&self.bot_token)
            .json(&form)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(TransportError::ApiError(
                response.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        Ok(response.ts.unwrap_or_default())
    }

    async fn discover_channels(&self, prefix: &str) -> Result<HashMap<String, String>, TransportError> {
        let response: ConversationsListResponse = self
            .client
            .get(format!("{}/conversations.list", self.base_url))
            .bearer_auth(&self.bot_token)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(TransportError::ApiError(
                response.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        Ok(response
            .channels
            .into_iter()
            .filter(|c| c.name.starts_with(prefix))
            .map(|c| (c.name, c.id))
            .collect())
    }

    async fn history_since(
        &self,
        channel_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<InboundMessage>, TransportError> {
        let oldest = format!("{}.000000", since.timestamp());
        let response: HistoryResponse = self
            .client
            .get(format!("{}/conversations.history", self.base_url))
            .bearer_auth(&self.bot_token)
            .query(&[("channel", channel_id), ("oldest", &oldest)])
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(TransportError::ApiError(
                response.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        let mut messages: Vec<InboundMessage> = response
            .messages
            .into_iter()
            .map(|m| InboundMessage {
                channel_id: channel_id.to_string(),
                user_id: m.user,
                text: m.text,
                timestamp: slack_ts_to_datetime(&m.ts),
                ts: m.ts,
                thread_ts: m.thread_ts,
            })
            .collect();
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(messages)
    }
}
