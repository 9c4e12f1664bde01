//! `catalyst pipeline` command: the Work-Item Pipeline main loop (spec
//! 4.2), optionally backed by the Slack bridge (spec 4.3) when
//! `.claude/slack.local.yaml` has `enabled: true`.

use std::sync::Arc;

use anyhow::{Context, Result};
use catalyst_bridge::{AgentIdentity, ChannelSet, SlackNotifier, SlackTransport};
use catalyst_core::{ClaudeCodeHarness, Harness, OrchestratorConfig, SlackConfig};
use catalyst_pipeline::{run_until_idle_or_stopped, startup, NullNotifier, Notifier, PipelineContext, PipelineOptions};
use catalyst_store::StoreRoot;

const BOT_IDENTITY_NAME: &str = "catalyst";
const DEFAULT_MODEL: &str = "sonnet";
const FAST_MODEL: &str = "haiku";

pub async fn run(root: &StoreRoot, harness: Arc<dyn Harness>, once: bool, dry_run: bool, verbose: bool) -> Result<()> {
    let config = OrchestratorConfig::resolve(&root.orchestrator_config_path())
        .context("resolving orchestrator config")?;

    let watched = vec![
        root.root().join("src"),
        root.root().join("Cargo.toml"),
    ];
    let watched_refs: Vec<&std::path::Path> = watched.iter().map(|p| p.as_path()).collect();
    startup::startup(root, &watched_refs).context("pipeline startup")?;

    let executable_path = std::env::current_exe().context("resolving own executable path")?;
    let ctx = PipelineContext::new(root.clone(), config, harness.clone(), executable_path, DEFAULT_MODEL.to_string());

    let slack_config = SlackConfig::resolve(&root.slack_config_path()).context("resolving slack config")?;

    let options = PipelineOptions { once, dry_run, verbose };

    if slack_config.enabled {
        let notifier = spawn_bridge(root, &slack_config, harness).await?;
        run_until_idle_or_stopped(&ctx, notifier.as_ref(), watched, options).await?;
    } else {
        let notifier = NullNotifier;
        run_until_idle_or_stopped(&ctx, &notifier, watched, options).await?;
    }

    Ok(())
}

/// Stand up the Slack transport, discover the five prefix-suffixed
/// channels, spawn the inbound poller in the background, and return a
/// bridge-backed [`Notifier`] for the main loop to post completions
/// and reports through.
async fn spawn_bridge(root: &StoreRoot, slack_config: &SlackConfig, harness: Arc<dyn Harness>) -> Result<Box<dyn Notifier>> {
    let bot_token = slack_config
        .bot_token
        .clone()
        .context("slack.local.yaml has enabled: true but no bot_token")?;
    let prefix = slack_config.channel_prefix.clone().unwrap_or_else(|| "catalyst".to_string());

    let transport: Arc<dyn catalyst_bridge::ChatTransport> = Arc::new(SlackTransport::new(bot_token));
    let discovered = transport.discover_channels(&prefix).await.context("discovering slack channels")?;
    let channels = ChannelSet::from_discovered(&prefix, &discovered);
    let identity = AgentIdentity::new(BOT_IDENTITY_NAME);

    let poller_config = catalyst_bridge::poller::PollerConfig {
        identity: identity.clone(),
        channels: channels.clone(),
        fast_model: FAST_MODEL.to_string(),
        intake_model: DEFAULT_MODEL.to_string(),
        poll_interval_secs: 15,
        history_size: slack_config.conversation_history.max_turns as usize,
        verbose: false,
    };

    catalyst_bridge::poller::spawn_poller(root.clone(), transport.clone(), harness, poller_config);

    Ok(Box::new(SlackNotifier::new(transport, identity, channels)))
}
