//! Notification sink seam (spec 4.2.2 phase 4, 4.2.3's `force_pipeline_exit`).
//!
//! The pipeline only knows it needs to announce completions, errors, and
//! report hand-offs somewhere; it doesn't know about Slack's wire format.
//! `catalyst-bridge` is the real implementation of this trait; tests and
//! any run without a configured chat backend get [`NullNotifier`].

use catalyst_types::BacklogType;

/// Where the pipeline sends human-facing updates.
pub trait Notifier: Send + Sync {
    /// A feature/defect item reached Phase 4 and was archived.
    fn notify_completion(&self, item_type: BacklogType, slug: &str, summary: &str);

    /// An unrecoverable error forced the pipeline to stop (spec 4.2.3).
    fn notify_error(&self, message: &str);

    /// An analysis item produced a report to deliver via chat instead of
    /// (or in addition to) `docs/reports/`.
    fn post_report(&self, slug: &str, markdown: &str);
}

/// No-op notifier: used when no chat backend is configured, or in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify_completion(&self, item_type: BacklogType, slug: &str, summary: &str) {
        tracing::info!(?item_type, slug, summary, "item completed (no notifier configured)");
    }

    fn notify_error(&self, message: &str) {
        tracing::error!(message, "pipeline error (no notifier configured)");
    }

    fn post_report(&self, slug: &str, _markdown: &str) {
        tracing::info!(slug, "analysis report produced (no notifier configured)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_notifier_does_not_panic() {
        let n = NullNotifier;
        n.notify_completion(BacklogType::Feature, "0001-x", "done");
        n.notify_error("boom");
        n.post_report("0001-x", "# Report");
    }
}
