//! Inbound message classification by ordered prefix match (spec 4.3.3).

const QUESTION_WORDS: &[&str] = &["what", "why", "how", "when", "where", "who", "which", "can", "should", "is", "are", "does", "do"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    NewFeature,
    NewDefect,
    ControlStop,
    ControlSkip,
    InfoRequest,
    Question,
    /// Determined separately by thread membership, not by text alone;
    /// `classify_inbound` never returns this -- callers check whether
    /// the message is a reply in a suspension thread first.
    QuestionAnswer,
    Acknowledgement,
}

fn starts_with_ci(text: &str, prefix: &str) -> bool {
    text.trim().to_lowercase().starts_with(&prefix.to_lowercase())
}

fn equals_ci(text: &str, word: &str) -> bool {
    text.trim().eq_ignore_ascii_case(word)
}

/// Classify by the ordered table in spec 4.3.3. Does not know about
/// suspension threads -- `question_answer` routing happens upstream,
/// before this is called, by checking the message's `thread_ts` against
/// pending suspension markers.
pub fn classify_inbound(text: &str) -> Classification {
    let trimmed = text.trim();

    if starts_with_ci(trimmed, "feature:") || starts_with_ci(trimmed, "enhancement:") {
        return Classification::NewFeature;
    }
    if starts_with_ci(trimmed, "defect:") || starts_with_ci(trimmed, "bug:") {
        return Classification::NewDefect;
    }
    if equals_ci(trimmed, "stop") || equals_ci(trimmed, "pause") {
        return Classification::ControlStop;
    }
    if equals_ci(trimmed, "skip") {
        return Classification::ControlSkip;
    }
    if equals_ci(trimmed, "status") || equals_ci(trimmed, "status?") {
        return Classification::InfoRequest;
    }

    let lower = trimmed.to_lowercase();
    let first_word = lower.split_whitespace().next().unwrap_or("");
    if trimmed.ends_with('?') || QUESTION_WORDS.contains(&first_word) {
        return Classification::Question;
    }

    Classification::Acknowledgement
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_prefix_matches_case_insensitively() {
        assert_eq!(classify_inbound("Feature: add dark mode"), Classification::NewFeature);
        assert_eq!(classify_inbound("enhancement: faster startup"), Classification::NewFeature);
    }

    #[test]
    fn defect_prefix_matches() {
        assert_eq!(classify_inbound("defect: crash on save"), Classification::NewDefect);
        assert_eq!(classify_inbound("BUG: crash on save"), Classification::NewDefect);
    }

    #[test]
    fn stop_and_pause_are_control_stop() {
        assert_eq!(classify_inbound("stop"), Classification::ControlStop);
        assert_eq!(classify_inbound("Pause"), Classification::ControlStop);
    }

    #[test]
    fn skip_is_control_skip() {
        assert_eq!(classify_inbound("skip"), Classification::ControlSkip);
    }

    #[test]
    fn status_is_info_request() {
        assert_eq!(classify_inbound("status"), Classification::InfoRequest);
        assert_eq!(classify_inbound("status?"), Classification::InfoRequest);
    }

    #[test]
    fn trailing_question_mark_is_question() {
        assert_eq!(classify_inbound("is the plan stuck?"), Classification::Question);
    }

    #[test]
    fn leading_question_word_is_question() {
        assert_eq!(classify_inbound("why did that fail"), Classification::Question);
    }

    #[test]
    fn plain_statement_is_acknowledgement() {
        assert_eq!(classify_inbound("sounds good, thanks"), Classification::Acknowledgement);
    }

    #[test]
    fn prefix_match_takes_priority_over_question_mark() {
        assert_eq!(classify_inbound("feature: should we add dark mode?"), Classification::NewFeature);
    }
}
