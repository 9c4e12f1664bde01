//! Validator verdict parsing and aggregation (spec 4.1.12).
//!
//! A validator agent reports findings as literal markdown markers in its
//! final message: either a single `**Verdict: PASS|WARN|FAIL**` line, or
//! a list of `- [PASS|WARN|FAIL] description` lines. We never ask the
//! agent for structured JSON here -- these markers are what the prompt
//! contract asks it to emit, so parsing is regex over plain text.

use catalyst_types::{ValidationFinding, Verdict};
use regex::Regex;

fn single_verdict_re() -> Regex {
    Regex::new(r"(?i)\*\*verdict:\s*(pass|warn|fail)\*\*").unwrap()
}

fn finding_line_re() -> Regex {
    Regex::new(r"(?im)^-\s*\[(pass|warn|fail)\]\s*(.+)$").unwrap()
}

/// Parse every `- [VERDICT] description` line out of a validator's
/// output. Returns an empty vec if none are present.
pub fn parse_findings(text: &str) -> Vec<ValidationFinding> {
    finding_line_re()
        .captures_iter(text)
        .filter_map(|caps| {
            let verdict = parse_verdict_word(caps.get(1)?.as_str())?;
            let description = caps.get(2)?.as_str().trim().to_string();
            Some(ValidationFinding { verdict, description })
        })
        .collect()
}

/// Parse the single `**Verdict: X**` summary line, if present.
pub fn parse_single_verdict(text: &str) -> Option<Verdict> {
    let caps = single_verdict_re().captures(text)?;
    parse_verdict_word(caps.get(1)?.as_str())
}

fn parse_verdict_word(word: &str) -> Option<Verdict> {
    match word.to_uppercase().as_str() {
        "PASS" => Some(Verdict::Pass),
        "WARN" => Some(Verdict::Warn),
        "FAIL" => Some(Verdict::Fail),
        _ => None,
    }
}

/// Parse a validator's output into its findings and overall verdict.
/// Prefers the explicit `**Verdict: X**` summary if present; otherwise
/// aggregates per-line findings; falls back to FAIL if nothing parses
/// (a validator that produced no recognizable marker is not trustworthy
/// enough to default to PASS).
pub fn parse_validator_output(text: &str) -> (Vec<ValidationFinding>, Verdict) {
    let findings = parse_findings(text);

    if let Some(verdict) = parse_single_verdict(text) {
        return (findings, verdict);
    }

    if findings.is_empty() {
        (findings, Verdict::Fail)
    } else {
        let verdict = Verdict::aggregate(findings.iter().map(|f| f.verdict));
        (findings, verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_verdict_line() {
        let text = "All checks passed.\n\n**Verdict: PASS**";
        assert_eq!(parse_single_verdict(text), Some(Verdict::Pass));
    }

    #[test]
    fn parses_single_verdict_case_insensitively() {
        let text = "**verdict: fail**";
        assert_eq!(parse_single_verdict(text), Some(Verdict::Fail));
    }

    #[test]
    fn parses_finding_lines() {
        let text = "Findings:\n- [PASS] build succeeds\n- [FAIL] missing null check at src/lib.rs:10\n- [WARN] unused import at src/main.rs:2\n";
        let findings = parse_findings(text);
        assert_eq!(findings.len(), 3);
        assert_eq!(findings[1].verdict, Verdict::Fail);
        assert!(findings[1].description.contains("src/lib.rs:10"));
    }

    #[test]
    fn validator_output_prefers_explicit_summary_over_findings() {
        let text = "- [FAIL] something bad\n\n**Verdict: WARN**";
        let (findings, verdict) = parse_validator_output(text);
        assert_eq!(findings.len(), 1);
        assert_eq!(verdict, Verdict::Warn);
    }

    #[test]
    fn validator_output_aggregates_findings_when_no_summary() {
        let text = "- [PASS] a\n- [WARN] b\n";
        let (findings, verdict) = parse_validator_output(text);
        assert_eq!(findings.len(), 2);
        assert_eq!(verdict, Verdict::Warn);
    }

    #[test]
    fn validator_output_defaults_to_fail_when_nothing_parses() {
        let (findings, verdict) = parse_validator_output("the agent rambled with no markers");
        assert!(findings.is_empty());
        assert_eq!(verdict, Verdict::Fail);
    }
}
