//! Rate-limit detection in agent CLI output.
//!
//! The agent CLI reports rate limiting as plain text somewhere in its
//! final result, e.g. `"Claude AI usage limit reached|1716912000"`,
//! `"rate limited until 2025-06-01T00:00:00Z"`, or `"You've hit your
//! limit - resets Feb 9 at 6pm (America/Toronto)"`. We look for any of
//! these shapes and resolve it to a timezone-aware instant, falling
//! back to one hour out when a reset is mentioned but unparseable.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use regex::Regex;

/// Search `text` for a rate-limit marker and return the reset instant
/// if one is found and parseable.
pub fn parse_rate_limit_reset(text: &str) -> Option<DateTime<Utc>> {
    epoch_pipe_marker(text)
        .or_else(|| iso8601_marker(text))
        .or_else(|| month_clock_tz_marker(text))
}

/// The reset instant implied by `text`, or `None` if `text` doesn't
/// mention rate limiting at all. When a reset is mentioned but the
/// marker can't be parsed, falls back to one hour from now (spec
/// 4.1.7: "fall back to 1 hour if unparseable").
pub fn resolve_rate_limit_reset(text: &str) -> Option<DateTime<Utc>> {
    if !mentions_rate_limit(text) {
        return None;
    }
    Some(parse_rate_limit_reset(text).unwrap_or_else(|| Utc::now() + Duration::hours(1)))
}

fn epoch_pipe_marker(text: &str) -> Option<DateTime<Utc>> {
    let re = Regex::new(r"usage limit reached\|(\d+)").ok()?;
    let caps = re.captures(text)?;
    let epoch: i64 = caps.get(1)?.as_str().parse().ok()?;
    Utc.timestamp_opt(epoch, 0).single()
}

fn iso8601_marker(text: &str) -> Option<DateTime<Utc>> {
    let re = Regex::new(
        r"rate limit(?:ed)?.*?until\s+(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2}))",
    )
    .ok()?;
    let caps = re.captures(text)?;
    DateTime::parse_from_rfc3339(caps.get(1)?.as_str())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn month_clock_regex() -> Option<Regex> {
    Regex::new(
        r"(?i)resets\s+([A-Za-z]+)\s+(\d{1,2})\s+at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)\s*\(([^)]+)\)",
    )
    .ok()
}

/// `"resets Feb 9 at 6pm (America/Toronto)"`, resolved against the
/// named IANA timezone with year rollover: a month/day that has
/// already passed this year means next year, not last year.
fn month_clock_tz_marker(text: &str) -> Option<DateTime<Utc>> {
    let re = month_clock_regex()?;
    let caps = re.captures(text)?;

    let month = month_number(caps.get(1)?.as_str())?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    let mut hour: u32 = caps.get(3)?.as_str().parse().ok()?;
    let minute: u32 = caps
        .get(4)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    let is_pm = caps.get(5)?.as_str().eq_ignore_ascii_case("pm");
    let tz: Tz = caps.get(6)?.as_str().trim().parse().ok()?;

    if hour == 12 {
        hour = 0;
    }
    if is_pm {
        hour += 12;
    }

    let build = |year: i32| -> Option<DateTime<Tz>> {
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
        tz.from_local_datetime(&NaiveDateTime::new(date, time)).single()
    };

    let now = Utc::now().with_timezone(&tz);
    let candidate = build(now.year())?;
    let candidate = if candidate < now {
        build(now.year() + 1)?
    } else {
        candidate
    };

    Some(candidate.with_timezone(&Utc))
}

fn month_number(name: &str) -> Option<u32> {
    const NAMES: &[&str] = &[
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let lower = name.to_lowercase();
    NAMES.iter().position(|n| lower.starts_with(n)).map(|i| i as u32 + 1)
}

/// True if `text` mentions rate limiting at all, used to flag
/// `TaskResult::rate_limited` even when the reset time can't be parsed.
pub fn mentions_rate_limit(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("usage limit reached")
        || lower.contains("rate limit")
        || lower.contains("hit your limit")
        || month_clock_regex().is_some_and(|re| re.is_match(text))
}
