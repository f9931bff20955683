//! Fixed-format parsing of the `Date:` header.
//!
//! This is deliberately not a general RFC 2822 parser. Timestamps derived
//! here end up in archived filenames, so the legacy truncation rules are
//! preserved exactly.

use chrono::{DateTime, FixedOffset};

use crate::error::{ArchiveError, Result};

/// Width of `"Mon, 02 Jan 2006 15:04:05 -0700"`.
pub const DATE_BUDGET: usize = 31;

/// Pattern matched once the weekday prefix is gone.
const DATE_FORMAT: &str = "%d %b %Y %H:%M:%S %z";

/// Pattern of the collision prefix placed in front of filenames.
const PREFIX_FORMAT: &str = "%Y%m%d%H%M%S";

/// Parse a `Date:` header value.
///
/// 1. Keep the first [`DATE_BUDGET`] characters.
/// 2. Drop one trailing space.
/// 3. If the first three characters are alphabetic (a weekday), drop five
///    characters (`"Mon, "`).
/// 4. Match `day month-abbrev year hh:mm:ss ±zzzz`.
///
/// Anything left over makes the parse fail, which is why a trailing
/// `(UTC)` comment is only tolerated when a weekday prefix pushes it past
/// the budget.
pub fn parse_date(raw: &str) -> Result<DateTime<FixedOffset>> {
    let mut date: String = raw.chars().take(DATE_BUDGET).collect();
    if date.ends_with(' ') {
        date.pop();
    }

    let weekday: Vec<char> = date.chars().take(3).collect();
    let normalized = if weekday.len() == 3 && weekday.iter().all(|c| c.is_alphabetic()) {
        date.char_indices()
            .nth(5)
            .map(|(idx, _)| &date[idx..])
            .unwrap_or("")
    } else {
        date.as_str()
    };

    DateTime::parse_from_str(normalized, DATE_FORMAT).map_err(|e| ArchiveError::DateParse {
        input: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Render the `YYYYMMDDHHMMSS` collision prefix in the date's own offset.
pub fn timestamp_prefix(date: &DateTime<FixedOffset>) -> String {
    date.format(PREFIX_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_and_without_weekday_agree() {
        let with = parse_date("Mon, 02 Jan 2006 15:04:05 -0700").unwrap();
        let without = parse_date("02 Jan 2006 15:04:05 -0700").unwrap();
        assert_eq!(with, without);
        assert_eq!(with.offset().local_minus_utc(), -7 * 3600);
    }

    #[test]
    fn test_trailing_comment_cut_by_budget() {
        let dt = parse_date("Thu, 04 Jan 2024 10:00:00 +0800 (CST)").unwrap();
        assert_eq!(timestamp_prefix(&dt), "20240104100000");
    }

    #[test]
    fn test_single_digit_day_trailing_space_dropped() {
        // 30 characters plus the space before the comment.
        let dt = parse_date("Thu, 4 Jan 2024 10:00:00 +0800 (CST)").unwrap();
        assert_eq!(timestamp_prefix(&dt), "20240104100000");
    }

    #[test]
    fn test_comment_without_weekday_exceeds_budget() {
        assert!(parse_date("04 Jan 2024 10:00:00 +0800 (CST)").is_err());
    }

    #[test]
    fn test_named_zone_rejected() {
        assert!(parse_date("Thu, 04 Jan 2024 10:00:00 GMT").is_err());
    }

    #[test]
    fn test_empty_and_garbage_rejected() {
        assert!(matches!(
            parse_date(""),
            Err(ArchiveError::DateParse { .. })
        ));
        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn test_prefix_uses_message_offset() {
        let dt = parse_date("Sun, 31 Dec 2023 23:30:00 -0500").unwrap();
        // 04:30 UTC on Jan 1st, but the prefix keeps the sender's wall clock.
        assert_eq!(timestamp_prefix(&dt), "20231231233000");
    }
}
