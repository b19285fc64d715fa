//! Date parsing for due dates and audit filters.
//!
//! One parser serves the scorers, the Markdown codec, and the CLI. It
//! accepts ISO dates and a relative mini-language:
//!
//! - `2024-06-15`, full RFC 3339 timestamps
//! - `30m`, `1h`, `2d`, `1w` (offset from now)
//! - `today`, `tomorrow`, `yesterday`
//! - `in 3 days`, `in 2 weeks`
//! - weekday names, optionally prefixed with `next` or `last`

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};

use crate::error::{Error, Result};

/// Parse a user-supplied date expression against the given `now`.
pub fn parse_date(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("date", "date cannot be empty"));
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(midnight(date));
    }

    let lower = trimmed.to_ascii_lowercase();
    match lower.as_str() {
        "today" => return Ok(midnight(now.date_naive())),
        "tomorrow" => return Ok(midnight(now.date_naive() + Duration::days(1))),
        "yesterday" => return Ok(midnight(now.date_naive() - Duration::days(1))),
        _ => {}
    }

    if let Some(rest) = lower.strip_prefix("in ") {
        let duration = parse_spelled_duration(rest)?;
        return Ok(now + duration);
    }

    if let Some(weekday) = parse_weekday(&lower) {
        return Ok(midnight(next_weekday(now.date_naive(), weekday)));
    }
    if let Some(rest) = lower.strip_prefix("next ") {
        if let Some(weekday) = parse_weekday(rest) {
            return Ok(midnight(next_weekday(now.date_naive(), weekday)));
        }
    }
    if let Some(rest) = lower.strip_prefix("last ") {
        if let Some(weekday) = parse_weekday(rest) {
            return Ok(midnight(previous_weekday(now.date_naive(), weekday)));
        }
    }

    if lower.starts_with(|ch: char| ch.is_ascii_digit()) {
        let duration = parse_duration(&lower)?;
        return Ok(now + duration);
    }

    Err(Error::validation(
        "date",
        format!("cannot parse date expression '{trimmed}'"),
    ))
}

/// Parse a compact duration such as `30m`, `1h`, `2d`, `1w`.
///
/// A bare number is taken as minutes.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::validation("date", "duration cannot be empty"));
    }

    // Find where the number ends and unit begins
    let (num_str, unit) = if let Some(pos) = s.find(|c: char| !c.is_ascii_digit()) {
        (&s[..pos], s[pos..].trim())
    } else {
        (s, "m")
    };

    let num: i64 = num_str
        .parse()
        .map_err(|_| Error::validation("date", format!("invalid duration number: {num_str}")))?;

    duration_from_unit(num, unit)
}

fn parse_spelled_duration(s: &str) -> Result<Duration> {
    let mut parts = s.split_whitespace();
    let (Some(num_str), Some(unit)) = (parts.next(), parts.next()) else {
        return Err(Error::validation(
            "date",
            format!("expected '<n> <unit>' after 'in', got '{s}'"),
        ));
    };
    let num: i64 = num_str
        .parse()
        .map_err(|_| Error::validation("date", format!("invalid duration number: {num_str}")))?;
    duration_from_unit(num, unit)
}

fn duration_from_unit(num: i64, unit: &str) -> Result<Duration> {
    let duration = match unit.to_ascii_lowercase().as_str() {
        "s" | "sec" | "second" | "seconds" => Duration::seconds(num),
        "m" | "min" | "minute" | "minutes" => Duration::minutes(num),
        "h" | "hr" | "hour" | "hours" => Duration::hours(num),
        "d" | "day" | "days" => Duration::days(num),
        "w" | "week" | "weeks" => Duration::weeks(num),
        _ => {
            return Err(Error::validation(
                "date",
                format!("invalid duration unit '{unit}'. Expected: s, m, h, d, w"),
            ));
        }
    };
    Ok(duration)
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    match s {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// First occurrence of `weekday` strictly after `from`.
fn next_weekday(from: NaiveDate, weekday: Weekday) -> NaiveDate {
    let current = from.weekday().num_days_from_monday() as i64;
    let target = weekday.num_days_from_monday() as i64;
    let mut ahead = (target - current).rem_euclid(7);
    if ahead == 0 {
        ahead = 7;
    }
    from + Duration::days(ahead)
}

/// Last occurrence of `weekday` strictly before `from`.
fn previous_weekday(from: NaiveDate, weekday: Weekday) -> NaiveDate {
    let current = from.weekday().num_days_from_monday() as i64;
    let target = weekday.num_days_from_monday() as i64;
    let mut behind = (current - target).rem_euclid(7);
    if behind == 0 {
        behind = 7;
    }
    from - Duration::days(behind)
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight is valid"))
}

/// Format a timestamp as a plain `YYYY-MM-DD` date.
pub fn format_date(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frozen_now() -> DateTime<Utc> {
        // A Wednesday.
        Utc.with_ymd_and_hms(2024, 6, 12, 15, 30, 0).unwrap()
    }

    #[test]
    fn parses_iso_date() {
        let ts = parse_date("2024-06-15", frozen_now()).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn parses_relative_units() {
        let now = frozen_now();
        assert_eq!(parse_date("1d", now).unwrap(), now + Duration::days(1));
        assert_eq!(parse_date("2w", now).unwrap(), now + Duration::weeks(2));
        assert_eq!(parse_date("45m", now).unwrap(), now + Duration::minutes(45));
        assert_eq!(parse_date("1h", now).unwrap(), now + Duration::hours(1));
    }

    #[test]
    fn parses_calendar_words() {
        let now = frozen_now();
        assert_eq!(
            parse_date("today", now).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 12, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_date("tomorrow", now).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 13, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_date("yesterday", now).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 11, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn parses_in_n_days() {
        let now = frozen_now();
        assert_eq!(
            parse_date("in 3 days", now).unwrap(),
            now + Duration::days(3)
        );
        assert_eq!(
            parse_date("in 2 weeks", now).unwrap(),
            now + Duration::weeks(2)
        );
    }

    #[test]
    fn parses_weekdays() {
        let now = frozen_now(); // Wednesday 2024-06-12
        assert_eq!(
            parse_date("friday", now).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 14, 0, 0, 0).unwrap()
        );
        // Same weekday rolls a full week forward.
        assert_eq!(
            parse_date("next wednesday", now).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 19, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_date("last friday", now).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 7, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_date("someday", frozen_now()).is_err());
        assert!(parse_date("", frozen_now()).is_err());
        assert!(parse_date("3x", frozen_now()).is_err());
    }
}
