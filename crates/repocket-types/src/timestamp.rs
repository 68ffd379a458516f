//! Permissive date/time parsing and ISO-8601 rendering.
//!
//! [`parse_timestamp`] accepts the shapes people actually store: RFC 3339,
//! RFC 2822, ISO-like text with a space instead of `T`, bare dates, and
//! `date(1)` output such as `Tue Aug 25 15:57:37 EDT 2015`. Text without
//! zone information is taken as UTC.

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, SecondsFormat, TimeZone, Utc,
};

use crate::error::TypeError;

/// Formats carrying their own numeric UTC offset.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S%.f %:z",
    "%a %b %d %H:%M:%S %z %Y",
];

/// Formats without zone information.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%a %b %d %H:%M:%S %Y",
    "%a %b %d %H:%M:%S%.f %Y",
    "%a, %d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M:%S",
    "%b %d %Y %H:%M:%S",
    "%b %d, %Y %H:%M:%S",
    "%B %d, %Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d %b %Y",
    "%b %d %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %B %Y",
];

/// Zone abbreviations recognized in free-form text, with offsets in hours.
const ZONE_ABBREVIATIONS: &[(&str, i32)] = &[
    ("UTC", 0),
    ("GMT", 0),
    ("Z", 0),
    ("EST", -5),
    ("EDT", -4),
    ("CST", -6),
    ("CDT", -5),
    ("MST", -7),
    ("MDT", -6),
    ("PST", -8),
    ("PDT", -7),
    ("AKST", -9),
    ("AKDT", -8),
    ("HST", -10),
    ("BST", 1),
    ("CET", 1),
    ("CEST", 2),
    ("EET", 2),
    ("EEST", 3),
    ("IST", 5),
    ("JST", 9),
];

/// Parse free-form date/time text.
pub fn parse_timestamp(text: &str) -> Result<DateTime<FixedOffset>, TypeError> {
    let s = text.trim();
    let invalid = || TypeError::InvalidTimestamp(text.to_string());
    if s.is_empty() {
        return Err(invalid());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Ok(dt);
    }
    if let Some(dt) = OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
    {
        return Ok(dt);
    }

    let (rest, offset) = split_zone_abbreviation(s);
    let naive = parse_naive(&rest).ok_or_else(invalid)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(invalid)
}

/// Render as ISO-8601 with a numeric offset, e.g. `2015-08-25T15:57:37-04:00`.
pub fn format_timestamp(value: &DateTime<FixedOffset>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Timestamp for a count of seconds since the UNIX epoch, in UTC.
pub fn timestamp_from_epoch(seconds: i64) -> Result<DateTime<FixedOffset>, TypeError> {
    DateTime::from_timestamp(seconds, 0)
        .map(|dt| dt.fixed_offset())
        .ok_or_else(|| TypeError::InvalidTimestamp(seconds.to_string()))
}

/// The current instant, in UTC.
pub fn now() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}

fn utc() -> FixedOffset {
    Utc.fix()
}

/// Remove a recognized zone abbreviation token, returning the remaining
/// text and the zone's offset (UTC when none is present).
fn split_zone_abbreviation(s: &str) -> (String, FixedOffset) {
    let mut offset = utc();
    let mut kept = Vec::new();
    for token in s.split_whitespace() {
        let bare = token.trim_matches(|c| c == '(' || c == ')');
        let zone = ZONE_ABBREVIATIONS
            .iter()
            .find(|(abbr, _)| bare.eq_ignore_ascii_case(abbr));
        match zone.and_then(|(_, hours)| FixedOffset::east_opt(hours * 3600)) {
            Some(found) => offset = found,
            None => kept.push(token),
        }
    }
    (kept.join(" "), offset)
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
