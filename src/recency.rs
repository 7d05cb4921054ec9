// src/recency.rs
//! Published-timestamp parsing and the lookback window filter.
//!
//! "Now" is taken in the market timezone so that naive local timestamps and
//! words like "today" resolve the way a US desk would read them.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::ingest::types::Article;

static RE_AGO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+|an?|one)\s*(s|sec|secs|seconds?|m|min|mins|minutes?|h|hr|hrs|hours?|d|days?|w|wks?|weeks?)\s+ago$")
        .expect("relative time regex")
});

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parse a provider timestamp. Structured formats first, then free text.
/// Returns `None` when nothing matches.
pub fn parse_published(raw: &str, now: DateTime<Tz>) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    parse_epoch(s)
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc)))
        .or_else(|| DateTime::parse_from_rfc2822(s).ok().map(|d| d.with_timezone(&Utc)))
        .or_else(|| parse_compact(s))
        .or_else(|| parse_naive_local(s, now.timezone()))
        .or_else(|| parse_date_only(s, now.timezone()))
        .or_else(|| parse_relative(s, now))
}

fn parse_epoch(s: &str) -> Option<DateTime<Utc>> {
    if !s.chars().all(|c| c.is_ascii_digit()) || s.len() > 16 {
        return None;
    }
    let n: i64 = s.parse().ok()?;
    // 12+ digits: milliseconds
    if s.len() >= 12 {
        DateTime::from_timestamp_millis(n)
    } else {
        DateTime::from_timestamp(n, 0)
    }
}

/// `YYYYMMDDTHHMMSS` (or without seconds), UTC.
fn parse_compact(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M"))
        .ok()
        .map(|n| n.and_utc())
}

fn parse_naive_local(s: &str, tz: Tz) -> Option<DateTime<Utc>> {
    NAIVE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .and_then(|n| tz.from_local_datetime(&n).earliest())
        .map(|d| d.with_timezone(&Utc))
}

fn parse_date_only(s: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let d = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    tz.from_local_datetime(&d.and_hms_opt(0, 0, 0)?)
        .earliest()
        .map(|d| d.with_timezone(&Utc))
}

fn parse_relative(s: &str, now: DateTime<Tz>) -> Option<DateTime<Utc>> {
    let lower = s.to_lowercase();
    let lower = lower.trim_end_matches('.').trim();
    let now_utc = now.with_timezone(&Utc);
    match lower {
        "just now" | "now" | "moments ago" | "today" => return Some(now_utc),
        "yesterday" => return Some(now_utc - Duration::days(1)),
        _ => {}
    }
    let caps = RE_AGO.captures(lower)?;
    let n: i64 = match &caps[1] {
        "a" | "an" | "one" => 1,
        digits => digits.parse().ok()?,
    };
    let unit = &caps[2];
    let d = match unit.chars().next()? {
        's' => Duration::seconds(n),
        'm' => Duration::minutes(n),
        'h' => Duration::hours(n),
        'd' => Duration::days(n),
        'w' => Duration::weeks(n),
        _ => return None,
    };
    Some(now_utc - d)
}

/// Inclusive `[now - window, now]`. `None` (unparsable) is kept.
pub fn is_within_window(published: Option<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) -> bool {
    match published {
        None => true,
        Some(t) => t >= now - window && t <= now,
    }
}

/// Window filter over articles that already carry `published_at`.
#[derive(Debug, Clone, Copy)]
pub struct RecencyFilter {
    tz: Tz,
}

impl RecencyFilter {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Reference "now" in the market timezone.
    pub fn market_now(&self, now: DateTime<Utc>) -> DateTime<Tz> {
        now.with_timezone(&self.tz)
    }

    pub fn parse(&self, raw: Option<&str>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        raw.and_then(|r| parse_published(r, self.market_now(now)))
    }

    pub fn retain(&self, articles: Vec<Article>, now: DateTime<Utc>, window: Duration) -> Vec<Article> {
        articles
            .into_iter()
            .filter(|a| is_within_window(a.published_at, now, window))
            .collect()
    }
}
