// src/ingest/mod.rs
pub mod cache;
pub mod error;
pub mod health;
pub mod providers;
pub mod throttle;
pub mod types;

use crate::ingest::types::RawArticle;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use std::collections::HashSet;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "news_provider_calls_total",
            "Adapter calls actually sent to a provider."
        );
        describe_counter!(
            "news_provider_errors_total",
            "Provider failures, labelled by provider and kind."
        );
        describe_counter!(
            "news_provider_skipped_total",
            "Calls skipped because the provider could not start within the call timeout."
        );
        describe_counter!(
            "news_breaker_open_total",
            "Circuit breaker transitions into the open state."
        );
        describe_counter!("news_cache_hits_total", "Read-through cache hits.");
        describe_counter!("news_cache_misses_total", "Read-through cache misses.");
        describe_counter!(
            "news_dedup_total",
            "Articles removed as duplicates of an earlier article."
        );
        describe_counter!(
            "news_fallback_total",
            "Queries answered with the fallback placeholder article."
        );
        describe_histogram!("news_fetch_ms", "Provider fetch time in milliseconds.");
        describe_gauge!("news_cache_ttl_secs", "Configured article cache TTL.");
        describe_gauge!(
            "news_pipeline_last_run_ts",
            "Unix ts when the aggregation pipeline last ran."
        );
    });
}

/// Normalize provider text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags (Finnhub and RSS summaries often carry markup)
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

/// Lower-cased, trimmed, without trailing slashes.
pub fn normalize_url(url: &str) -> String {
    url.trim().to_lowercase().trim_end_matches('/').to_string()
}

/// Lower-cased, punctuation stripped, whitespace collapsed.
pub fn normalize_title(title: &str) -> String {
    let cleaned: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Identity used for deduplication: URL when present, else the title.
pub fn identity_key(a: &RawArticle) -> String {
    match a.url.as_deref().map(normalize_url) {
        Some(u) if !u.is_empty() => format!("url:{u}"),
        _ => format!("title:{}", normalize_title(&a.title)),
    }
}

/// Drop later duplicates; survivors keep the order of their first appearance.
/// Returns (kept, dropped_count).
pub fn dedup_articles(raw: Vec<RawArticle>) -> (Vec<RawArticle>, usize) {
    let mut seen: HashSet<String> = HashSet::with_capacity(raw.len());
    let mut keep = Vec::with_capacity(raw.len());
    let mut dropped = 0usize;

    for a in raw {
        if !seen.insert(identity_key(&a)) {
            dropped += 1;
            continue;
        }
        keep.push(a);
    }

    counter!("news_dedup_total").increment(dropped as u64);
    (keep, dropped)
}
