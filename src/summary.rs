// src/summary.rs
//! Extractive summaries for company and market results.

use std::collections::HashMap;

use crate::catalyst::Catalyst;
use crate::ingest::types::Article;

pub const FALLBACK_TITLE: &str = "No recent news available";
pub const FALLBACK_SOURCE: &str = "market-news-aggregator";
pub const FALLBACK_PROVIDER: &str = "fallback";

const MAX_HEADLINES: usize = 3;

/// Placeholder description for the fallback article.
pub fn fallback_description(subject: &str) -> String {
    format!(
        "No fresh news could be collected for {subject} right now. \
         Movement may reflect broader market conditions."
    )
}

/// Tags across all articles, most frequent first; ties in declaration order.
pub fn rank_catalysts(articles: &[Article]) -> Vec<Catalyst> {
    let mut counts: HashMap<Catalyst, usize> = HashMap::new();
    for a in articles {
        for c in &a.catalyst_tags {
            *counts.entry(*c).or_insert(0) += 1;
        }
    }
    let mut out: Vec<_> = Catalyst::ALL
        .iter()
        .copied()
        .filter(|c| counts.contains_key(c))
        .collect();
    // stable sort keeps declaration order among equal counts
    out.sort_by(|a, b| counts[b].cmp(&counts[a]));
    out
}

fn headlines(articles: &[Article]) -> String {
    articles
        .iter()
        .take(MAX_HEADLINES)
        .map(|a| format!("\"{}\" ({})", a.title, a.source))
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn company_summary(
    symbol: &str,
    company_name: &str,
    percent_change: Option<f64>,
    articles: &[Article],
    catalysts: &[Catalyst],
    collected: bool,
) -> String {
    let name = if company_name.trim().is_empty() {
        symbol.to_string()
    } else {
        format!("{} ({symbol})", company_name.trim())
    };
    let mv = percent_change
        .map(|p| format!(" moved {p:+.2}%"))
        .unwrap_or_default();
    if !collected || articles.is_empty() {
        return format!("{name}{mv}. {}", fallback_description(symbol));
    }
    let mut s = format!("{name}{mv}.");
    if let Some(c) = catalysts.first() {
        s.push_str(&format!(" Primary catalyst: {}.", c.label()));
    }
    s.push_str(&format!(" Top headlines: {}.", headlines(articles)));
    s
}

pub fn market_summary(topic: &str, articles: &[Article], catalysts: &[Catalyst], collected: bool) -> String {
    if !collected || articles.is_empty() {
        return fallback_description(topic);
    }
    let mut s = format!("Latest {topic} news.");
    if let Some(c) = catalysts.first() {
        s.push_str(&format!(" Dominant theme: {}.", c.label()));
    }
    s.push_str(&format!(" Top headlines: {}.", headlines(articles)));
    s
}
