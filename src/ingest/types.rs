// src/ingest/types.rs
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalyst::Catalyst;
use crate::ingest::error::ProviderError;

/// Article as returned by one adapter, before any scoring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawArticle {
    pub title: String,
    pub description: String,
    pub url: Option<String>,
    pub source: String, // publisher, e.g. "Reuters"
    /// Provider-specific timestamp text (epoch, ISO-8601, RFC 2822, "2 hours ago", ...).
    pub published: Option<String>,
    pub provider: String, // adapter id, e.g. "finnhub"
}

/// Normalized, scored article handed to downstream consumers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub title: String,
    pub description: String,
    pub url: Option<String>,
    pub source: String,
    pub published: Option<String>,
    /// Parsed form of `published`, when parsing succeeded.
    pub published_at: Option<DateTime<Utc>>,
    pub provider: String,
    pub relevance_score: f64,
    pub catalyst_tags: Vec<Catalyst>,
    pub word_count: usize,
}

impl Article {
    pub fn word_count_of(title: &str, description: &str) -> usize {
        title.split_whitespace().count() + description.split_whitespace().count()
    }
}

/// What the caller wants: a ticker or topic, how far back, and how many.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Query {
    pub subject: String,
    pub lookback_hours: u32,
    pub limit: usize,
}

impl Query {
    pub fn new(subject: impl Into<String>, lookback_hours: u32, limit: usize) -> Self {
        Self {
            subject: subject.into(),
            lookback_hours,
            limit,
        }
    }

    /// Trimmed, lower-cased, inner whitespace collapsed. Used for cache keys.
    pub fn normalized_subject(&self) -> String {
        self.subject
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    /// Ticker-looking subjects ("AAPL", "BRK.B") get company endpoints;
    /// anything else is treated as a free-text topic.
    pub fn is_symbol(&self) -> bool {
        let s = self.subject.trim();
        !s.is_empty()
            && s.len() <= 6
            && s.chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.')
    }

    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.lookback_hours))
    }
}

/// One external news source.
#[async_trait]
pub trait NewsProvider: Send + Sync {
    async fn fetch(&self, query: &Query) -> Result<Vec<RawArticle>, ProviderError>;

    fn name(&self) -> &'static str;

    /// False when the provider needs an API key that is not configured.
    fn has_credentials(&self) -> bool {
        true
    }

    /// Minimum spacing between two sequential calls to this provider.
    fn min_interval(&self) -> Duration;
}
