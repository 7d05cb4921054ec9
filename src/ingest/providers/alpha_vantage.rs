// src/ingest/providers/alpha_vantage.rs
//! Alpha Vantage `NEWS_SENTIMENT` adapter. The free tier is slow and strict,
//! hence the long default spacing.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;
use serde::Deserialize;

use super::http::{decode_json, fetch_body};
use super::{collect_drafts, window_start, Draft};
use crate::config::ProviderSettings;
use crate::ingest::error::ProviderError;
use crate::ingest::types::{NewsProvider, Query, RawArticle};

pub const NAME: &str = "alphavantage";
pub const KEY_ENV: &str = "ALPHAVANTAGE_API_KEY";
const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";
const DEFAULT_MIN_INTERVAL_MS: u64 = 12_000;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    feed: Option<Vec<Item>>,
    #[serde(rename = "Note", default)]
    note: Option<String>,
    #[serde(rename = "Information", default)]
    information: Option<String>,
    #[serde(rename = "Error Message", default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    summary: Option<String>,
    url: Option<String>,
    source: Option<String>,
    /// `YYYYMMDDTHHMMSS`, UTC.
    time_published: Option<String>,
}

pub struct AlphaVantageProvider {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    min_interval: Duration,
    timeout: Duration,
}

impl AlphaVantageProvider {
    pub fn from_settings(s: &ProviderSettings, http: reqwest::Client, timeout: Duration) -> Self {
        Self {
            http,
            api_key: s.resolve_key(KEY_ENV),
            base_url: s.base_url_or(DEFAULT_BASE_URL),
            min_interval: s.min_interval_or(DEFAULT_MIN_INTERVAL_MS),
            timeout,
        }
    }

    /// Throttle notices arrive as 200 responses with a `Note`/`Information` field.
    pub fn decode(body: &str) -> Result<Vec<RawArticle>, ProviderError> {
        let env: Envelope = decode_json(body)?;
        if let Some(msg) = env.error_message {
            return Err(ProviderError::Malformed(msg));
        }
        if let Some(msg) = env.note.or(env.information) {
            let lower = msg.to_lowercase();
            if lower.contains("api key") && lower.contains("invalid") {
                return Err(ProviderError::AuthError(msg));
            }
            return Err(ProviderError::RateLimited(msg));
        }
        let feed = env
            .feed
            .ok_or_else(|| ProviderError::Malformed("missing feed".to_string()))?;
        let drafts = feed.into_iter().map(|it| Draft {
            title: it.title,
            description: it.summary,
            url: it.url,
            source: it.source,
            published: it.time_published,
        });
        Ok(collect_drafts(NAME, "Alpha Vantage", drafts))
    }
}

#[async_trait]
impl NewsProvider for AlphaVantageProvider {
    async fn fetch(&self, query: &Query) -> Result<Vec<RawArticle>, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredential {
                env_var: KEY_ENV.to_string(),
            })?;
        let t0 = Instant::now();
        let time_from = window_start(query.lookback_hours)
            .format("%Y%m%dT%H%M")
            .to_string();
        let limit = query.limit.clamp(1, 1000).to_string();
        let (filter_key, filter_val) = if query.is_symbol() {
            ("tickers", query.subject.trim())
        } else {
            ("topics", "financial_markets")
        };
        let req = self
            .http
            .get(format!("{}/query", self.base_url))
            .query(&[
                ("function", "NEWS_SENTIMENT"),
                (filter_key, filter_val),
                ("time_from", time_from.as_str()),
                ("sort", "LATEST"),
                ("limit", limit.as_str()),
                ("apikey", key),
            ]);
        let body = fetch_body(req, self.timeout).await?;
        let out = Self::decode(&body);
        histogram!("news_fetch_ms", "provider" => NAME).record(t0.elapsed().as_secs_f64() * 1e3);
        out
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    fn min_interval(&self) -> Duration {
        self.min_interval
    }
}
