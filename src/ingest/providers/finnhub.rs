// src/ingest/providers/finnhub.rs
//! finnhub.io adapter. Tickers go to `company-news`, topics to general news.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;
use serde::Deserialize;

use super::http::{decode_json, fetch_body};
use super::{collect_drafts, window_start, Draft};
use crate::config::ProviderSettings;
use crate::ingest::error::ProviderError;
use crate::ingest::types::{NewsProvider, Query, RawArticle};

pub const NAME: &str = "finnhub";
pub const KEY_ENV: &str = "FINNHUB_API_KEY";
const DEFAULT_BASE_URL: &str = "https://finnhub.io";
const DEFAULT_MIN_INTERVAL_MS: u64 = 1_100;

#[derive(Debug, Deserialize)]
struct Item {
    headline: Option<String>,
    summary: Option<String>,
    url: Option<String>,
    source: Option<String>,
    /// Unix seconds.
    datetime: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Body {
    Items(Vec<Item>),
    Error(ErrorBody),
}

pub struct FinnhubProvider {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    min_interval: Duration,
    timeout: Duration,
}

impl FinnhubProvider {
    pub fn from_settings(s: &ProviderSettings, http: reqwest::Client, timeout: Duration) -> Self {
        Self {
            http,
            api_key: s.resolve_key(KEY_ENV),
            base_url: s.base_url_or(DEFAULT_BASE_URL),
            min_interval: s.min_interval_or(DEFAULT_MIN_INTERVAL_MS),
            timeout,
        }
    }

    pub fn decode(body: &str) -> Result<Vec<RawArticle>, ProviderError> {
        match decode_json::<Body>(body)? {
            Body::Error(e) => {
                let lower = e.error.to_lowercase();
                Err(if lower.contains("api limit") || lower.contains("limit reached") {
                    ProviderError::RateLimited(e.error)
                } else if lower.contains("key") || lower.contains("access") {
                    ProviderError::AuthError(e.error)
                } else {
                    ProviderError::Malformed(e.error)
                })
            }
            Body::Items(items) => {
                let drafts = items.into_iter().map(|it| Draft {
                    title: it.headline,
                    description: it.summary,
                    url: it.url,
                    source: it.source,
                    published: it.datetime.filter(|t| *t > 0).map(|t| t.to_string()),
                });
                Ok(collect_drafts(NAME, "Finnhub", drafts))
            }
        }
    }
}

#[async_trait]
impl NewsProvider for FinnhubProvider {
    async fn fetch(&self, query: &Query) -> Result<Vec<RawArticle>, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredential {
                env_var: KEY_ENV.to_string(),
            })?;
        let t0 = Instant::now();
        let req = if query.is_symbol() {
            let from = window_start(query.lookback_hours)
                .format("%Y-%m-%d")
                .to_string();
            let to = chrono::Utc::now().format("%Y-%m-%d").to_string();
            self.http
                .get(format!("{}/api/v1/company-news", self.base_url))
                .query(&[
                    ("symbol", query.subject.trim()),
                    ("from", from.as_str()),
                    ("to", to.as_str()),
                    ("token", key),
                ])
        } else {
            self.http
                .get(format!("{}/api/v1/news", self.base_url))
                .query(&[("category", "general"), ("token", key)])
        };
        let body = fetch_body(req, self.timeout).await?;
        let out = Self::decode(&body).map(|mut v| {
            // company-news is not capped server-side
            v.truncate(query.limit.max(1) * 3);
            v
        });
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
