// src/ingest/providers/marketaux.rs
//! marketaux.com `/v1/news/all` adapter.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;
use serde::Deserialize;

use super::http::{decode_json, fetch_body};
use super::{collect_drafts, window_start, Draft};
use crate::config::ProviderSettings;
use crate::ingest::error::ProviderError;
use crate::ingest::types::{NewsProvider, Query, RawArticle};

pub const NAME: &str = "marketaux";
pub const KEY_ENV: &str = "MARKETAUX_API_KEY";
const DEFAULT_BASE_URL: &str = "https://api.marketaux.com";
const DEFAULT_MIN_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<Vec<Item>>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    description: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    url: Option<String>,
    source: Option<String>,
    published_at: Option<String>,
}

pub struct MarketauxProvider {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    min_interval: Duration,
    timeout: Duration,
}

impl MarketauxProvider {
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
        let env: Envelope = decode_json(body)?;
        if let Some(e) = env.error {
            let msg = if e.message.is_empty() {
                e.code.clone()
            } else {
                e.message
            };
            return Err(match e.code.as_str() {
                "invalid_api_token" | "usage_limit_reached_invalid_plan" | "restricted_resource" => {
                    ProviderError::AuthError(msg)
                }
                "usage_limit_reached" | "rate_limit_reached" => ProviderError::RateLimited(msg),
                _ => ProviderError::Malformed(msg),
            });
        }
        let data = env
            .data
            .ok_or_else(|| ProviderError::Malformed("missing data".to_string()))?;
        let drafts = data.into_iter().map(|it| Draft {
            title: it.title,
            description: it.description.filter(|d| !d.trim().is_empty()).or(it.snippet),
            url: it.url,
            source: it.source,
            published: it.published_at,
        });
        Ok(collect_drafts(NAME, "Marketaux", drafts))
    }
}

#[async_trait]
impl NewsProvider for MarketauxProvider {
    async fn fetch(&self, query: &Query) -> Result<Vec<RawArticle>, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredential {
                env_var: KEY_ENV.to_string(),
            })?;
        let t0 = Instant::now();
        let after = window_start(query.lookback_hours)
            .format("%Y-%m-%dT%H:%M")
            .to_string();
        let limit = query.limit.clamp(1, 50).to_string();
        let filter = if query.is_symbol() { "symbols" } else { "search" };
        let req = self
            .http
            .get(format!("{}/v1/news/all", self.base_url))
            .query(&[
                (filter, query.subject.trim()),
                ("published_after", after.as_str()),
                ("language", "en"),
                ("filter_entities", "true"),
                ("limit", limit.as_str()),
                ("api_token", key),
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
