// src/ingest/providers/newsapi.rs
//! newsapi.org `/v2/everything` adapter. Auth via `X-Api-Key` header.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;
use serde::Deserialize;

use super::http::{decode_json, fetch_body};
use super::{collect_drafts, window_start, Draft};
use crate::config::ProviderSettings;
use crate::ingest::error::ProviderError;
use crate::ingest::types::{NewsProvider, Query, RawArticle};

pub const NAME: &str = "newsapi";
pub const KEY_ENV: &str = "NEWSAPI_API_KEY";
const DEFAULT_BASE_URL: &str = "https://newsapi.org";
const DEFAULT_MIN_INTERVAL_MS: u64 = 1_000;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    status: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    #[serde(default)]
    source: Option<Source>,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Source {
    name: Option<String>,
}

pub struct NewsApiProvider {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    min_interval: Duration,
    timeout: Duration,
}

impl NewsApiProvider {
    pub fn from_settings(s: &ProviderSettings, http: reqwest::Client, timeout: Duration) -> Self {
        Self {
            http,
            api_key: s.resolve_key(KEY_ENV),
            base_url: s.base_url_or(DEFAULT_BASE_URL),
            min_interval: s.min_interval_or(DEFAULT_MIN_INTERVAL_MS),
            timeout,
        }
    }

    /// Decode a `/v2/everything` body. `removed.com` placeholders are skipped.
    pub fn decode(body: &str) -> Result<Vec<RawArticle>, ProviderError> {
        let env: Envelope = decode_json(body)?;
        if env.status != "ok" {
            let code = env.code.unwrap_or_default();
            let msg = env.message.unwrap_or_else(|| code.clone());
            return Err(match code.as_str() {
                "rateLimited" | "maximumResultsReached" => ProviderError::RateLimited(msg),
                c if c.starts_with("apiKey") => ProviderError::AuthError(msg),
                _ => ProviderError::Malformed(msg),
            });
        }
        let drafts = env
            .articles
            .into_iter()
            .filter(|it| it.title.as_deref() != Some("[Removed]"))
            .map(|it| Draft {
                title: it.title,
                description: it.description,
                url: it.url,
                source: it.source.and_then(|s| s.name),
                published: it.published_at,
            });
        Ok(collect_drafts(NAME, "NewsAPI", drafts))
    }
}

#[async_trait]
impl NewsProvider for NewsApiProvider {
    async fn fetch(&self, query: &Query) -> Result<Vec<RawArticle>, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredential {
                env_var: KEY_ENV.to_string(),
            })?;
        let t0 = Instant::now();
        let from = window_start(query.lookback_hours)
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();
        let page_size = query.limit.clamp(1, MAX_PAGE_SIZE).to_string();
        let req = self
            .http
            .get(format!("{}/v2/everything", self.base_url))
            .header("X-Api-Key", key)
            .query(&[
                ("q", query.subject.as_str()),
                ("from", from.as_str()),
                ("sortBy", "publishedAt"),
                ("language", "en"),
                ("pageSize", page_size.as_str()),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_articles_and_source_names() {
        let body = r#"{"status":"ok","totalResults":2,"articles":[
            {"source":{"id":null,"name":"Reuters"},"title":"Apple beats Q3 earnings estimates",
             "description":"Shares rose.","url":"https://r.test/1","publishedAt":"2024-08-01T20:30:00Z"},
            {"source":{"id":null,"name":"[Removed]"},"title":"[Removed]","description":null,"url":"https://removed.com","publishedAt":"2024-08-01T20:00:00Z"}
        ]}"#;
        let out = NewsApiProvider::decode(body).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, "Reuters");
        assert_eq!(out[0].published.as_deref(), Some("2024-08-01T20:30:00Z"));
        assert_eq!(out[0].provider, NAME);
    }

    #[test]
    fn error_codes_map_to_taxonomy() {
        let rl = r#"{"status":"error","code":"rateLimited","message":"slow down"}"#;
        assert_eq!(
            NewsApiProvider::decode(rl),
            Err(ProviderError::RateLimited("slow down".into()))
        );
        let auth = r#"{"status":"error","code":"apiKeyInvalid","message":"bad key"}"#;
        assert!(matches!(
            NewsApiProvider::decode(auth),
            Err(ProviderError::AuthError(_))
        ));
        let other = r#"{"status":"error","code":"parameterInvalid"}"#;
        assert!(matches!(
            NewsApiProvider::decode(other),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn missing_key_is_reported_before_any_request() {
        let p = NewsApiProvider {
            http: reqwest::Client::new(),
            api_key: None,
            base_url: "http://127.0.0.1:9".into(),
            min_interval: Duration::ZERO,
            timeout: Duration::from_millis(10),
        };
        assert!(!p.has_credentials());
        let err = p.fetch(&Query::new("AAPL", 24, 10)).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredential { .. }));
    }
}
