// src/ingest/providers/yahoo_rss.rs
//! Yahoo Finance headline RSS. Keyless, so it is the last line of defence
//! when every keyed provider is down.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;

use super::http::fetch_body;
use super::{collect_drafts, Draft};
use crate::config::ProviderSettings;
use crate::ingest::error::ProviderError;
use crate::ingest::types::{NewsProvider, Query, RawArticle};

pub const NAME: &str = "yahoo_rss";
const DEFAULT_BASE_URL: &str = "https://feeds.finance.yahoo.com";
const DEFAULT_MIN_INTERVAL_MS: u64 = 500;
const MARKET_SYMBOL: &str = "^GSPC";

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

pub struct YahooRssProvider {
    http: reqwest::Client,
    base_url: String,
    min_interval: Duration,
    timeout: Duration,
}

impl YahooRssProvider {
    pub fn from_settings(s: &ProviderSettings, http: reqwest::Client, timeout: Duration) -> Self {
        Self {
            http,
            base_url: s.base_url_or(DEFAULT_BASE_URL),
            min_interval: s.min_interval_or(DEFAULT_MIN_INTERVAL_MS),
            timeout,
        }
    }

    pub fn decode(body: &str) -> Result<Vec<RawArticle>, ProviderError> {
        let xml_clean = scrub_html_entities_for_xml(body);
        let rss: Rss = from_str(&xml_clean).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let drafts = rss.channel.item.into_iter().map(|it| Draft {
            title: it.title,
            description: it.description,
            url: it.link,
            source: None,
            published: it.pub_date,
        });
        Ok(collect_drafts(NAME, "Yahoo Finance", drafts))
    }
}

#[async_trait]
impl NewsProvider for YahooRssProvider {
    async fn fetch(&self, query: &Query) -> Result<Vec<RawArticle>, ProviderError> {
        let t0 = Instant::now();
        let symbol = if query.is_symbol() {
            query.subject.trim()
        } else {
            MARKET_SYMBOL
        };
        let req = self
            .http
            .get(format!("{}/rss/2.0/headline", self.base_url))
            .query(&[("s", symbol), ("region", "US"), ("lang", "en-US")]);
        let body = fetch_body(req, self.timeout).await?;
        let out = Self::decode(&body);
        histogram!("news_fetch_ms", "provider" => NAME).record(t0.elapsed().as_secs_f64() * 1e3);
        out
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

// quick-xml only knows the five XML entities.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
