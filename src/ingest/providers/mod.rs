// src/ingest/providers/mod.rs
pub mod alpha_vantage;
pub mod finnhub;
pub mod http;
pub mod marketaux;
pub mod newsapi;
pub mod yahoo_rss;

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::AggregatorConfig;
use crate::ingest::error::ParseError;
use crate::ingest::normalize_text;
use crate::ingest::types::{NewsProvider, RawArticle};

/// Provider-shaped article fields before normalization.
#[derive(Debug, Default, Clone)]
pub(crate) struct Draft {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub source: Option<String>,
    pub published: Option<String>,
}

impl Draft {
    fn finish(self, provider: &str, default_source: &str) -> Result<RawArticle, ParseError> {
        let title = normalize_text(&self.title.ok_or(ParseError::MissingField("title"))?);
        if title.is_empty() {
            return Err(ParseError::Empty("title"));
        }
        let description = self
            .description
            .as_deref()
            .map(normalize_text)
            .unwrap_or_default();
        let url = self
            .url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        let source = self
            .source
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_source.to_string());
        let published = self
            .published
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        Ok(RawArticle {
            title,
            description,
            url,
            source,
            published,
            provider: provider.to_string(),
        })
    }
}

/// Normalize drafts into articles; a bad article is dropped, the batch continues.
pub(crate) fn collect_drafts<I>(provider: &str, default_source: &str, drafts: I) -> Vec<RawArticle>
where
    I: IntoIterator<Item = Draft>,
{
    let mut out = Vec::new();
    let mut dropped = 0usize;
    for d in drafts {
        match d.finish(provider, default_source) {
            Ok(a) => out.push(a),
            Err(e) => {
                dropped += 1;
                debug!(provider, error = %e, "article dropped during decode");
            }
        }
    }
    if dropped > 0 {
        debug!(provider, dropped, kept = out.len(), "decode finished with drops");
    }
    out
}

/// Build every enabled adapter from config. Adapters without credentials are
/// still returned; the orchestrator marks them unconfigured.
pub fn build_providers(cfg: &AggregatorConfig) -> Vec<Arc<dyn NewsProvider>> {
    let client = http::build_client();
    let timeout = cfg.per_call_timeout();
    let mut out: Vec<Arc<dyn NewsProvider>> = Vec::new();

    let s = cfg.provider(newsapi::NAME);
    if s.enabled {
        out.push(Arc::new(newsapi::NewsApiProvider::from_settings(
            &s,
            client.clone(),
            timeout,
        )));
    }
    let s = cfg.provider(finnhub::NAME);
    if s.enabled {
        out.push(Arc::new(finnhub::FinnhubProvider::from_settings(
            &s,
            client.clone(),
            timeout,
        )));
    }
    let s = cfg.provider(alpha_vantage::NAME);
    if s.enabled {
        out.push(Arc::new(alpha_vantage::AlphaVantageProvider::from_settings(
            &s,
            client.clone(),
            timeout,
        )));
    }
    let s = cfg.provider(marketaux::NAME);
    if s.enabled {
        out.push(Arc::new(marketaux::MarketauxProvider::from_settings(
            &s,
            client.clone(),
            timeout,
        )));
    }
    let s = cfg.provider(yahoo_rss::NAME);
    if s.enabled {
        out.push(Arc::new(yahoo_rss::YahooRssProvider::from_settings(
            &s, client, timeout,
        )));
    }

    info!(
        providers = ?out.iter().map(|p| p.name()).collect::<Vec<_>>(),
        configured = out.iter().filter(|p| p.has_credentials()).count(),
        "news providers built"
    );
    out
}

/// Start of a lookback window, UTC.
pub(crate) fn window_start(lookback_hours: u32) -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now() - chrono::Duration::hours(i64::from(lookback_hours))
}
