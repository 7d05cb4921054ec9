// src/engine.rs
//! # Fetch orchestrator
//! Fans a query out to every usable provider, then merges, dedups, scores,
//! classifies and window-filters the results. Provider failures never escape:
//! the worst case is a single fallback article with `collection_success = false`.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::catalyst::{self, Catalyst};
use crate::config::AggregatorConfig;
use crate::ingest::cache::{ArticleCache, CacheKey};
use crate::ingest::error::ProviderError;
use crate::ingest::health::{ProviderHealth, ProviderRegistry};
use crate::ingest::providers::build_providers;
use crate::ingest::throttle::Throttle;
use crate::ingest::types::{Article, NewsProvider, Query, RawArticle};
use crate::ingest::{dedup_articles, ensure_metrics_described};
use crate::recency::RecencyFilter;
use crate::relevance::RelevanceScorer;
use crate::summary;

/// Caller-supplied context for one symbol. Formatting only, never scoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StockContext {
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub percent_change: Option<f64>,
}

/// Result of one aggregation pass.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FetchOutcome {
    pub articles: Vec<Article>,
    pub sources_used: Vec<String>,
    pub collection_success: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompanyNews {
    pub articles: Vec<Article>,
    pub catalysts: Vec<Catalyst>,
    pub summary: String,
    pub sources_used: Vec<String>,
    pub collection_success: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MarketNews {
    pub market_news: Vec<Article>,
    pub market_summary: String,
    pub company_news: BTreeMap<String, Vec<Article>>,
    pub news_summaries: BTreeMap<String, String>,
    pub sources_used: Vec<String>,
    pub collection_success: bool,
}

struct ProviderSlot {
    provider: Arc<dyn NewsProvider>,
    throttle: Throttle,
}

struct Inner {
    slots: Vec<ProviderSlot>,
    registry: ProviderRegistry,
    cache: ArticleCache,
    scorer: RelevanceScorer,
    recency: RecencyFilter,
    per_call_timeout: Duration,
    config: AggregatorConfig,
}

/// Cheap to clone; all clones share providers, breaker state and cache.
#[derive(Clone)]
pub struct NewsAggregator {
    inner: Arc<Inner>,
}

/// Hands a granted half-open trial back if the call is skipped or dropped
/// mid-flight.
struct TrialGuard<'a> {
    registry: &'a ProviderRegistry,
    provider: &'static str,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!(provider = self.provider, "provider call did not complete");
            self.registry.abandon_trial_at(self.provider, Utc::now());
        }
    }
}

impl NewsAggregator {
    /// Providers are queried and merged in the order given.
    pub fn new(providers: Vec<Arc<dyn NewsProvider>>, config: &AggregatorConfig) -> Self {
        ensure_metrics_described();
        let registry = ProviderRegistry::new(
            providers.iter().map(|p| p.name().to_string()),
            config.breaker_policy(),
        );
        for p in providers.iter().filter(|p| !p.has_credentials()) {
            registry.mark_unconfigured(p.name());
        }
        let slots = providers
            .into_iter()
            .map(|provider| ProviderSlot {
                throttle: Throttle::new(provider.min_interval()),
                provider,
            })
            .collect();
        Self {
            inner: Arc::new(Inner {
                slots,
                registry,
                cache: ArticleCache::new(config.cache_ttl()),
                scorer: RelevanceScorer::new(&config.aliases),
                recency: RecencyFilter::new(config.market_tz()),
                per_call_timeout: config.per_call_timeout(),
                config: config.clone(),
            }),
        }
    }

    /// Build the HTTP adapters named in config.
    pub fn from_config(config: &AggregatorConfig) -> Self {
        Self::new(build_providers(config), config)
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.inner.registry
    }

    pub fn cache(&self) -> &ArticleCache {
        &self.inner.cache
    }

    pub fn provider_health(&self) -> Vec<ProviderHealth> {
        self.inner.registry.snapshot()
    }

    /// Aggregate one query. `deadline` bounds the whole fan-out; on expiry
    /// in-flight calls are aborted and whatever already arrived is used.
    pub async fn fetch(&self, query: &Query, deadline: Option<Duration>) -> FetchOutcome {
        let started = std::time::Instant::now();
        let n = self.inner.slots.len();
        let mut per_provider: Vec<Option<Vec<RawArticle>>> = vec![None; n];

        let mut set = JoinSet::new();
        for idx in 0..n {
            let inner = Arc::clone(&self.inner);
            let q = query.clone();
            set.spawn(async move {
                let got = inner.call_provider(idx, &q).await;
                (idx, got)
            });
        }

        {
            let collect = async {
                while let Some(joined) = set.join_next().await {
                    match joined {
                        Ok((idx, got)) => per_provider[idx] = got,
                        Err(e) => error!(error = ?e, "provider task failed"),
                    }
                }
            };
            match deadline {
                Some(d) => {
                    if tokio::time::timeout(d, collect).await.is_err() {
                        warn!(
                            subject = %query.subject,
                            deadline_ms = d.as_millis() as u64,
                            "aggregation deadline reached, abandoning in-flight calls"
                        );
                    }
                }
                None => collect.await,
            }
        }
        set.abort_all();

        let mut sources_used = Vec::new();
        let mut merged = Vec::new();
        for (slot, got) in self.inner.slots.iter().zip(per_provider) {
            if let Some(list) = got {
                if !list.is_empty() {
                    sources_used.push(slot.provider.name().to_string());
                }
                merged.extend(list);
            }
        }

        let now = Utc::now();
        let articles = self.inner.rank(merged, query, now);
        gauge!("news_pipeline_last_run_ts").set(now.timestamp() as f64);

        let outcome = if articles.is_empty() {
            counter!("news_fallback_total").increment(1);
            warn!(subject = %query.subject, "no articles collected, using fallback");
            FetchOutcome {
                articles: vec![fallback_article(&query.subject)],
                sources_used,
                collection_success: false,
            }
        } else {
            FetchOutcome {
                articles,
                sources_used,
                collection_success: true,
            }
        };
        info!(
            subject = %query.subject,
            articles = outcome.articles.len(),
            sources = ?outcome.sources_used,
            success = outcome.collection_success,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "aggregation finished"
        );
        outcome
    }

    pub async fn get_comprehensive_news(
        &self,
        symbol: &str,
        company_name: &str,
        percent_change: Option<f64>,
    ) -> CompanyNews {
        let cfg = &self.inner.config;
        let symbol = symbol.trim().to_uppercase();
        let q = Query::new(symbol.clone(), cfg.default_lookback_hours, cfg.default_limit);
        let out = self.fetch(&q, cfg.deadline()).await;

        let catalysts = if out.collection_success {
            summary::rank_catalysts(&out.articles)
        } else {
            Vec::new()
        };
        let summary = summary::company_summary(
            &symbol,
            company_name,
            percent_change,
            &out.articles,
            &catalysts,
            out.collection_success,
        );
        CompanyNews {
            articles: out.articles,
            catalysts,
            summary,
            sources_used: out.sources_used,
            collection_success: out.collection_success,
        }
    }

    /// General market news plus per-symbol company news, fetched concurrently.
    pub async fn get_market_news(
        &self,
        symbols: &[String],
        context: &HashMap<String, StockContext>,
    ) -> MarketNews {
        let cfg = &self.inner.config;
        let topic = cfg.market_topic.clone();
        let market_q = Query::new(topic.clone(), cfg.default_lookback_hours, cfg.default_limit);

        let mut wanted: Vec<String> = symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        wanted.sort();
        wanted.dedup();

        let mut set = JoinSet::new();
        for sym in wanted {
            let agg = self.clone();
            let ctx = context
                .get(&sym)
                .or_else(|| {
                    context
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(&sym))
                        .map(|(_, v)| v)
                })
                .cloned()
                .unwrap_or_default();
            set.spawn(async move {
                let news = agg
                    .get_comprehensive_news(&sym, &ctx.company_name, ctx.percent_change)
                    .await;
                (sym, news)
            });
        }

        let market = self.fetch(&market_q, cfg.deadline()).await;

        let mut company_news = BTreeMap::new();
        let mut news_summaries = BTreeMap::new();
        let mut any_company = false;
        let mut used: Vec<String> = market.sources_used.clone();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((sym, news)) => {
                    any_company |= news.collection_success;
                    used.extend(news.sources_used);
                    news_summaries.insert(sym.clone(), news.summary);
                    company_news.insert(sym, news.articles);
                }
                Err(e) => error!(error = ?e, "company news task failed"),
            }
        }

        let market_catalysts = if market.collection_success {
            summary::rank_catalysts(&market.articles)
        } else {
            Vec::new()
        };
        let market_summary = summary::market_summary(
            &topic,
            &market.articles,
            &market_catalysts,
            market.collection_success,
        );

        MarketNews {
            collection_success: market.collection_success || any_company,
            sources_used: self.in_provider_order(used),
            market_news: market.articles,
            market_summary,
            company_news,
            news_summaries,
        }
    }

    /// Dedup names and order them the way providers were registered.
    fn in_provider_order(&self, names: Vec<String>) -> Vec<String> {
        self.inner
            .slots
            .iter()
            .map(|s| s.provider.name())
            .filter(|n| names.iter().any(|u| u == n))
            .map(str::to_string)
            .collect()
    }
}

impl Inner {
    /// Cache first, then the provider's turn and spacing, then breaker, then
    /// the timed call. Waiting for the turn is bounded by the per-call timeout;
    /// a provider that cannot start in time is skipped without a breaker
    /// penalty. `None` means the provider contributed nothing.
    async fn call_provider(&self, idx: usize, q: &Query) -> Option<Vec<RawArticle>> {
        let slot = &self.slots[idx];
        let name = slot.provider.name();
        let key = CacheKey::new(name, q);
        let timeout = self.per_call_timeout;

        if let Some(hit) = self.cache.get(&key) {
            debug!(provider = name, articles = hit.len(), "served from cache");
            return Some(hit);
        }

        let wait_until = Instant::now() + timeout;
        let Ok(mut turn) = tokio::time::timeout_at(wait_until, slot.throttle.turn()).await else {
            return skip_busy(name);
        };
        // the call queued ahead of this one may have filled the cache
        if let Some(hit) = self.cache.get(&key) {
            debug!(provider = name, articles = hit.len(), "served from cache");
            return Some(hit);
        }
        if !self.registry.is_available(name) {
            debug!(provider = name, "provider unavailable, skipped");
            return None;
        }

        let mut guard = TrialGuard {
            registry: &self.registry,
            provider: name,
            armed: true,
        };
        if !turn.start_by(wait_until).await {
            // guard hands back a claimed trial
            return skip_busy(name);
        }
        counter!("news_provider_calls_total", "provider" => name).increment(1);
        let res = tokio::time::timeout(timeout, slot.provider.fetch(q))
            .await
            .unwrap_or(Err(ProviderError::Timeout(timeout)));
        guard.armed = false;

        match res {
            Ok(articles) => {
                self.registry.record_success(name);
                self.cache.put(&key, articles.clone());
                debug!(provider = name, articles = articles.len(), "provider call ok");
                Some(articles)
            }
            Err(e) if !e.counts_toward_breaker() => {
                info!(provider = name, error = %e, "credential missing, provider disabled");
                self.registry.mark_unconfigured(name);
                None
            }
            Err(e) => {
                counter!("news_provider_errors_total", "provider" => name, "kind" => e.kind())
                    .increment(1);
                warn!(provider = name, kind = e.kind(), error = %e, "provider call failed");
                self.registry.record_failure(name);
                None
            }
        }
    }

    /// Dedup → score/classify → window → sort → truncate.
    fn rank(&self, merged: Vec<RawArticle>, q: &Query, now: DateTime<Utc>) -> Vec<Article> {
        let total = merged.len();
        let (unique, dropped) = dedup_articles(merged);
        let window = q.window();

        let scored: Vec<Article> = unique
            .into_iter()
            .map(|raw| self.to_article(raw, &q.subject, now))
            .collect();
        let mut ranked: Vec<(usize, Article)> = self
            .recency
            .retain(scored, now, window)
            .into_iter()
            .enumerate()
            .collect();

        ranked.sort_by(|(ia, a), (ib, b)| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.published_at.cmp(&a.published_at))
                .then_with(|| ia.cmp(ib))
        });
        ranked.truncate(q.limit.max(1));

        debug!(
            subject = %q.subject,
            merged = total,
            duplicates = dropped,
            kept = ranked.len(),
            "ranking finished"
        );
        ranked.into_iter().map(|(_, a)| a).collect()
    }

    fn to_article(&self, raw: RawArticle, subject: &str, now: DateTime<Utc>) -> Article {
        let tag = catalyst::classify(&raw.title, &raw.description);
        let relevance_score = self.scorer.score(&raw.title, &raw.description, subject);
        let published_at = self.recency.parse(raw.published.as_deref(), now);
        Article {
            word_count: Article::word_count_of(&raw.title, &raw.description),
            relevance_score,
            catalyst_tags: tag.into_iter().collect(),
            published_at,
            title: raw.title,
            description: raw.description,
            url: raw.url,
            source: raw.source,
            published: raw.published,
            provider: raw.provider,
        }
    }
}

fn skip_busy(name: &'static str) -> Option<Vec<RawArticle>> {
    counter!("news_provider_skipped_total", "provider" => name, "reason" => "busy").increment(1);
    debug!(provider = name, "provider busy past the call timeout, skipped");
    None
}

/// Placeholder returned when nothing could be collected.
pub fn fallback_article(subject: &str) -> Article {
    let title = summary::FALLBACK_TITLE.to_string();
    let description = summary::fallback_description(subject);
    Article {
        word_count: Article::word_count_of(&title, &description),
        title,
        description,
        url: None,
        source: summary::FALLBACK_SOURCE.to_string(),
        published: None,
        published_at: None,
        provider: summary::FALLBACK_PROVIDER.to_string(),
        relevance_score: 0.0,
        catalyst_tags: Vec::new(),
    }
}
