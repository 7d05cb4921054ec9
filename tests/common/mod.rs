// tests/common/mod.rs
//! Scripted in-memory providers shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use market_news_aggregator::{AggregatorConfig, NewsProvider, ProviderError, Query, RawArticle};

#[derive(Clone)]
pub enum Script {
    Articles(Vec<RawArticle>),
    Fail(ProviderError),
    /// Sleep, then return the articles.
    Slow(Duration, Vec<RawArticle>),
    /// `query.limit` generated articles, like a paged API.
    Sized,
    /// One entry per call; the last one repeats.
    Sequence(Vec<Result<Vec<RawArticle>, ProviderError>>),
}

pub struct Scripted {
    pub name: &'static str,
    pub script: Script,
    pub keyed: bool,
    pub interval: Duration,
    pub calls: AtomicUsize,
}

impl Scripted {
    pub fn new(name: &'static str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            name,
            script,
            keyed: true,
            interval: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    /// Provider whose calls must start at least `interval` apart.
    pub fn spaced(name: &'static str, interval: Duration, script: Script) -> Arc<Self> {
        Arc::new(Self {
            name,
            script,
            keyed: true,
            interval,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn without_key(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            script: Script::Articles(vec![article(name, "should never be fetched", None)]),
            keyed: false,
            interval: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NewsProvider for Scripted {
    async fn fetch(&self, q: &Query) -> Result<Vec<RawArticle>, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Articles(v) => Ok(v.clone()),
            Script::Fail(e) => Err(e.clone()),
            Script::Slow(d, v) => {
                tokio::time::sleep(*d).await;
                Ok(v.clone())
            }
            Script::Sized => Ok((0..q.limit)
                .map(|i| {
                    let url = format!("https://{}.test/{i}", self.name);
                    article(self.name, &format!("Wire story {i}"), Some(&url))
                })
                .collect()),
            Script::Sequence(steps) => match steps.get(n).or_else(|| steps.last()) {
                Some(step) => step.clone(),
                None => Ok(Vec::new()),
            },
        }
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn has_credentials(&self) -> bool {
        self.keyed
    }

    fn min_interval(&self) -> Duration {
        self.interval
    }
}

pub fn article(provider: &str, title: &str, url: Option<&str>) -> RawArticle {
    RawArticle {
        title: title.to_string(),
        description: String::new(),
        url: url.map(str::to_string),
        source: "Reuters".to_string(),
        published: None,
        provider: provider.to_string(),
    }
}

pub fn as_dyn(ps: &[Arc<Scripted>]) -> Vec<Arc<dyn NewsProvider>> {
    ps.iter()
        .map(|p| Arc::clone(p) as Arc<dyn NewsProvider>)
        .collect()
}

/// Defaults with a short per-call timeout.
pub fn test_config() -> AggregatorConfig {
    AggregatorConfig {
        per_call_timeout_ms: 200,
        ..AggregatorConfig::default()
    }
}
