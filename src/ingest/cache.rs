// src/ingest/cache.rs
//! Read-through TTL cache in front of provider adapters.
//!
//! Keyed by (provider, normalized query, lookback window, limit); adapters size
//! their requests by the limit, so it is part of the identity. Empty results are
//! stored too, so a provider with nothing to offer is not re-hammered. Errors
//! are never stored. Entries live in hashed shards, each behind its own lock.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::ingest::types::{Query, RawArticle};

const SHARDS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub provider: String,
    pub subject: String,
    pub window_hours: u32,
    pub limit: usize,
}

impl CacheKey {
    pub fn new(provider: &str, query: &Query) -> Self {
        Self {
            provider: provider.to_string(),
            subject: query.normalized_subject(),
            window_hours: query.lookback_hours,
            limit: query.limit,
        }
    }

    /// Stable hex digest of the key parts.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.provider.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.subject.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.window_hours.to_be_bytes());
        hasher.update([0u8]);
        hasher.update((self.limit as u64).to_be_bytes());
        let digest = hasher.finalize();
        let mut out = String::with_capacity(32);
        for b in digest.iter().take(16) {
            let _ = write!(&mut out, "{:02x}", b);
        }
        out
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    articles: Vec<RawArticle>,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ArticleCache {
    ttl: Duration,
    shards: Vec<RwLock<HashMap<String, CacheEntry>>>,
}

impl ArticleCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            shards: (0..SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn shard(&self, digest: &str) -> &RwLock<HashMap<String, CacheEntry>> {
        let idx = u8::from_str_radix(&digest[..2], 16).unwrap_or(0) as usize % SHARDS;
        &self.shards[idx]
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<RawArticle>> {
        self.get_at(key, Utc::now())
    }

    /// Returns the stored articles if the entry has not expired at `now`.
    pub fn get_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<Vec<RawArticle>> {
        let digest = key.digest();
        let hit = {
            let shard = self
                .shard(&digest)
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            shard
                .get(&digest)
                .filter(|e| now < e.expires_at)
                .map(|e| e.articles.clone())
        };
        match &hit {
            Some(v) => {
                counter!("news_cache_hits_total", "provider" => key.provider.clone()).increment(1);
                debug!(provider = %key.provider, subject = %key.subject, n = v.len(), "cache hit");
            }
            None => {
                counter!("news_cache_misses_total", "provider" => key.provider.clone())
                    .increment(1);
            }
        }
        hit
    }

    pub fn put(&self, key: &CacheKey, articles: Vec<RawArticle>) {
        self.put_at(key, articles, Utc::now());
    }

    /// Stores (or overwrites) the entry with a fresh TTL starting at `now`.
    pub fn put_at(&self, key: &CacheKey, articles: Vec<RawArticle>, now: DateTime<Utc>) {
        let digest = key.digest();
        let mut shard = self
            .shard(&digest)
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        shard.insert(
            digest,
            CacheEntry {
                articles,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Drops expired entries; returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for s in &self.shards {
            let mut shard = s.write().unwrap_or_else(PoisonError::into_inner);
            let before = shard.len();
            shard.retain(|_, e| now < e.expires_at);
            removed += before - shard.len();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
