// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod catalyst;
pub mod config;
pub mod engine;
pub mod ingest;
pub mod metrics;
pub mod recency;
pub mod relevance;
pub mod summary;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::catalyst::Catalyst;
pub use crate::config::AggregatorConfig;
pub use crate::engine::{CompanyNews, MarketNews, NewsAggregator, StockContext};
pub use crate::ingest::error::ProviderError;
pub use crate::ingest::types::{Article, NewsProvider, Query, RawArticle};
