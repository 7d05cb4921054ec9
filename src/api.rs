// src/api.rs
//! HTTP surface over the aggregator.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::engine::{CompanyNews, MarketNews, NewsAggregator, StockContext};
use crate::ingest::health::ProviderHealth;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: NewsAggregator,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/news/{symbol}", get(company_news))
        .route("/market-news", post(market_news))
        .route("/debug/providers", get(debug_providers))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

pub fn router(aggregator: NewsAggregator) -> Router {
    create_router(AppState { aggregator })
}

#[derive(Debug, Deserialize)]
struct CompanyParams {
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    pct: Option<f64>,
}

async fn company_news(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<CompanyParams>,
) -> Json<CompanyNews> {
    info!(%symbol, "company news requested");
    let company = params.company.unwrap_or_default();
    Json(
        state
            .aggregator
            .get_comprehensive_news(&symbol, &company, params.pct)
            .await,
    )
}

#[derive(Debug, Deserialize)]
struct MarketNewsReq {
    #[serde(default)]
    symbols: Vec<String>,
    #[serde(default)]
    context: HashMap<String, StockContext>,
}

async fn market_news(
    State(state): State<AppState>,
    Json(body): Json<MarketNewsReq>,
) -> Json<MarketNews> {
    info!(symbols = ?body.symbols, "market news requested");
    Json(
        state
            .aggregator
            .get_market_news(&body.symbols, &body.context)
            .await,
    )
}

async fn debug_providers(State(state): State<AppState>) -> Json<Vec<ProviderHealth>> {
    Json(state.aggregator.provider_health())
}
