//! Market news aggregator: binary entrypoint.
//! Loads config, builds the provider stack and serves the Axum router.

use anyhow::Context;
use market_news_aggregator::{api, config::load_config_default, metrics::Metrics, NewsAggregator};
use shuttle_axum::ShuttleAxum;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs by default; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("market_news_aggregator=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        // shuttle may have installed a subscriber already
        eprintln!("tracing subscriber already set, keeping it");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = load_config_default().context("loading aggregator config")?;
    info!(
        failure_threshold = cfg.failure_threshold,
        recovery_delay_secs = cfg.recovery_delay_secs,
        cache_ttl_secs = cfg.cache_ttl_secs,
        market_tz = %cfg.market_timezone,
        "aggregator config loaded"
    );

    let aggregator = NewsAggregator::from_config(&cfg);
    let mut router = api::router(aggregator.clone());

    match Metrics::init(cfg.cache_ttl_secs) {
        Ok(m) => router = router.merge(m.router()),
        Err(e) => warn!(error = ?e, "metrics disabled"),
    }

    // Hourly sweep so expired entries do not pile up between queries.
    let sweeper = aggregator.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            tick.tick().await;
            let purged = sweeper.cache().purge_expired(chrono::Utc::now());
            if purged > 0 {
                info!(purged, "expired cache entries purged");
            }
        }
    });

    Ok(router.into())
}
