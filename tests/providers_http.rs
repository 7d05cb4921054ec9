// tests/providers_http.rs
//
// Adapters against a local axum server: query shape, auth and status mapping.

use std::collections::HashMap;
use std::time::Duration;

use axum::{extract::Query as QueryParams, http::StatusCode, routing::get, Router};
use market_news_aggregator::config::ProviderSettings;
use market_news_aggregator::ingest::providers::{
    finnhub::FinnhubProvider, http::build_client, newsapi::NewsApiProvider,
    yahoo_rss::YahooRssProvider,
};
use market_news_aggregator::{NewsProvider, ProviderError, Query};
use serial_test::serial;

const KEY_VAR: &str = "MNA_TEST_PROVIDER_KEY";

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn settings(base_url: String) -> ProviderSettings {
    ProviderSettings {
        base_url: Some(base_url),
        api_key_env: Some(KEY_VAR.to_string()),
        ..ProviderSettings::default()
    }
}

fn finnhub_app() -> Router {
    Router::new()
        .route(
            "/api/v1/company-news",
            get(|QueryParams(q): QueryParams<HashMap<String, String>>| async move {
                if q.get("token").map(String::as_str) != Some("k1") {
                    return (StatusCode::UNAUTHORIZED, "bad token".to_string());
                }
                if q.get("symbol").map(String::as_str) != Some("AAPL") || !q.contains_key("from") {
                    return (StatusCode::BAD_REQUEST, "bad query".to_string());
                }
                let body = r#"[{"datetime":1722544200,"headline":"Apple unveils new product line",
                    "source":"Yahoo","summary":"Recap.","url":"https://f.test/1"}]"#;
                (StatusCode::OK, body.to_string())
            }),
        )
        .route(
            "/api/v1/news",
            get(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        )
}

#[tokio::test]
#[serial]
async fn finnhub_company_news_roundtrip_and_auth() {
    let base = serve(finnhub_app()).await;

    std::env::set_var(KEY_VAR, "k1");
    let p = FinnhubProvider::from_settings(&settings(base.clone()), build_client(), Duration::from_secs(2));
    let out = p.fetch(&Query::new("AAPL", 24, 10)).await.unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].title, "Apple unveils new product line");

    // topic queries hit general news, which is rate limited here
    let err = p.fetch(&Query::new("stock market", 24, 10)).await.unwrap_err();
    assert!(matches!(err, ProviderError::RateLimited(_)), "{err:?}");

    std::env::set_var(KEY_VAR, "wrong");
    let p = FinnhubProvider::from_settings(&settings(base), build_client(), Duration::from_secs(2));
    let err = p.fetch(&Query::new("AAPL", 24, 10)).await.unwrap_err();
    assert!(matches!(err, ProviderError::AuthError(_)), "{err:?}");

    std::env::remove_var(KEY_VAR);
}

#[tokio::test]
#[serial]
async fn blank_key_is_missing_credential() {
    std::env::set_var(KEY_VAR, "   ");
    let p = NewsApiProvider::from_settings(
        &settings("http://127.0.0.1:9".into()),
        build_client(),
        Duration::from_secs(1),
    );
    std::env::remove_var(KEY_VAR);
    assert!(!p.has_credentials());
    assert!(matches!(
        p.fetch(&Query::new("AAPL", 24, 10)).await,
        Err(ProviderError::MissingCredential { .. })
    ));
}

#[tokio::test]
async fn server_errors_are_unavailable() {
    let app = Router::new().route(
        "/rss/2.0/headline",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
    );
    let base = serve(app).await;
    let p = YahooRssProvider::from_settings(
        &ProviderSettings {
            base_url: Some(base),
            ..ProviderSettings::default()
        },
        build_client(),
        Duration::from_secs(2),
    );
    let err = p.fetch(&Query::new("AAPL", 24, 10)).await.unwrap_err();
    assert!(matches!(err, ProviderError::Unavailable(_)), "{err:?}");
}

#[tokio::test]
#[serial]
async fn slow_server_is_a_timeout() {
    let app = Router::new().route(
        "/v2/everything",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            r#"{"status":"ok","articles":[]}"#
        }),
    );
    let base = serve(app).await;
    std::env::set_var(KEY_VAR, "k1");
    let p = NewsApiProvider::from_settings(&settings(base), build_client(), Duration::from_millis(150));
    std::env::remove_var(KEY_VAR);

    let err = p.fetch(&Query::new("AAPL", 24, 10)).await.unwrap_err();
    assert_eq!(err, ProviderError::Timeout(Duration::from_millis(150)));
}
