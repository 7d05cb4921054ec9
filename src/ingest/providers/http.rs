// src/ingest/providers/http.rs
//! Shared HTTP plumbing for the JSON/RSS adapters: one client builder and one
//! place where transport and status failures become `ProviderError`s.

use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::ingest::error::ProviderError;

const USER_AGENT: &str = "market-news-aggregator/0.1";

pub fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(4))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = ?e, "custom http client failed to build, using defaults");
            reqwest::Client::new()
        })
}

/// Map a non-success HTTP status to the breaker taxonomy.
pub fn classify_status(status: StatusCode) -> Option<ProviderError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::AuthError(format!("http {status}"))
        }
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited(format!("http {status}")),
        s if s.is_server_error() => ProviderError::Unavailable(format!("http {s}")),
        s => ProviderError::Malformed(format!("unexpected http {s}")),
    })
}

fn map_transport(e: reqwest::Error, timeout: Duration) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout)
    } else if e.is_decode() || e.is_body() {
        ProviderError::Malformed(e.to_string())
    } else {
        ProviderError::Unavailable(e.to_string())
    }
}

/// Send the request and return the body text of a 2xx response.
pub async fn fetch_body(req: RequestBuilder, timeout: Duration) -> Result<String, ProviderError> {
    let resp = req
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| map_transport(e, timeout))?;
    if let Some(err) = classify_status(resp.status()) {
        return Err(err);
    }
    resp.text().await.map_err(|e| map_transport(e, timeout))
}

pub fn decode_json<T: DeserializeOwned>(body: &str) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))
}
