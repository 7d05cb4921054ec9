// tests/pipeline.rs
//
// Orchestrator behavior with scripted providers: breaker, cache, fallback,
// timeouts and the overall deadline.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use common::{article, as_dyn, test_config, Script, Scripted};
use market_news_aggregator::{NewsAggregator, ProviderError, Query, StockContext};

#[tokio::test]
async fn breaker_opens_on_fifth_failure_and_stops_calling() {
    let bad = Scripted::new("bad", Script::Fail(ProviderError::Unavailable("503".into())));
    let agg = NewsAggregator::new(as_dyn(&[bad.clone()]), &test_config());
    let q = Query::new("AAPL", 24, 10);

    for i in 1..=4 {
        agg.fetch(&q, None).await;
        assert_eq!(bad.calls(), i);
        assert!(agg.registry().is_available("bad"), "opened early at {i}");
    }
    let out = agg.fetch(&q, None).await;
    assert_eq!(bad.calls(), 5);
    assert!(!out.collection_success);

    let h = agg.registry().health("bad").unwrap();
    assert!(h.disabled);
    assert_eq!(h.consecutive_failures, 5);
    let until = h.disabled_until.unwrap();
    assert!(until > Utc::now());

    // sixth query: provider is skipped
    agg.fetch(&q, None).await;
    assert_eq!(bad.calls(), 5);
}

#[tokio::test]
async fn second_fetch_within_ttl_is_served_from_cache() {
    let p = Scripted::new(
        "wire",
        Script::Articles(vec![article("wire", "Apple beats Q3 earnings estimates", Some("https://w.test/1"))]),
    );
    let agg = NewsAggregator::new(as_dyn(&[p.clone()]), &test_config());
    let q = Query::new("AAPL", 24, 10);

    let first = agg.fetch(&q, None).await;
    let second = agg.fetch(&q, None).await;
    assert_eq!(p.calls(), 1);
    assert_eq!(first, second);
    assert_eq!(first.articles[0].relevance_score, 6.0);

    // a different window is a different cache key
    agg.fetch(&Query::new("AAPL", 48, 10), None).await;
    assert_eq!(p.calls(), 2);
}

#[tokio::test]
async fn empty_results_are_cached_errors_are_not() {
    let empty = Scripted::new("empty", Script::Articles(Vec::new()));
    let failing = Scripted::new("failing", Script::Fail(ProviderError::Malformed("bad json".into())));
    let agg = NewsAggregator::new(as_dyn(&[empty.clone(), failing.clone()]), &test_config());
    let q = Query::new("MSFT", 24, 10);

    agg.fetch(&q, None).await;
    agg.fetch(&q, None).await;
    assert_eq!(empty.calls(), 1);
    assert_eq!(failing.calls(), 2);
}

#[tokio::test]
async fn cached_results_survive_an_open_breaker() {
    let p = Scripted::new(
        "wire",
        Script::Articles(vec![article("wire", "Tesla recall widens", Some("https://w.test/t"))]),
    );
    let agg = NewsAggregator::new(as_dyn(&[p.clone()]), &test_config());
    let q = Query::new("TSLA", 24, 10);
    agg.fetch(&q, None).await;

    for _ in 0..5 {
        agg.registry().record_failure("wire");
    }
    assert!(!agg.registry().is_available("wire"));

    let out = agg.fetch(&q, None).await;
    assert!(out.collection_success);
    assert_eq!(out.articles[0].title, "Tesla recall widens");
    assert_eq!(p.calls(), 1);
}

#[tokio::test]
async fn all_providers_without_credentials_yield_fallback() {
    let a = Scripted::without_key("a");
    let b = Scripted::without_key("b");
    let agg = NewsAggregator::new(as_dyn(&[a.clone(), b.clone()]), &test_config());

    let mut ctx = HashMap::new();
    ctx.insert(
        "AAPL".to_string(),
        StockContext {
            company_name: "Apple Inc.".into(),
            percent_change: Some(-2.5),
        },
    );
    let out = agg.get_market_news(&["AAPL".to_string()], &ctx).await;

    assert!(!out.collection_success);
    assert_eq!(out.market_news.len(), 1);
    assert_eq!(out.market_news[0].provider, "fallback");
    assert!(!out.market_news[0].description.is_empty());
    assert_eq!(out.company_news["AAPL"].len(), 1);
    assert!(out.news_summaries["AAPL"].starts_with("Apple Inc. (AAPL) moved -2.50%."));
    assert!(out.sources_used.is_empty());
    assert_eq!(a.calls() + b.calls(), 0);
    assert_eq!(agg.registry().health("a").unwrap().state, "unconfigured");
}

#[tokio::test]
async fn runtime_missing_credential_is_not_a_breaker_failure() {
    let p = Scripted::new(
        "keyless",
        Script::Fail(ProviderError::MissingCredential {
            env_var: "KEYLESS_API_KEY".into(),
        }),
    );
    let agg = NewsAggregator::new(as_dyn(&[p.clone()]), &test_config());
    let q = Query::new("AAPL", 24, 10);
    agg.fetch(&q, None).await;
    agg.fetch(&q, None).await;

    assert_eq!(p.calls(), 1);
    let h = agg.registry().health("keyless").unwrap();
    assert_eq!(h.state, "unconfigured");
    assert_eq!(h.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn per_call_timeout_counts_as_failure() {
    let slow = Scripted::new("slow", Script::Slow(Duration::from_secs(5), Vec::new()));
    let fast = Scripted::new(
        "fast",
        Script::Articles(vec![article("fast", "Fed holds rates steady", None)]),
    );
    let mut cfg = test_config();
    cfg.failure_threshold = 1;
    let agg = NewsAggregator::new(as_dyn(&[slow.clone(), fast.clone()]), &cfg);

    let out = agg.fetch(&Query::new("stock market", 24, 10), None).await;
    assert!(out.collection_success);
    assert_eq!(out.sources_used, vec!["fast"]);
    assert_eq!(agg.registry().health("slow").unwrap().state, "open");
    assert_eq!(agg.registry().health("fast").unwrap().state, "closed");
}

#[tokio::test(start_paused = true)]
async fn deadline_keeps_what_already_arrived() {
    let slow = Scripted::new(
        "slow",
        Script::Slow(Duration::from_secs(30), vec![article("slow", "Late story", None)]),
    );
    let fast = Scripted::new(
        "fast",
        Script::Articles(vec![article("fast", "Early story", None)]),
    );
    let mut cfg = test_config();
    cfg.per_call_timeout_ms = 60_000;
    let agg = NewsAggregator::new(as_dyn(&[slow.clone(), fast.clone()]), &cfg);

    let out = agg
        .fetch(&Query::new("AAPL", 24, 10), Some(Duration::from_millis(100)))
        .await;
    let titles: Vec<_> = out.articles.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["Early story"]);
    assert!(out.collection_success);
    // abandoned, not failed
    assert_eq!(agg.registry().health("slow").unwrap().consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn deadline_with_nothing_in_yields_fallback() {
    let slow = Scripted::new(
        "slow",
        Script::Slow(Duration::from_secs(30), vec![article("slow", "Late story", None)]),
    );
    let mut cfg = test_config();
    cfg.per_call_timeout_ms = 60_000;
    let agg = NewsAggregator::new(as_dyn(&[slow]), &cfg);
    let out = agg
        .fetch(&Query::new("AAPL", 24, 10), Some(Duration::from_millis(100)))
        .await;
    assert!(!out.collection_success);
    assert_eq!(out.articles.len(), 1);
}

#[tokio::test]
async fn duplicates_across_providers_keep_first_provider() {
    let a = Scripted::new(
        "a",
        Script::Articles(vec![article("a", "Nvidia unveils new chip", Some("https://n.test/chip/"))]),
    );
    let b = Scripted::new(
        "b",
        Script::Articles(vec![
            article("b", "Nvidia unveils new chip (update)", Some("HTTPS://N.TEST/chip")),
            article("b", "Nvidia analyst upgrade", Some("https://n.test/upgrade")),
        ]),
    );
    let agg = NewsAggregator::new(as_dyn(&[a, b]), &test_config());
    let out = agg.fetch(&Query::new("NVDA", 24, 10), None).await;

    assert_eq!(out.articles.len(), 2);
    let chip = out
        .articles
        .iter()
        .find(|x| x.title.starts_with("Nvidia unveils"))
        .unwrap();
    assert_eq!(chip.provider, "a");
    assert_eq!(out.sources_used, vec!["a", "b"]);
}

#[tokio::test]
async fn stale_articles_are_filtered_unparsable_kept() {
    let now = Utc::now();
    let mut fresh = article("w", "Fresh story", Some("https://w.test/fresh"));
    fresh.published = Some((now - chrono::Duration::hours(2)).to_rfc3339());
    let mut stale = article("w", "Stale story", Some("https://w.test/stale"));
    stale.published = Some((now - chrono::Duration::hours(30)).timestamp().to_string());
    let mut odd = article("w", "Odd story", Some("https://w.test/odd"));
    odd.published = Some("sometime last spring".into());

    let p = Scripted::new("w", Script::Articles(vec![fresh, stale, odd]));
    let agg = NewsAggregator::new(as_dyn(&[p]), &test_config());
    let out = agg.fetch(&Query::new("XYZ", 24, 10), None).await;

    let titles: Vec<_> = out.articles.iter().map(|a| a.title.as_str()).collect();
    // equal scores: newer first, unknown time last
    assert_eq!(titles, vec!["Fresh story", "Odd story"]);
    assert!(out.articles[0].published_at.is_some());
    assert!(out.articles[1].published_at.is_none());
}

#[tokio::test]
async fn company_news_carries_catalysts_and_summary() {
    let p = Scripted::new(
        "wire",
        Script::Articles(vec![
            article("wire", "Apple beats Q3 earnings estimates", Some("https://w.test/1")),
            article("wire", "Apple raises dividend", Some("https://w.test/2")),
            article("wire", "Apple earnings call recap", Some("https://w.test/3")),
        ]),
    );
    let agg = NewsAggregator::new(as_dyn(&[p]), &test_config());
    let news = agg
        .get_comprehensive_news("aapl", "Apple Inc.", Some(4.2))
        .await;

    assert!(news.collection_success);
    assert_eq!(news.sources_used, vec!["wire"]);
    assert_eq!(
        news.catalysts,
        vec![
            market_news_aggregator::Catalyst::Earnings,
            market_news_aggregator::Catalyst::DividendBuyback
        ]
    );
    assert!(news.summary.starts_with("Apple Inc. (AAPL) moved +4.20%."));
    assert!(news.summary.contains("Primary catalyst: earnings."));
}

#[tokio::test]
async fn larger_limit_is_not_served_from_a_smaller_cached_page() {
    let p = Scripted::new("wire", Script::Sized);
    let agg = NewsAggregator::new(as_dyn(&[p.clone()]), &test_config());

    let small = agg.fetch(&Query::new("AAPL", 24, 2), None).await;
    let big = agg.fetch(&Query::new("AAPL", 24, 20), None).await;
    assert_eq!(small.articles.len(), 2);
    assert_eq!(big.articles.len(), 20);
    assert_eq!(p.calls(), 2);

    // same limit again is a cache hit
    agg.fetch(&Query::new("AAPL", 24, 20), None).await;
    assert_eq!(p.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn spaced_provider_does_not_hold_up_market_news() {
    let spaced = Scripted::spaced(
        "spaced",
        Duration::from_secs(12),
        Script::Articles(vec![article("spaced", "Slow wire story", None)]),
    );
    let fast = Scripted::new(
        "fast",
        Script::Articles(vec![article("fast", "Fed holds rates steady", None)]),
    );
    let agg = NewsAggregator::new(as_dyn(&[spaced.clone(), fast.clone()]), &test_config());
    let symbols: Vec<String> = (0..10).map(|i| format!("SYM{i}")).collect();

    let started = tokio::time::Instant::now();
    let out = agg.get_market_news(&symbols, &HashMap::new()).await;
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");
    assert!(out.collection_success);
    assert_eq!(out.company_news.len(), 10);
    assert_eq!(fast.calls(), 11);
    // only the first call fits before the spacing; the rest are skipped
    assert_eq!(spaced.calls(), 1);
    let h = agg.registry().health("spaced").unwrap();
    assert_eq!(h.state, "closed");
    assert_eq!(h.consecutive_failures, 0);
}

#[tokio::test]
async fn open_breaker_recovers_through_one_trial_call() {
    let p = Scripted::new(
        "flaky",
        Script::Sequence(vec![
            Err(ProviderError::Unavailable("503".into())),
            Ok(vec![article("flaky", "Apple raises dividend", Some("https://f.test/1"))]),
        ]),
    );
    let mut cfg = test_config();
    cfg.failure_threshold = 1;
    cfg.recovery_delay_secs = 1;
    cfg.max_recovery_delay_secs = 1;
    let agg = NewsAggregator::new(as_dyn(&[p.clone()]), &cfg);

    let out = agg.fetch(&Query::new("AAPL", 24, 10), None).await;
    assert!(!out.collection_success);
    assert_eq!(agg.registry().health("flaky").unwrap().state, "open");

    // still inside the recovery delay: skipped
    agg.fetch(&Query::new("MSFT", 24, 10), None).await;
    assert_eq!(p.calls(), 1);

    // breaker runs on wall-clock time
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let out = agg.fetch(&Query::new("AAPL", 24, 10), None).await;
    assert!(out.collection_success);
    assert_eq!(p.calls(), 2);
    let h = agg.registry().health("flaky").unwrap();
    assert_eq!(h.state, "closed");
    assert_eq!(h.consecutive_failures, 0);
    assert!(!h.disabled);

    // closed again: a new subject goes straight through
    agg.fetch(&Query::new("TSLA", 24, 10), None).await;
    assert_eq!(p.calls(), 3);
}
