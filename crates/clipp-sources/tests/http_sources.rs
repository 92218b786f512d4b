//! Integration tests for the HTTP-backed coupon sources using wiremock.

use std::sync::Arc;
use std::time::Duration;

use clipp_core::{SourceConfig, StoreConfig};
use clipp_sources::{
    build_sources, CouponApiSource, CouponCache, CouponFinder, CouponSource, LinkMyDealsSource,
    MemoryStore, RedditSource, RetryPolicy, SourceError, SourceSettings, COMMUNITY_NAMESPACE,
    DISCOVERY_NAMESPACE,
};
use wiremock::matchers::{header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings() -> SourceSettings {
    SourceSettings::new(
        "Clipp/1.0 test",
        Duration::from_secs(5),
        RetryPolicy {
            max_retries: 2,
            backoff_base_ms: 0,
        },
    )
    .expect("client construction should not fail")
}

fn zalando() -> StoreConfig {
    StoreConfig {
        store_id: "zalando".to_string(),
        store_name: "Zalando".to_string(),
        domain_patterns: vec!["zalando.se".to_string()],
        active: true,
        coupon_input_selector: None,
        apply_button_selector: None,
    }
}

fn source_config(name: &str, base_url: &str, api_key: Option<&str>) -> SourceConfig {
    let mut config = SourceConfig::new(name);
    config.base_url = Some(base_url.to_string());
    config.api_key = api_key.map(str::to_string);
    config
}

fn memory_cache(namespace: &str) -> CouponCache {
    CouponCache::new(Arc::new(MemoryStore::new()), namespace, Duration::from_secs(3600))
}

#[tokio::test]
async fn coupon_api_maps_records_and_sends_bearer_key() {
    let server = MockServer::start().await;
    let body = serde_json::json!({
        "coupons": [
            {
                "code": "save20",
                "description": "20% på allt",
                "discount_percent": 20.0,
                "discount_type": "percentage",
                "expiry_date": "2099-12-31",
                "verified": true
            },
            { "code": "FRIFRAKT", "discount_type": "shipping" },
            { "code": "OLD5", "expiry_date": "2001-01-01" },
            { "code": "GET" }
        ]
    });

    Mock::given(method("GET"))
        .and(path("/v1/coupons"))
        .and(header("authorization", "Bearer k-123"))
        .and(query_param("store", "Zalando"))
        .and(query_param("domain", "zalando.se"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .expect(1)
        .mount(&server)
        .await;

    let source = CouponApiSource::new(
        &source_config("CouponAPI.org", &server.uri(), Some("k-123")),
        &settings(),
    );
    let coupons = source.fetch(&zalando()).await.expect("should parse coupons");

    let codes: Vec<&str> = coupons.iter().map(|c| c.code.as_str()).collect();
    assert_eq!(codes, vec!["SAVE20", "FRIFRAKT"]);
    assert!(coupons[0].verified);
    assert_eq!(coupons[0].discount_value, Some(20.0));
    assert!(coupons[0].expires_at.is_some());
    assert_eq!(coupons[1].description, "Spara med FRIFRAKT");
    assert_eq!(coupons[1].source, "CouponAPI.org");
}

#[tokio::test]
async fn placeholder_key_skips_the_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let source = CouponApiSource::new(
        &source_config("CouponAPI.org", &server.uri(), Some("YOUR_API_KEY_HERE")),
        &settings(),
    );
    let coupons = source.fetch(&zalando()).await.expect("unconfigured source is not an error");
    assert!(coupons.is_empty());
}

#[tokio::test]
async fn client_error_is_unexpected_status_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/coupons"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let source = CouponApiSource::new(
        &source_config("CouponAPI.org", &server.uri(), Some("bad-key")),
        &settings(),
    );
    let err = source.fetch(&zalando()).await.unwrap_err();
    assert!(
        matches!(err, SourceError::UnexpectedStatus { status: 401, .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn rate_limit_is_retried_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/deals/coupons"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/deals/coupons"))
        .and(header("x-api-key", "lmd-key"))
        .and(query_param("merchant", "Zalando"))
        .and(query_param("country", "SE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {
                    "coupon_code": "NYTT15",
                    "title": "15% för nya kunder",
                    "discount_amount": 15.0,
                    "discount_type": "percentage",
                    "verified": false
                },
                { "title": "Automatisk rea utan kod" }
            ]
        })))
        .mount(&server)
        .await;

    let source = LinkMyDealsSource::new(
        &source_config("LinkMyDeals", &server.uri(), Some("lmd-key")),
        &settings(),
    );
    let coupons = source.fetch(&zalando()).await.expect("retry should recover");
    assert_eq!(coupons.len(), 1);
    assert_eq!(coupons[0].code.as_str(), "NYTT15");
    assert!((coupons[0].confidence - 0.7).abs() < f64::EPSILON);
}

#[tokio::test]
async fn persistent_rate_limit_surfaces_as_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
        .expect(3)
        .mount(&server)
        .await;

    let source = LinkMyDealsSource::new(
        &source_config("LinkMyDeals", &server.uri(), Some("lmd-key")),
        &settings(),
    );
    let err = source.fetch(&zalando()).await.unwrap_err();
    assert!(
        matches!(
            err,
            SourceError::RateLimited {
                retry_after_secs: 30,
                ..
            }
        ),
        "got {err:?}"
    );
}

#[tokio::test]
async fn malformed_body_is_a_deserialize_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let source = CouponApiSource::new(
        &source_config("CouponAPI.org", &server.uri(), Some("k-123")),
        &settings(),
    );
    let err = source.fetch(&zalando()).await.unwrap_err();
    assert!(matches!(err, SourceError::Deserialize { .. }), "got {err:?}");
}

#[tokio::test]
async fn reddit_extracts_codes_from_posts() {
    let server = MockServer::start().await;
    let now = chrono::Utc::now().timestamp();

    #[allow(clippy::cast_precision_loss)]
    let body = serde_json::json!({
        "data": {
            "children": [
                { "data": {
                    "title": "Zalando code NYTT15 still working!",
                    "selftext": "Also try rabattkod: sommar25",
                    "score": 150,
                    "created_utc": now as f64,
                    "permalink": "/r/coupons/comments/abc/zalando/"
                }},
                { "data": {
                    "title": "HTTP API GET",
                    "selftext": "",
                    "score": 3,
                    "created_utc": now as f64
                }}
            ]
        }
    });

    Mock::given(method("GET"))
        .and(path("/r/coupons/search.json"))
        .and(query_param("restrict_sr", "1"))
        .and(query_param("sort", "new"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/r/(deals|discounts)/search\.json$"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let source = RedditSource::new(&source_config("Reddit", &server.uri(), None), &settings());
    let mut coupons = source.fetch(&zalando()).await.expect("partial failures are tolerated");
    coupons.sort_by(|a, b| a.code.cmp(&b.code));

    let codes: Vec<&str> = coupons.iter().map(|c| c.code.as_str()).collect();
    assert_eq!(codes, vec!["NYTT15", "SOMMAR25"]);
    let nytt = &coupons[0];
    assert_eq!(nytt.source, "reddit");
    assert_eq!(nytt.source_label.as_deref(), Some("r/coupons"));
    assert_eq!(
        nytt.url.as_deref(),
        Some("https://reddit.com/r/coupons/comments/abc/zalando/")
    );
    // 0.5 base + 0.2 popular + 0.2 fresh + 0.1 "working"
    assert!((nytt.confidence - 1.0).abs() < 1e-9, "got {}", nytt.confidence);
}

#[tokio::test]
async fn reddit_total_outage_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let source = RedditSource::new(&source_config("Reddit", &server.uri(), None), &settings());
    assert!(source.fetch(&zalando()).await.is_err());
}

#[tokio::test]
async fn finder_merges_api_listing_and_community_sources() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/coupons"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "coupons": [
                { "code": "NYTT15", "discount_percent": 15.0, "verified": true }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/r/.+/search\.json$"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let configs = vec![
        source_config("CouponAPI.org", &server.uri(), Some("k-123")),
        SourceConfig::new("Rabattkod.se"),
        source_config("Reddit", &server.uri(), None),
        SourceConfig::new("Community"),
    ];
    let sources = build_sources(&configs, &settings(), memory_cache(COMMUNITY_NAMESPACE));
    let finder = CouponFinder::new(sources, memory_cache(DISCOVERY_NAMESPACE));

    let outcome = finder.find_coupons_detailed(&zalando()).await;
    assert!(outcome.failed_sources.is_empty(), "{:?}", outcome.failed_sources);
    assert!(outcome.coupons.len() <= 10);

    // NYTT15 comes from both the API (verified) and the community table.
    let nytt: Vec<_> = outcome
        .coupons
        .iter()
        .filter(|c| c.code.as_str() == "NYTT15")
        .collect();
    assert_eq!(nytt.len(), 1);
    assert!(nytt[0].verified);
    assert_eq!(nytt[0].source, "CouponAPI.org");
    assert!(outcome.coupons[0].verified);
}
