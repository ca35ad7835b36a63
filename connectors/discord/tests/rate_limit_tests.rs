//! Fleet-wide rate limiting as seen through the Discord client.

use std::sync::Arc;
use std::time::Duration;

use guildsync_discord::{DiscordClient, DiscordConfig, DiscordError};
use guildsync_ratelimit::{MemoryRateStore, RetryAfterUnit, SharedRateStore};
use guildsync_testkit::{fixtures, MockApiServer};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

const GUILD: u64 = 100;
const USER: u64 = 7;
const MEMBER_PATH: &str = "/guilds/100/members/7";

fn test_config(base_url: &str) -> DiscordConfig {
    let mut config = DiscordConfig::new("test-bot-token");
    config.api_url = base_url.to_string();
    config.rate_limit.max_requests = 1000;
    config
}

fn new_client(config: &DiscordConfig, store: &Arc<MemoryRateStore>) -> DiscordClient {
    guildsync_testkit::init_test_tracing();
    DiscordClient::new(config, store.clone()).unwrap()
}

/// Answer the first request with a 429, every later one with a member.
async fn rate_limited_once(mock: &MockApiServer, retry_after: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(MEMBER_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "message": "You are being rate limited.",
            "retry_after": retry_after,
            "global": true
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(mock.inner())
        .await;
    mock.expect_get(MEMBER_PATH, fixtures::member(USER, &[], None)).await;
}

#[tokio::test]
async fn too_many_requests_blocks_the_window() {
    let mock = MockApiServer::start().await;
    rate_limited_once(&mock, json!(3)).await;
    let store = Arc::new(MemoryRateStore::new());
    let client = new_client(&test_config(&mock.base_url()), &store);

    let err = client.guild_member(GUILD, USER).await.unwrap_err();
    assert!(matches!(
        err,
        DiscordError::TooManyRequests { retry_after } if retry_after == Duration::from_millis(3500)
    ));

    let err = client.guild_member(GUILD, USER).await.unwrap_err();
    let retry_after = err.retry_after().unwrap();
    assert!(matches!(err, DiscordError::TooManyRequests { .. }));
    assert!(retry_after > Duration::from_millis(3000), "{retry_after:?}");
    assert!(retry_after <= Duration::from_millis(3500), "{retry_after:?}");
    assert_eq!(err.retry_after_secs(), Some(4));

    assert_eq!(mock.request_count_to("GET", MEMBER_PATH).await, 1);
}

#[tokio::test]
async fn call_after_window_proceeds() {
    let mock = MockApiServer::start().await;
    rate_limited_once(&mock, json!(300)).await;
    let store = Arc::new(MemoryRateStore::new());
    let mut config = test_config(&mock.base_url());
    config.rate_limit.duration_contingency_ms = 100;
    config.rate_limit.retry_after_unit = RetryAfterUnit::Milliseconds;
    let client = new_client(&config, &store);

    let err = client.guild_member(GUILD, USER).await.unwrap_err();
    assert_eq!(err.retry_after(), Some(Duration::from_millis(400)));
    assert!(client.guild_member(GUILD, USER).await.unwrap_err().is_backoff());

    tokio::time::sleep(Duration::from_millis(450)).await;

    assert!(client.guild_member(GUILD, USER).await.unwrap().is_some());
    assert_eq!(mock.request_count_to("GET", MEMBER_PATH).await, 2);

    let requests = mock.requests_to("GET", MEMBER_PATH).await;
    assert_eq!(
        requests[0]
            .headers
            .get("x-ratelimit-precision")
            .and_then(|v| v.to_str().ok()),
        Some("millisecond")
    );
}

#[tokio::test]
async fn retry_after_is_read_in_seconds_by_default() {
    let mock = MockApiServer::start().await;
    rate_limited_once(&mock, json!(1.5)).await;
    let store = Arc::new(MemoryRateStore::new());
    let client = new_client(&test_config(&mock.base_url()), &store);

    let err = client.guild_member(GUILD, USER).await.unwrap_err();

    assert_eq!(err.retry_after(), Some(Duration::from_millis(2000)));
    let requests = mock.requests_to("GET", MEMBER_PATH).await;
    assert!(requests[0].headers.get("x-ratelimit-precision").is_none());
}

#[tokio::test]
async fn retry_after_header_backs_up_the_body() {
    let mock = MockApiServer::start().await;
    mock.expect_status_with_headers(
        "GET",
        MEMBER_PATH,
        429,
        json!({"message": "You are being rate limited.", "global": false}),
        &[
            ("retry-after", "2"),
            ("x-ratelimit-limit", "5"),
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset-after", "2"),
        ],
    )
    .await;
    let store = Arc::new(MemoryRateStore::new());
    let client = new_client(&test_config(&mock.base_url()), &store);

    let err = client.guild_member(GUILD, USER).await.unwrap_err();

    assert!(matches!(
        err,
        DiscordError::TooManyRequests { retry_after } if retry_after == Duration::from_millis(2500)
    ));
    assert!(store.get("discord:global:backoff").await.unwrap().is_some());
}

#[tokio::test]
async fn body_retry_after_wins_over_headers() {
    let mock = MockApiServer::start().await;
    mock.expect_status_with_headers(
        "GET",
        MEMBER_PATH,
        429,
        json!({"message": "You are being rate limited.", "retry_after": 1, "global": true}),
        &[("retry-after", "9"), ("x-ratelimit-global", "true")],
    )
    .await;
    let store = Arc::new(MemoryRateStore::new());
    let client = new_client(&test_config(&mock.base_url()), &store);

    let err = client.guild_member(GUILD, USER).await.unwrap_err();

    assert_eq!(err.retry_after(), Some(Duration::from_millis(1500)));
}

#[tokio::test]
async fn backoff_is_shared_between_clients() {
    let mock = MockApiServer::start().await;
    rate_limited_once(&mock, json!(3)).await;
    let store = Arc::new(MemoryRateStore::new());
    let config = test_config(&mock.base_url());
    let first = new_client(&config, &store);
    let second = new_client(&config, &store);

    assert!(first.guild_member(GUILD, USER).await.unwrap_err().is_backoff());

    let err = second.guild_roles(GUILD, false).await.unwrap_err();
    assert!(matches!(err, DiscordError::TooManyRequests { .. }));
    assert_eq!(mock.received_requests().await.len(), 1);
}

#[tokio::test]
async fn unusable_retry_after_falls_back_to_default() {
    let mock = MockApiServer::start().await;
    rate_limited_once(&mock, json!("soon")).await;
    let store = Arc::new(MemoryRateStore::new());
    let client = new_client(&test_config(&mock.base_url()), &store);

    let err = client.guild_member(GUILD, USER).await.unwrap_err();

    assert_eq!(err.retry_after(), Some(Duration::from_millis(5000)));
}

#[tokio::test]
async fn unrate_limited_client_still_records_backoff() {
    let mock = MockApiServer::start().await;
    rate_limited_once(&mock, json!(3)).await;
    let store = Arc::new(MemoryRateStore::new());
    let mut config = test_config(&mock.base_url());
    config.is_rate_limited = false;
    let client = new_client(&config, &store);
    assert!(!client.is_rate_limited());

    assert!(client.guild_member(GUILD, USER).await.unwrap_err().is_backoff());
    assert!(store.get("discord:global:backoff").await.unwrap().is_some());

    assert!(client.guild_member(GUILD, USER).await.unwrap().is_some());
    assert_eq!(mock.request_count_to("GET", MEMBER_PATH).await, 2);
}

#[tokio::test]
async fn route_bucket_exhaustion() {
    let mock = MockApiServer::start().await;
    mock.expect_get(MEMBER_PATH, fixtures::member(USER, &[], None)).await;
    mock.expect_get("/users/@me", fixtures::user(USER, "bruce")).await;
    let store = Arc::new(MemoryRateStore::new());
    let mut config = test_config(&mock.base_url());
    config.rate_limit.max_requests = 2;
    let client = new_client(&config, &store);

    client.guild_member(GUILD, USER).await.unwrap();
    client.guild_member(GUILD, USER).await.unwrap();
    let err = client.guild_member(GUILD, USER).await.unwrap_err();
    assert!(matches!(err, DiscordError::RateLimitExhausted { .. }));
    assert!(err.retry_after().unwrap() > Duration::from_secs(4));

    assert!(client.current_user("user-access-token").await.is_ok());
    assert_eq!(mock.request_count_to("GET", MEMBER_PATH).await, 2);
}

#[tokio::test]
async fn rate_limit_headers_are_advisory() {
    let mock = MockApiServer::start().await;
    mock.expect_with_headers(
        "GET",
        MEMBER_PATH,
        fixtures::member(USER, &[], None),
        &[
            ("x-ratelimit-limit", "5"),
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset-after", "not-a-number"),
        ],
    )
    .await;
    let store = Arc::new(MemoryRateStore::new());
    let client = new_client(&test_config(&mock.base_url()), &store);

    assert!(client.guild_member(GUILD, USER).await.unwrap().is_some());
    assert!(client.guild_member(GUILD, USER).await.unwrap().is_some());
}
