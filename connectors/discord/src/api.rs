//! Discord REST request executor.
//!
//! Every call goes through [`ApiRequestExecutor::send`]: gate on the shared
//! rate limiter, issue the request, turn a 429 into a fleet-wide backoff and
//! harvest the advisory rate limit headers.

use std::fmt;
use std::str::FromStr;

use guildsync_ratelimit::{RateLimitHeaders, RetryAfterUnit, SharedRateLimiter};
use guildsync_telemetry::{mask_secret, redact_sensitive};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DiscordConfig;
use crate::error::{DiscordError, DiscordResult};

/// API error code for an absent guild member.
pub const UNKNOWN_MEMBER: u64 = 10007;

/// API error code for an absent role.
pub const UNKNOWN_ROLE: u64 = 10011;

/// HTTP methods the API is called with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl ApiMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    fn to_reqwest(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Patch => Method::PATCH,
            Self::Delete => Method::DELETE,
        }
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiMethod {
    type Err = DiscordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(DiscordError::InvalidMethod(s.to_string())),
        }
    }
}

/// Credentials a request is sent with.
#[derive(Clone, Copy)]
pub enum Authorization<'a> {
    /// The configured bot token.
    Bot,
    /// A user's OAuth access token.
    Bearer(&'a str),
}

/// Error body returned by the API.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<u64>,
    message: Option<String>,
}

/// A response that passed rate limit handling.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
    pub rate_limit: RateLimitHeaders,
}

impl ApiResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// API error code from the body, if it carries one.
    #[must_use]
    pub fn error_code(&self) -> Option<u64> {
        serde_json::from_str::<ApiErrorBody>(&self.body)
            .ok()
            .and_then(|b| b.code)
    }

    /// A 404 naming an absent member.
    #[must_use]
    pub fn is_unknown_member(&self) -> bool {
        self.status == StatusCode::NOT_FOUND && self.error_code() == Some(UNKNOWN_MEMBER)
    }

    /// A 404 naming an absent member or role.
    #[must_use]
    pub fn is_unknown_target(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
            && matches!(self.error_code(), Some(UNKNOWN_MEMBER | UNKNOWN_ROLE))
    }

    /// Body as JSON, `None` when empty.
    ///
    /// # Errors
    ///
    /// Returns an error if a non-empty body is not valid JSON.
    pub fn json_value(&self) -> DiscordResult<Option<Value>> {
        if self.body.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&self.body)?))
    }

    /// Body deserialized into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::MalformedResponse`] if the body does not fit `T`.
    pub fn json<T: DeserializeOwned>(&self) -> DiscordResult<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            DiscordError::MalformedResponse(format!("{e} in response body {:?}", self.body))
        })
    }

    /// Fail on non-success statuses.
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::Status`] carrying the API's message and code.
    pub fn error_for_status(self) -> DiscordResult<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let parsed = serde_json::from_str::<ApiErrorBody>(&self.body).ok();
        let code = parsed.as_ref().and_then(|b| b.code);
        let message = parsed
            .and_then(|b| b.message)
            .unwrap_or_else(|| self.body.clone());
        Err(DiscordError::Status {
            status: self.status.as_u16(),
            message,
            code,
        })
    }
}

/// Issues API calls on behalf of the client.
pub struct ApiRequestExecutor {
    client: Client,
    base_url: String,
    bot_token: String,
    limiter: SharedRateLimiter,
    redact_fields: Vec<String>,
}

impl fmt::Debug for ApiRequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequestExecutor")
            .field("base_url", &self.base_url)
            .field("bot_token", &mask_secret(&self.bot_token))
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl ApiRequestExecutor {
    /// Create an executor from configuration.
    ///
    /// # Errors
    ///
    /// Fails if the token is missing or the HTTP client cannot be built.
    pub fn new(config: &DiscordConfig, limiter: SharedRateLimiter) -> DiscordResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .user_agent(config.user_agent())
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            bot_token: config.normalized_token().to_string(),
            limiter,
            redact_fields: config.redact_fields.clone(),
        })
    }

    /// Whether calls are gated by the shared limiter.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        self.limiter.is_enabled()
    }

    /// Rate limiter shared by every call.
    #[must_use]
    pub const fn limiter(&self) -> &SharedRateLimiter {
        &self.limiter
    }

    /// Send one request and return the raw response.
    ///
    /// Non-success statuses other than 429 are returned, not raised.
    ///
    /// # Errors
    ///
    /// - [`DiscordError::TooManyRequests`] on a 429 or an ongoing long backoff
    /// - [`DiscordError::RateLimitExhausted`] when the route's bucket is empty
    /// - [`DiscordError::RetriesExhausted`] when short waits keep failing
    /// - [`DiscordError::Http`] on transport failures
    pub async fn send(
        &self,
        method: ApiMethod,
        route: &str,
        body: Option<&Value>,
        authorization: Authorization<'_>,
    ) -> DiscordResult<ApiResponse> {
        let request_id = Uuid::new_v4().simple().to_string();
        let route = route.trim_start_matches('/');

        self.limiter.acquire(route, &request_id).await?;

        let url = format!("{}/{route}", self.base_url);
        let auth_value = match authorization {
            Authorization::Bot => format!("Bot {}", self.bot_token),
            Authorization::Bearer(token) => format!("Bearer {token}"),
        };

        let mut request = self
            .client
            .request(method.to_reqwest(), &url)
            .header(AUTHORIZATION, auth_value)
            .header(ACCEPT, "application/json");
        if self.limiter.policy().retry_after_unit == RetryAfterUnit::Milliseconds {
            request = request.header("X-RateLimit-Precision", "millisecond");
        }
        info!(request_id = %request_id, %method, url = %url, "Sending API request");

        if let Some(body) = body {
            debug!(
                request_id = %request_id,
                body = %self.redacted(body),
                "API request body"
            );
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let rate_limit = rate_limit_headers(response.headers());
        debug!(
            request_id = %request_id,
            status = status.as_u16(),
            headers = ?rate_limit,
            "API returned"
        );
        let body = response.text().await?;
        debug!(request_id = %request_id, body = %body, "API response body");

        if !status.is_success() {
            warn!(
                request_id = %request_id,
                status = status.as_u16(),
                body = %body,
                "API returned error status"
            );
        }

        self.limiter.observe_headers(&rate_limit, &request_id);

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(self.register_backoff(&body, &rate_limit, &request_id).await);
        }

        Ok(ApiResponse {
            status,
            body,
            rate_limit,
        })
    }

    /// Send a bot-authorized request and return its JSON body.
    ///
    /// Empty bodies and 404s naming an unknown member or role give `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Everything [`send`](Self::send) raises, plus [`DiscordError::Status`] for
    /// any other non-success status.
    pub async fn execute(
        &self,
        method: ApiMethod,
        route: &str,
        body: Option<&Value>,
    ) -> DiscordResult<Option<Value>> {
        let response = self.send(method, route, body, Authorization::Bot).await?;
        if response.is_unknown_target() {
            warn!(%method, route, "API reports unknown target");
            return Ok(None);
        }
        response.error_for_status()?.json_value()
    }

    /// [`execute`](Self::execute) with the method given by name.
    ///
    /// # Errors
    ///
    /// Returns [`DiscordError::InvalidMethod`] for anything but GET, POST, PUT,
    /// PATCH or DELETE, before any request is made.
    pub async fn call(
        &self,
        method: &str,
        route: &str,
        body: Option<&Value>,
    ) -> DiscordResult<Option<Value>> {
        self.execute(method.parse()?, route, body).await
    }

    /// Request body as it may be logged.
    fn redacted(&self, body: &Value) -> Value {
        redact_sensitive(body, &self.redact_fields)
    }

    /// Record the backoff a 429 demands and build the error to raise.
    ///
    /// The body's `retry_after` wins. Without one, the `Retry-After` and
    /// reset headers are used before the default backoff.
    async fn register_backoff(
        &self,
        body: &str,
        headers: &RateLimitHeaders,
        request_id: &str,
    ) -> DiscordError {
        let policy = self.limiter.policy();
        let retry_after = match (retry_after_value(body), headers.suggested_wait()) {
            (None, Some(wait)) => policy.padded(wait),
            (value, _) => policy.backoff_for(value),
        };
        match self.limiter.register_backoff(retry_after, request_id).await {
            Ok(_) => DiscordError::TooManyRequests { retry_after },
            Err(e) => e.into(),
        }
    }
}

/// `retry_after` from a 429 body, in the unit the API version uses.
fn retry_after_value(body: &str) -> Option<f64> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("retry_after")? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn rate_limit_headers(headers: &HeaderMap) -> RateLimitHeaders {
    RateLimitHeaders::from_pairs(headers.iter().filter_map(|(name, value)| {
        value
            .to_str()
            .ok()
            .map(|v| (name.as_str(), v.to_string()))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> ApiResponse {
        ApiResponse {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.to_string(),
            rate_limit: RateLimitHeaders::default(),
        }
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!("get".parse::<ApiMethod>().unwrap(), ApiMethod::Get);
        assert_eq!("PATCH".parse::<ApiMethod>().unwrap(), ApiMethod::Patch);
        assert!(matches!(
            "options".parse::<ApiMethod>(),
            Err(DiscordError::InvalidMethod(m)) if m == "options"
        ));
    }

    #[test]
    fn test_retry_after_value() {
        assert_eq!(retry_after_value(r#"{"retry_after": 3000}"#), Some(3000.0));
        assert_eq!(retry_after_value(r#"{"retry_after": 1.5}"#), Some(1.5));
        assert_eq!(retry_after_value(r#"{"retry_after": "250"}"#), Some(250.0));
        assert_eq!(retry_after_value(r#"{"retry_after": "soon"}"#), None);
        assert_eq!(retry_after_value(r#"{"message": "slow down"}"#), None);
        assert_eq!(retry_after_value("not json"), None);
    }

    #[test]
    fn test_rate_limit_headers_from_response() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", "0".parse().unwrap());
        headers.insert("x-ratelimit-reset-after", "2.5".parse().unwrap());
        headers.insert("retry-after", "3".parse().unwrap());

        let parsed = rate_limit_headers(&headers);
        assert_eq!(parsed.remaining, Some(0));
        assert_eq!(parsed.suggested_wait(), Some(std::time::Duration::from_secs(3)));
    }

    #[test]
    fn test_redacts_configured_fields() {
        let mut config = DiscordConfig::new("abc");
        config.redact_fields = vec!["nick".to_string()];
        let store = std::sync::Arc::new(guildsync_ratelimit::MemoryRateStore::new());
        let limiter = SharedRateLimiter::new(store, config.rate_limit.clone());
        let api = ApiRequestExecutor::new(&config, limiter).unwrap();

        let redacted = api.redacted(&serde_json::json!({"nick": "Bob", "roles": ["1"]}));
        assert_eq!(redacted["nick"], "[REDACTED]");
        assert_eq!(redacted["roles"], serde_json::json!(["1"]));
    }

    #[test]
    fn test_unknown_target_classification() {
        assert!(response(404, r#"{"code": 10007, "message": "Unknown Member"}"#).is_unknown_member());
        assert!(response(404, r#"{"code": 10011}"#).is_unknown_target());
        assert!(!response(404, r#"{"code": 10011}"#).is_unknown_member());
        assert!(!response(404, "Not Found").is_unknown_target());
        assert!(!response(400, r#"{"code": 10007}"#).is_unknown_target());
    }

    #[test]
    fn test_json_value_empty_body() {
        assert_eq!(response(204, "").json_value().unwrap(), None);
        assert_eq!(
            response(200, r#"{"id": "1"}"#).json_value().unwrap(),
            Some(serde_json::json!({"id": "1"}))
        );
    }

    #[test]
    fn test_error_for_status() {
        let err = response(403, r#"{"code": 50013, "message": "Missing Permissions"}"#)
            .error_for_status()
            .unwrap_err();
        match err {
            DiscordError::Status {
                status,
                message,
                code,
            } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Missing Permissions");
                assert_eq!(code, Some(50013));
            }
            other => panic!("expected Status, got {other:?}"),
        }

        let err = response(502, "Bad Gateway").error_for_status().unwrap_err();
        assert!(matches!(err, DiscordError::Status { status: 502, code: None, .. }));
    }
}
