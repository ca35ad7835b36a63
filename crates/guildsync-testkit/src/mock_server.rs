//! Mock HTTP server for testing API integrations.
//!
//! Wraps wiremock with helpers for the responses a chat API produces:
//! JSON bodies, empty `204`s, "unknown member" `404`s and `429` rejections.

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Error code carried by a 404 for an absent guild member.
pub const UNKNOWN_MEMBER_CODE: u32 = 10007;

/// Error code carried by a 404 for an absent role.
pub const UNKNOWN_ROLE_CODE: u32 = 10011;

/// A mock API server for testing HTTP integrations.
pub struct MockApiServer {
    server: MockServer,
}

fn json_response(status: u16, body: Value) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .set_body_json(body)
        .insert_header("content-type", "application/json")
}

impl MockApiServer {
    /// Start a new mock server.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Get the base URL of the mock server.
    #[must_use]
    pub fn base_url(&self) -> String {
        self.server.uri()
    }

    /// Get the underlying wiremock server for advanced configuration.
    #[must_use]
    pub const fn inner(&self) -> &MockServer {
        &self.server
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Response Setup
    // ─────────────────────────────────────────────────────────────────────────────

    /// Respond to `verb request_path` with `status` and a JSON body.
    pub async fn expect_json(&self, verb: &str, request_path: &str, status: u16, body: Value) {
        Mock::given(method(verb))
            .and(path(request_path))
            .respond_with(json_response(status, body))
            .mount(&self.server)
            .await;
    }

    /// Like [`expect_json`](Self::expect_json) but verified on drop to be hit
    /// exactly `times` times.
    pub async fn expect_json_times(
        &self,
        verb: &str,
        request_path: &str,
        status: u16,
        body: Value,
        times: u64,
    ) {
        Mock::given(method(verb))
            .and(path(request_path))
            .respond_with(json_response(status, body))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Expect a GET request to the given path and respond with JSON.
    pub async fn expect_get(&self, request_path: &str, body: Value) {
        self.expect_json("GET", request_path, 200, body).await;
    }

    /// Expect a POST request to the given path and respond with JSON.
    pub async fn expect_post(&self, request_path: &str, body: Value) {
        self.expect_json("POST", request_path, 200, body).await;
    }

    /// Respond with `status` and an empty body.
    pub async fn expect_status(&self, verb: &str, request_path: &str, status: u16) {
        Mock::given(method(verb))
            .and(path(request_path))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Respond with a 404 carrying the "unknown member" marker.
    pub async fn expect_unknown_member(&self, verb: &str, request_path: &str) {
        self.expect_json(
            verb,
            request_path,
            404,
            json!({"message": "Unknown Member", "code": UNKNOWN_MEMBER_CODE}),
        )
        .await;
    }

    /// Respond with a 404 carrying the "unknown role" marker.
    pub async fn expect_unknown_role(&self, verb: &str, request_path: &str) {
        self.expect_json(
            verb,
            request_path,
            404,
            json!({"message": "Unknown Role", "code": UNKNOWN_ROLE_CODE}),
        )
        .await;
    }

    /// Respond with a 429 whose body declares `retry_after`.
    pub async fn expect_rate_limited(&self, verb: &str, request_path: &str, retry_after: Value) {
        self.expect_json(
            verb,
            request_path,
            429,
            json!({
                "message": "You are being rate limited.",
                "retry_after": retry_after,
                "global": true
            }),
        )
        .await;
    }

    /// Respond with JSON and extra response headers.
    pub async fn expect_with_headers(
        &self,
        verb: &str,
        request_path: &str,
        body: Value,
        headers: &[(&str, &str)],
    ) {
        self.expect_status_with_headers(verb, request_path, 200, body, headers)
            .await;
    }

    /// Respond with `status`, a JSON body and extra response headers.
    pub async fn expect_status_with_headers(
        &self,
        verb: &str,
        request_path: &str,
        status: u16,
        body: Value,
        headers: &[(&str, &str)],
    ) {
        let mut template = json_response(status, body);
        for (name, value) in headers {
            template = template.insert_header(*name, *value);
        }
        Mock::given(method(verb))
            .and(path(request_path))
            .respond_with(template)
            .mount(&self.server)
            .await;
    }

    /// Respond only if the request carries `header_name: header_value`.
    pub async fn expect_with_header(
        &self,
        verb: &str,
        request_path: &str,
        header_name: &str,
        header_value: &str,
        body: Value,
    ) {
        Mock::given(method(verb))
            .and(path(request_path))
            .and(header(header_name, header_value))
            .respond_with(json_response(200, body))
            .mount(&self.server)
            .await;
    }

    /// Respond with JSON after a delay.
    pub async fn expect_delayed(&self, verb: &str, request_path: &str, delay: Duration, body: Value) {
        Mock::given(method(verb))
            .and(path(request_path))
            .respond_with(json_response(200, body).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Verification
    // ─────────────────────────────────────────────────────────────────────────────

    /// Verify that a specific number of requests were received.
    ///
    /// # Panics
    ///
    /// Panics if the count doesn't match.
    pub async fn assert_request_count(&self, expected: usize) {
        let received = self.received_requests().await;
        assert_eq!(
            received.len(),
            expected,
            "Expected {} requests but received {}: {:?}",
            expected,
            received.len(),
            received
                .iter()
                .map(|r| format!("{} {}", r.method, r.url.path()))
                .collect::<Vec<_>>()
        );
    }

    /// Verify that at least one request was received to the given path.
    ///
    /// # Panics
    ///
    /// Panics if no matching request was found.
    pub async fn assert_received(&self, request_path: &str) {
        let received = self.received_requests().await;
        let found = received.iter().any(|r| r.url.path() == request_path);
        assert!(
            found,
            "No request received to path '{}'. Received: {:?}",
            request_path,
            received.iter().map(|r| r.url.path()).collect::<Vec<_>>()
        );
    }

    /// Verify that no requests were received.
    ///
    /// # Panics
    ///
    /// Panics if any requests were received.
    pub async fn assert_no_requests(&self) {
        let received = self.received_requests().await;
        assert!(
            received.is_empty(),
            "Expected no requests but received {}",
            received.len()
        );
    }

    /// Get all received requests for manual inspection.
    pub async fn received_requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Requests received for `verb request_path`.
    pub async fn requests_to(&self, verb: &str, request_path: &str) -> Vec<Request> {
        self.received_requests()
            .await
            .into_iter()
            .filter(|r| r.method.as_str().eq_ignore_ascii_case(verb) && r.url.path() == request_path)
            .collect()
    }

    /// Number of requests received for `verb request_path`.
    pub async fn request_count_to(&self, verb: &str, request_path: &str) -> usize {
        self.requests_to(verb, request_path).await.len()
    }

    /// Reset the mock server, clearing mounted mocks and recorded requests.
    pub async fn reset(&self) {
        self.server.reset().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_get() {
        let mock = MockApiServer::start().await;
        mock.expect_get("/guilds/1", json!({"id": "1", "name": "Test"}))
            .await;

        let response = reqwest::get(format!("{}/guilds/1", mock.base_url()))
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["name"], "Test");
        mock.assert_received("/guilds/1").await;
    }

    #[tokio::test]
    async fn test_unknown_member() {
        let mock = MockApiServer::start().await;
        mock.expect_unknown_member("GET", "/guilds/1/members/2").await;

        let response = reqwest::get(format!("{}/guilds/1/members/2", mock.base_url()))
            .await
            .unwrap();

        assert_eq!(response.status(), 404);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], UNKNOWN_MEMBER_CODE);
    }

    #[tokio::test]
    async fn test_requests_to_filters_by_method() {
        let mock = MockApiServer::start().await;
        mock.expect_status("DELETE", "/guilds/1/roles/5", 204).await;
        mock.expect_get("/guilds/1/roles/5", json!({})).await;

        let client = reqwest::Client::new();
        let url = format!("{}/guilds/1/roles/5", mock.base_url());
        client.delete(&url).send().await.unwrap();
        client.get(&url).send().await.unwrap();

        assert_eq!(mock.request_count_to("DELETE", "/guilds/1/roles/5").await, 1);
        assert_eq!(mock.request_count_to("GET", "/guilds/1/roles/5").await, 1);
        mock.assert_request_count(2).await;
    }
}
