//! Mock backend fixtures shared by the integration tests.
#![allow(dead_code)]

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use finsync::test_utils::{api_error_json, token_grant_json};

pub const TOKEN_PATH: &str = "/oauth/token";

/// Expect exactly `calls` refresh grants for `refresh_token`, answering with a new pair.
pub async fn mount_refresh_grant(
    server: &MockServer,
    refresh_token: &str,
    new_access: &str,
    new_refresh: &str,
    delay: Duration,
    calls: u64,
) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_partial_json(serde_json::json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_grant_json(new_access, new_refresh, 3600))
                .set_delay(delay),
        )
        .expect(calls)
        .mount(server)
        .await;
}

/// Expect exactly `calls` token requests, each rejected with `status` and `code`.
pub async fn mount_rejected_grant(server: &MockServer, status: u16, code: &str, calls: u64) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_json(api_error_json(code, "rejected")))
        .expect(calls)
        .mount(server)
        .await;
}

/// Forbid any token request.
pub async fn forbid_token_requests(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(server)
        .await;
}

/// `GET route` authorised with `token` answers 200 with `body`.
pub async fn mount_authorised_get<T: Serialize>(server: &MockServer, route: &str, token: &str, body: &T) {
    Mock::given(method("GET"))
        .and(path(route))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// `GET route` authorised with `token` answers 401 with the expired-token code.
pub async fn mount_expired_token(server: &MockServer, route: &str, token: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(api_error_json("F0101", "access token expired")),
        )
        .mount(server)
        .await;
}

/// Bearer token carried by a recorded request.
pub fn bearer_of(request: &Request) -> Option<String> {
    request
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Requests received for `route`, in arrival order.
pub async fn requests_to(server: &MockServer, route: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == route)
        .collect()
}

/// JSON array body for a listing.
pub fn listing<T: Serialize>(records: &[T]) -> Value {
    serde_json::to_value(records).unwrap()
}
