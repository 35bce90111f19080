//! Session handling against a mock backend.
//!
//! Covers the bearer interceptor, the shared refresh cycle, forced logout
//! and the login/logout lifecycle through the public SDK surface.

mod common;

use std::time::Duration;

use futures::future::join_all;
use serde_json::json;
use tracing::Level;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::fixtures::{
    TOKEN_PATH, bearer_of, forbid_token_requests, listing, mount_authorised_get, mount_expired_token,
    mount_refresh_grant, mount_rejected_grant, requests_to,
};
use common::logger::TestLogger;
use finsync::core::{ApiResult, SessionEvent};
use finsync::error::{ApiErrorKind, AuthFailure};
use finsync::test_utils::{
    TestSdk, TestStore, api_error_json, make_test_provider, token_grant_json,
};

const PROVIDERS: &str = "/aggregation/providers";

const ACCESS_OLD: &str = "access-token-alpha";
const REFRESH_OLD: &str = "refresh-token-alpha";
const ACCESS_NEW: &str = "access-token-bravo";
const REFRESH_NEW: &str = "refresh-token-bravo";

fn auth_kind(reason: AuthFailure) -> ApiErrorKind {
    ApiErrorKind::Authentication(reason)
}

// =============================================================================
// Shared refresh
// =============================================================================

#[tokio::test]
async fn concurrent_unauthorized_requests_share_one_refresh() {
    let (log, capture) = TestLogger::with_capture("concurrent_unauthorized_requests_share_one_refresh");
    let server = MockServer::start().await;
    let harness = TestSdk::new(&server.uri());
    harness.seed_credentials(ACCESS_OLD, REFRESH_OLD, 3600);

    log.phase("mount");
    mount_expired_token(&server, PROVIDERS, ACCESS_OLD).await;
    mount_authorised_get(&server, PROVIDERS, ACCESS_NEW, &listing(&[make_test_provider(1, "Bank One")])).await;
    mount_refresh_grant(
        &server,
        REFRESH_OLD,
        ACCESS_NEW,
        REFRESH_NEW,
        Duration::from_millis(200),
        1,
    )
    .await;

    log.phase("fire");
    let calls = (0..8).map(|_| {
        let providers = harness.sdk.providers();
        async move { providers.refresh_all().await }
    });
    let results = join_all(calls).await;

    log.phase("verify");
    for result in &results {
        assert!(result.is_success(), "expected success, got {result:?}");
    }
    assert_eq!(harness.sdk.refresh_count(), 1);
    assert_eq!(harness.sdk.tokens().access_token().as_deref(), Some(ACCESS_NEW));
    assert_eq!(harness.sdk.tokens().refresh_token().as_deref(), Some(REFRESH_NEW));

    let requests = requests_to(&server, PROVIDERS).await;
    let retried = requests
        .iter()
        .filter(|r| bearer_of(r).as_deref() == Some(ACCESS_NEW))
        .count();
    assert_eq!(retried, 8, "every caller replays with the new token");
    assert_eq!(requests.len(), 16);
    assert_eq!(requests_to(&server, TOKEN_PATH).await.len(), 1);

    capture.assert_logged_at(Level::INFO, "Access token refreshed");
    log.finish_ok();
}

#[tokio::test]
async fn every_family_expiring_at_once_shares_one_refresh() {
    let log = TestLogger::new("every_family_expiring_at_once_shares_one_refresh");
    let server = MockServer::start().await;
    let harness = TestSdk::with(&server.uri(), TestStore::Memory, |_| {});
    harness.seed_credentials(ACCESS_OLD, REFRESH_OLD, 3600);

    let empty = listing::<finsync::models::Provider>(&[]);
    for route in [
        PROVIDERS,
        "/aggregation/provideraccounts",
        "/aggregation/accounts",
        "/aggregation/transactions",
        "/messages",
    ] {
        mount_expired_token(&server, route, ACCESS_OLD).await;
        mount_authorised_get(&server, route, ACCESS_NEW, &empty).await;
    }
    mount_refresh_grant(
        &server,
        REFRESH_OLD,
        ACCESS_NEW,
        REFRESH_NEW,
        Duration::from_millis(200),
        1,
    )
    .await;

    let outcomes = harness.sdk.refresh_all_families().await;
    assert_eq!(outcomes.len(), 5);
    assert!(outcomes.iter().all(ApiResult::is_success), "{outcomes:?}");
    assert_eq!(harness.sdk.refresh_count(), 1);
    log.finish_ok();
}

#[tokio::test]
async fn missing_credentials_fail_without_contacting_token_endpoint() {
    let log = TestLogger::new("missing_credentials_fail_without_contacting_token_endpoint");
    let server = MockServer::start().await;
    let harness = TestSdk::new(&server.uri());
    let mut events = harness.sdk.session_events();

    Mock::given(method("GET"))
        .and(path(PROVIDERS))
        .respond_with(ResponseTemplate::new(401).set_body_json(api_error_json("F0101", "no token")))
        .mount(&server)
        .await;
    forbid_token_requests(&server).await;

    let result = harness.sdk.providers().refresh_all().await;
    let err = result.error().expect("should fail");
    assert_eq!(err.kind, auth_kind(AuthFailure::MissingRefreshToken));
    assert_eq!(err.status, Some(401));

    let request = &requests_to(&server, PROVIDERS).await[0];
    assert_eq!(bearer_of(request), None);
    assert_eq!(
        events.try_recv().expect("forced logout event"),
        SessionEvent::ReauthenticationRequired {
            reason: AuthFailure::MissingRefreshToken
        }
    );
    assert_eq!(harness.sdk.refresh_count(), 0);
    log.finish_ok();
}

#[tokio::test]
async fn rejected_refresh_fails_every_waiter_and_ends_session() {
    let (log, capture) = TestLogger::with_capture("rejected_refresh_fails_every_waiter_and_ends_session");
    let server = MockServer::start().await;
    let harness = TestSdk::new(&server.uri());
    harness.seed_credentials(ACCESS_OLD, REFRESH_OLD, 3600);
    let mut events = harness.sdk.session_events();

    mount_expired_token(&server, PROVIDERS, ACCESS_OLD).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(api_error_json("F0110", "refresh token revoked"))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    log.phase("fire");
    let calls = (0..4).map(|_| {
        let providers = harness.sdk.providers();
        async move { providers.refresh_all().await }
    });
    let results = join_all(calls).await;

    log.phase("verify");
    for result in &results {
        let err = result.error().expect("every waiter fails");
        assert_eq!(err.kind, auth_kind(AuthFailure::InvalidRefreshToken));
    }
    assert!(!harness.sdk.is_authenticated());
    assert!(!harness.config.credentials_path.exists());
    assert_eq!(
        events.try_recv().expect("forced logout event"),
        SessionEvent::ReauthenticationRequired {
            reason: AuthFailure::InvalidRefreshToken
        }
    );
    assert!(events.try_recv().is_err(), "one forced logout per failed cycle");
    assert!(harness.sdk.providers().cached_all().unwrap().is_empty());

    capture.assert_logged_at(Level::WARN, "reauthentication required");
    log.finish_ok();
}

#[tokio::test]
async fn refresh_endpoint_network_failure_ends_session() {
    let log = TestLogger::new("refresh_endpoint_network_failure_ends_session");
    let server = MockServer::start().await;
    let harness = TestSdk::with(&server.uri(), TestStore::Memory, |c| {
        c.api.token_url = Some("http://127.0.0.1:1/oauth/token".to_string());
    });
    harness.seed_credentials(ACCESS_OLD, REFRESH_OLD, 3600);

    mount_expired_token(&server, PROVIDERS, ACCESS_OLD).await;

    let result = harness.sdk.providers().refresh_all().await;
    let err = result.error().expect("should fail");
    assert_eq!(err.kind, ApiErrorKind::Network);
    assert!(!harness.sdk.is_authenticated());
    log.finish_ok();
}

#[tokio::test]
async fn token_near_expiry_is_refreshed_before_sending() {
    let log = TestLogger::new("token_near_expiry_is_refreshed_before_sending");
    let server = MockServer::start().await;
    let harness = TestSdk::new(&server.uri());
    harness.seed_credentials(ACCESS_OLD, REFRESH_OLD, 30);

    mount_refresh_grant(&server, REFRESH_OLD, ACCESS_NEW, REFRESH_NEW, Duration::ZERO, 1).await;
    mount_authorised_get(&server, PROVIDERS, ACCESS_NEW, &listing(&[make_test_provider(2, "Bank Two")])).await;

    let result = harness.sdk.providers().refresh_all().await;
    assert!(result.is_success(), "{result:?}");

    let requests = requests_to(&server, PROVIDERS).await;
    assert_eq!(requests.len(), 1, "old token is never sent");
    assert_eq!(bearer_of(&requests[0]).as_deref(), Some(ACCESS_NEW));
    log.finish_ok();
}

#[tokio::test]
async fn zero_leeway_sends_expiring_token_as_is() {
    let log = TestLogger::new("zero_leeway_sends_expiring_token_as_is");
    let server = MockServer::start().await;
    let harness = TestSdk::with(&server.uri(), TestStore::Sqlite, |c| {
        c.auth.refresh_leeway_seconds = 0;
    });
    harness.seed_credentials(ACCESS_OLD, REFRESH_OLD, 30);

    forbid_token_requests(&server).await;
    mount_authorised_get(&server, PROVIDERS, ACCESS_OLD, &listing::<finsync::models::Provider>(&[])).await;

    assert!(harness.sdk.providers().refresh_all().await.is_success());
    log.finish_ok();
}

#[tokio::test]
async fn short_lived_refreshed_token_is_not_refreshed_again() {
    let log = TestLogger::new("short_lived_refreshed_token_is_not_refreshed_again");
    let server = MockServer::start().await;
    let harness = TestSdk::new(&server.uri());
    harness.seed_credentials(ACCESS_OLD, REFRESH_OLD, 30);

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_grant_json(ACCESS_NEW, REFRESH_NEW, 5)))
        .expect(1)
        .mount(&server)
        .await;
    mount_authorised_get(&server, PROVIDERS, ACCESS_NEW, &listing(&[make_test_provider(2, "Bank Two")])).await;

    log.phase("execute");
    for _ in 0..3 {
        let result = harness.sdk.providers().refresh_all().await;
        assert!(result.is_success(), "{result:?}");
    }

    log.phase("verify");
    assert_eq!(harness.sdk.refresh_count(), 1);
    for request in requests_to(&server, PROVIDERS).await {
        assert_eq!(bearer_of(&request).as_deref(), Some(ACCESS_NEW));
    }
    log.finish_ok();
}

// =============================================================================
// Final responses
// =============================================================================

#[tokio::test]
async fn forbidden_is_returned_untouched() {
    let log = TestLogger::new("forbidden_is_returned_untouched");
    let server = MockServer::start().await;
    let harness = TestSdk::new(&server.uri());
    harness.seed_credentials(ACCESS_OLD, REFRESH_OLD, 3600);

    Mock::given(method("GET"))
        .and(path(PROVIDERS))
        .respond_with(ResponseTemplate::new(403).set_body_json(api_error_json("F1001", "not allowed")))
        .expect(1)
        .mount(&server)
        .await;
    forbid_token_requests(&server).await;

    let result = harness.sdk.providers().refresh_all().await;
    let err = result.error().expect("should fail");
    assert_eq!(err.kind, ApiErrorKind::Authorization);
    assert_eq!(err.message, "not allowed");
    assert_eq!(harness.sdk.tokens().access_token().as_deref(), Some(ACCESS_OLD));
    log.finish_ok();
}

#[tokio::test]
async fn second_unauthorized_is_final_and_keeps_new_tokens() {
    let (log, capture) = TestLogger::with_capture("second_unauthorized_is_final_and_keeps_new_tokens");
    let server = MockServer::start().await;
    let harness = TestSdk::new(&server.uri());
    harness.seed_credentials(ACCESS_OLD, REFRESH_OLD, 3600);

    mount_expired_token(&server, PROVIDERS, ACCESS_OLD).await;
    mount_expired_token(&server, PROVIDERS, ACCESS_NEW).await;
    mount_refresh_grant(&server, REFRESH_OLD, ACCESS_NEW, REFRESH_NEW, Duration::ZERO, 1).await;

    let result = harness.sdk.providers().refresh_all().await;
    let err = result.error().expect("should fail");
    assert_eq!(err.kind, auth_kind(AuthFailure::InvalidAccessToken));
    assert_eq!(requests_to(&server, PROVIDERS).await.len(), 2);
    assert_eq!(harness.sdk.refresh_count(), 1);
    assert_eq!(harness.sdk.tokens().access_token().as_deref(), Some(ACCESS_NEW));

    capture.assert_logged_at(Level::WARN, "unauthorized after token refresh");
    log.finish_ok();
}

#[tokio::test]
async fn slow_refresh_times_out_waiters_but_still_lands() {
    let log = TestLogger::new("slow_refresh_times_out_waiters_but_still_lands");
    let server = MockServer::start().await;
    let harness = TestSdk::with(&server.uri(), TestStore::Memory, |c| {
        c.auth.refresh_wait_timeout_seconds = Some(1);
    });
    harness.seed_credentials(ACCESS_OLD, REFRESH_OLD, 3600);
    let mut events = harness.sdk.session_events();

    mount_expired_token(&server, PROVIDERS, ACCESS_OLD).await;
    mount_refresh_grant(
        &server,
        REFRESH_OLD,
        ACCESS_NEW,
        REFRESH_NEW,
        Duration::from_secs(2),
        1,
    )
    .await;

    log.phase("wait");
    let result = harness.sdk.providers().refresh_all().await;
    let err = result.error().expect("waiter gives up");
    assert_eq!(err.kind, ApiErrorKind::Timeout);
    assert_eq!(harness.sdk.tokens().access_token().as_deref(), Some(ACCESS_OLD));

    log.phase("settle");
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(harness.sdk.tokens().access_token().as_deref(), Some(ACCESS_NEW));
    assert!(matches!(
        events.try_recv().expect("refresh event"),
        SessionEvent::TokenRefreshed { .. }
    ));
    log.finish_ok();
}

// =============================================================================
// Login / logout
// =============================================================================

#[tokio::test]
async fn login_stores_tokens_without_sending_a_bearer() {
    let log = TestLogger::new("login_stores_tokens_without_sending_a_bearer");
    let server = MockServer::start().await;
    let harness = TestSdk::new(&server.uri());
    harness.seed_credentials(ACCESS_OLD, REFRESH_OLD, 3600);
    let mut events = harness.sdk.session_events();

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_partial_json(json!({
            "grant_type": "password",
            "username": "casey@example.com",
            "password": "hunter-two-secret",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_grant_json(ACCESS_NEW, REFRESH_NEW, 1800)))
        .expect(1)
        .mount(&server)
        .await;

    let expires_at = match harness.sdk.login("casey@example.com", "hunter-two-secret").await {
        ApiResult::Success(expires_at) => expires_at,
        other => panic!("login failed: {other:?}"),
    };

    let request = &requests_to(&server, TOKEN_PATH).await[0];
    assert_eq!(bearer_of(request), None);
    assert_eq!(harness.sdk.tokens().access_token().as_deref(), Some(ACCESS_NEW));
    assert_eq!(harness.sdk.tokens().expires_at(), Some(expires_at));
    assert_eq!(
        events.try_recv().expect("login event"),
        SessionEvent::LoggedIn { expires_at }
    );
    log.finish_ok();
}

#[tokio::test]
async fn login_with_bad_credentials_stores_nothing() {
    let log = TestLogger::new("login_with_bad_credentials_stores_nothing");
    let server = MockServer::start().await;
    let harness = TestSdk::new(&server.uri());
    let mut events = harness.sdk.session_events();

    mount_rejected_grant(&server, 401, "F0111", 1).await;

    let result = harness.sdk.login("casey@example.com", "wrong-password").await;
    let err = result.error().expect("should fail");
    assert_eq!(err.kind, auth_kind(AuthFailure::InvalidCredentials));
    assert!(!harness.sdk.is_authenticated());
    assert!(!harness.config.credentials_path.exists());
    assert!(events.try_recv().is_err());
    log.finish_ok();
}

#[tokio::test]
async fn logout_clears_tokens_and_cache() {
    let log = TestLogger::new("logout_clears_tokens_and_cache");
    let server = MockServer::start().await;
    let harness = TestSdk::new(&server.uri());
    harness.seed_credentials(ACCESS_OLD, REFRESH_OLD, 3600);
    mount_authorised_get(&server, PROVIDERS, ACCESS_OLD, &listing(&[make_test_provider(1, "Bank One")])).await;

    assert!(harness.sdk.providers().refresh_all().await.is_success());
    assert_eq!(harness.sdk.providers().cached_all().unwrap().len(), 1);
    let mut events = harness.sdk.session_events();

    harness.sdk.logout().unwrap();

    assert!(!harness.sdk.is_authenticated());
    assert!(!harness.config.credentials_path.exists());
    assert!(harness.sdk.providers().cached_all().unwrap().is_empty());
    assert_eq!(events.try_recv().unwrap(), SessionEvent::LoggedOut);
    log.finish_ok();
}

#[tokio::test]
async fn token_material_never_reaches_logs() {
    let (log, capture) = TestLogger::with_capture("token_material_never_reaches_logs");
    let server = MockServer::start().await;
    let harness = TestSdk::new(&server.uri());

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_partial_json(json!({ "grant_type": "password" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_grant_json(ACCESS_OLD, REFRESH_OLD, 3600)))
        .mount(&server)
        .await;
    mount_expired_token(&server, PROVIDERS, ACCESS_OLD).await;
    mount_refresh_grant(&server, REFRESH_OLD, ACCESS_NEW, REFRESH_NEW, Duration::ZERO, 1).await;
    mount_authorised_get(&server, PROVIDERS, ACCESS_NEW, &listing(&[make_test_provider(1, "Bank One")])).await;

    assert!(harness.sdk.login("casey@example.com", "hunter-two-secret").await.is_success());
    assert!(harness.sdk.providers().refresh_all().await.is_success());
    harness.sdk.logout().unwrap();

    for secret in [ACCESS_OLD, REFRESH_OLD, ACCESS_NEW, REFRESH_NEW, "hunter-two-secret"] {
        capture.assert_never_logged(secret);
    }
    capture.assert_logged("Logged in");
    capture.assert_logged("Logged out");
    log.finish_ok();
}
