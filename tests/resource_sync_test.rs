//! Resource synchronisation against a mock backend.
//!
//! Every reconciliation scenario runs on both record stores so the SQLite
//! transaction path and the sequential default behave the same.

mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::fixtures::{listing, requests_to};
use common::logger::TestLogger;
use finsync::core::{ApiResult, SyncReport};
use finsync::error::ApiErrorKind;
use finsync::models::{MessageContent, Provider, ResourceKind, Transaction};
use finsync::storage::{RecordQuery, RecordStore};
use finsync::test_utils::{
    TestSdk, TestStore, api_error_json, make_test_account, make_test_message, make_test_provider,
    make_test_transaction,
};

const PROVIDERS: &str = "/aggregation/providers";
const ACCOUNTS: &str = "/aggregation/accounts";
const TRANSACTIONS: &str = "/aggregation/transactions";
const MESSAGES: &str = "/messages";

const STORES: [TestStore; 2] = [TestStore::Sqlite, TestStore::Memory];

fn harness(server: &MockServer, store: TestStore) -> TestSdk {
    let harness = TestSdk::with(&server.uri(), store, |_| {});
    harness.seed_credentials("access-token-sync", "refresh-token-sync", 3600);
    harness
}

async fn serve(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn ids<T>(records: &[T], id: impl Fn(&T) -> i64) -> BTreeSet<i64> {
    records.iter().map(id).collect()
}

fn expect_report(result: ApiResult<SyncReport>) -> SyncReport {
    match result {
        ApiResult::Success(report) => report,
        other => panic!("expected a sync report, got {other:?}"),
    }
}

// =============================================================================
// Full listings
// =============================================================================

#[tokio::test]
async fn full_refresh_mirrors_remote_listing() {
    let log = TestLogger::new("full_refresh_mirrors_remote_listing");
    for store in STORES {
        log.phase(&format!("{store:?}"));
        let server = MockServer::start().await;
        let harness = harness(&server, store);
        let providers = harness.sdk.providers();

        serve(
            &server,
            PROVIDERS,
            listing(&[
                make_test_provider(1, "Bank One"),
                make_test_provider(2, "Bank Two"),
                make_test_provider(3, "Bank Three"),
            ]),
        )
        .await;
        let report = expect_report(providers.refresh_all().await);
        assert_eq!(report.resource, "providers");
        assert_eq!(report.parent_id, None);
        assert!(report.stale.is_empty());

        server.reset().await;
        let renamed = make_test_provider(2, "Bank Two Renamed");
        serve(
            &server,
            PROVIDERS,
            listing(&[renamed.clone(), make_test_provider(4, "Bank Four")]),
        )
        .await;
        let report = expect_report(providers.refresh_all().await);
        assert_eq!(report.stale, vec![1, 3]);
        assert_eq!(report.upserted.iter().copied().collect::<BTreeSet<_>>(), BTreeSet::from([2, 4]));

        let cached = providers.cached_all().unwrap();
        assert_eq!(ids(&cached, |p: &Provider| p.id), BTreeSet::from([2, 4]));
        assert_eq!(providers.cached(2).unwrap(), Some(renamed));
        assert_eq!(providers.cached(1).unwrap(), None);
    }
    log.finish_ok();
}

#[tokio::test]
async fn empty_listing_empties_the_family() {
    let log = TestLogger::new("empty_listing_empties_the_family");
    for store in STORES {
        let server = MockServer::start().await;
        let harness = harness(&server, store);
        let providers = harness.sdk.providers();

        serve(&server, PROVIDERS, listing(&[make_test_provider(1, "Bank One")])).await;
        expect_report(providers.refresh_all().await);

        server.reset().await;
        serve(&server, PROVIDERS, json!([])).await;
        let report = expect_report(providers.refresh_all().await);
        assert_eq!(report.stale, vec![1]);
        assert!(providers.cached_all().unwrap().is_empty(), "{store:?}");
    }
    log.finish_ok();
}

#[tokio::test]
async fn failed_listing_leaves_cache_unchanged() {
    let log = TestLogger::new("failed_listing_leaves_cache_unchanged");
    for store in STORES {
        let server = MockServer::start().await;
        let harness = harness(&server, store);
        let providers = harness.sdk.providers();

        serve(
            &server,
            PROVIDERS,
            listing(&[make_test_provider(1, "Bank One"), make_test_provider(2, "Bank Two")]),
        )
        .await;
        expect_report(providers.refresh_all().await);
        let before = harness.sdk.store().query(ResourceKind::Provider, &RecordQuery::all()).unwrap();

        server.reset().await;
        Mock::given(method("GET"))
            .and(path(PROVIDERS))
            .respond_with(ResponseTemplate::new(503).set_body_json(api_error_json("F9000", "maintenance")))
            .mount(&server)
            .await;
        let result = providers.refresh_all().await;
        assert_eq!(result.error().map(|e| e.kind), Some(ApiErrorKind::Server));

        server.reset().await;
        serve(&server, PROVIDERS, json!([{ "id": "not-a-number" }])).await;
        let result = providers.refresh_all().await;
        assert_eq!(result.error().map(|e| e.kind), Some(ApiErrorKind::Deserialization));

        let after = harness.sdk.store().query(ResourceKind::Provider, &RecordQuery::all()).unwrap();
        assert_eq!(before, after, "{store:?}");
    }
    log.finish_ok();
}

#[tokio::test]
async fn identical_listing_is_a_no_op() {
    let log = TestLogger::new("identical_listing_is_a_no_op");
    for store in STORES {
        let server = MockServer::start().await;
        let harness = harness(&server, store);
        let providers = harness.sdk.providers();
        serve(&server, PROVIDERS, listing(&[make_test_provider(1, "Bank One")])).await;

        expect_report(providers.refresh_all().await);
        let first = harness.sdk.store().get(ResourceKind::Provider, 1).unwrap().unwrap();
        let mut changes = harness.sdk.store().subscribe();

        tokio::time::sleep(Duration::from_millis(20)).await;
        expect_report(providers.refresh_all().await);
        let second = harness.sdk.store().get(ResourceKind::Provider, 1).unwrap().unwrap();

        assert_eq!(first.updated_at, second.updated_at, "{store:?}");
        assert!(changes.try_recv().is_err(), "{store:?} emitted a change for identical rows");
    }
    log.finish_ok();
}

// =============================================================================
// Scoped listings
// =============================================================================

#[tokio::test]
async fn scoped_refresh_touches_only_that_parent() {
    let log = TestLogger::new("scoped_refresh_touches_only_that_parent");
    for store in STORES {
        log.phase(&format!("{store:?}"));
        let server = MockServer::start().await;
        let harness = harness(&server, store);
        let transactions = harness.sdk.transactions();

        serve(
            &server,
            TRANSACTIONS,
            listing(&[
                make_test_transaction(100, 10, "-4.50"),
                make_test_transaction(101, 10, "-12.00"),
                make_test_transaction(200, 20, "-7.25"),
            ]),
        )
        .await;
        expect_report(transactions.refresh_all().await);

        server.reset().await;
        Mock::given(method("GET"))
            .and(path(TRANSACTIONS))
            .and(query_param("account_id", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(&[
                make_test_transaction(100, 10, "-4.50"),
                make_test_transaction(102, 10, "-3.10"),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let report = expect_report(transactions.refresh_all_in(10).await);
        assert_eq!(report.parent_id, Some(10));
        assert_eq!(report.stale, vec![101]);

        let cached = transactions.cached_all().unwrap();
        assert_eq!(
            ids(&cached, |t: &Transaction| t.id),
            BTreeSet::from([100, 102, 200]),
            "rows of account 20 survive"
        );
        let in_ten = transactions.cached_matching(&RecordQuery::in_parent(10)).unwrap();
        assert_eq!(ids(&in_ten, |t: &Transaction| t.id), BTreeSet::from([100, 102]));
    }
    log.finish_ok();
}

#[tokio::test]
async fn family_without_parent_rejects_scoped_refresh() {
    let log = TestLogger::new("family_without_parent_rejects_scoped_refresh");
    let server = MockServer::start().await;
    let harness = harness(&server, TestStore::Memory);

    let result = harness.sdk.providers().refresh_all_in(1).await;
    assert_eq!(result.error().map(|e| e.kind), Some(ApiErrorKind::Validation));
    assert!(requests_to(&server, PROVIDERS).await.is_empty());
    log.finish_ok();
}

// =============================================================================
// Single records
// =============================================================================

#[tokio::test]
async fn refresh_one_and_delete_one_update_the_cache() {
    let log = TestLogger::new("refresh_one_and_delete_one_update_the_cache");
    for store in STORES {
        let server = MockServer::start().await;
        let harness = harness(&server, store);
        let accounts = harness.sdk.accounts();
        let account = make_test_account(5, 3, "Everyday");

        serve(&server, &format!("{ACCOUNTS}/5"), json!(account)).await;
        Mock::given(method("DELETE"))
            .and(path(format!("{ACCOUNTS}/5")))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        match accounts.refresh_one(5).await {
            ApiResult::Success(fetched) => assert_eq!(fetched, account),
            other => panic!("refresh_one failed: {other:?}"),
        }
        assert_eq!(accounts.cached(5).unwrap(), Some(account));

        assert_eq!(accounts.delete_one(5).await, ApiResult::Success(()));
        assert_eq!(accounts.cached(5).unwrap(), None, "{store:?}");
    }
    log.finish_ok();
}

#[tokio::test]
async fn failed_delete_keeps_the_cached_record() {
    let log = TestLogger::new("failed_delete_keeps_the_cached_record");
    let server = MockServer::start().await;
    let harness = harness(&server, TestStore::Sqlite);
    let accounts = harness.sdk.accounts();

    serve(&server, ACCOUNTS, listing(&[make_test_account(5, 3, "Everyday")])).await;
    Mock::given(method("DELETE"))
        .and(path(format!("{ACCOUNTS}/5")))
        .respond_with(ResponseTemplate::new(404).set_body_json(api_error_json("F0300", "account not found")))
        .mount(&server)
        .await;

    expect_report(accounts.refresh_all().await);
    let result = accounts.delete_one(5).await;
    let err = result.error().expect("should fail");
    assert_eq!(err.kind, ApiErrorKind::NotFound);
    assert_eq!(err.message, "account not found");
    assert!(accounts.cached(5).unwrap().is_some());
    log.finish_ok();
}

// =============================================================================
// Messages
// =============================================================================

#[tokio::test]
async fn messages_decode_by_content_type() {
    let log = TestLogger::new("messages_decode_by_content_type");
    let server = MockServer::start().await;
    let harness = harness(&server, TestStore::Sqlite);
    let messages = harness.sdk.messages();

    serve(
        &server,
        MESSAGES,
        json!([
            make_test_message(1, "Welcome aboard"),
            {
                "id": 2,
                "title": "How budgets work",
                "content_type": "video",
                "content": { "url": "https://cdn.example/budgets.mp4", "width": 1280, "height": 720, "autoplay": true },
                "important": true
            }
        ]),
    )
    .await;
    expect_report(messages.refresh_all().await);

    let video = messages.cached(2).unwrap().expect("video message cached");
    match video.content {
        MessageContent::Video(content) => {
            assert_eq!(content.url, "https://cdn.example/budgets.mp4");
            assert_eq!(content.width, Some(1280));
            assert!(content.autoplay);
            assert!(!content.muted);
        }
        other => panic!("expected video content, got {other:?}"),
    }
    assert!(video.important);

    log.phase("unknown content type");
    server.reset().await;
    serve(
        &server,
        MESSAGES,
        json!([{ "id": 3, "content_type": "hologram", "content": {} }]),
    )
    .await;
    let result = messages.refresh_all().await;
    assert_eq!(result.error().map(|e| e.kind), Some(ApiErrorKind::Deserialization));
    assert_eq!(messages.cached_all().unwrap().len(), 2);
    log.finish_ok();
}

// =============================================================================
// Host flavours
// =============================================================================

#[tokio::test]
async fn live_query_follows_cache_changes() {
    let log = TestLogger::new("live_query_follows_cache_changes");
    for store in STORES {
        let server = MockServer::start().await;
        let harness = harness(&server, store);
        let providers = harness.sdk.providers();

        let mut live = providers.live(RecordQuery::all()).unwrap();
        assert!(live.borrow().is_empty());

        serve(
            &server,
            PROVIDERS,
            listing(&[make_test_provider(1, "Bank One"), make_test_provider(2, "Bank Two")]),
        )
        .await;
        serve(&server, MESSAGES, listing(&[make_test_message(9, "unrelated")])).await;
        expect_report(providers.refresh_all().await);

        tokio::time::timeout(Duration::from_secs(2), live.wait_for(|rows| rows.len() == 2))
            .await
            .expect("live view updated")
            .expect("live task alive");

        live.mark_unchanged();
        expect_report(harness.sdk.messages().refresh_all().await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!live.has_changed().unwrap(), "{store:?} woke for another family");

        server.reset().await;
        serve(&server, PROVIDERS, listing(&[make_test_provider(2, "Bank Two")])).await;
        expect_report(providers.refresh_all().await);
        let rows = tokio::time::timeout(
            Duration::from_secs(2),
            live.wait_for(|rows| rows.len() == 1),
        )
        .await
        .expect("live view updated")
        .expect("live task alive")
        .clone();
        assert_eq!(rows[0].id, 2);
    }
    log.finish_ok();
}

#[tokio::test]
async fn observe_refresh_all_starts_loading_then_settles() {
    let log = TestLogger::new("observe_refresh_all_starts_loading_then_settles");
    let server = MockServer::start().await;
    let harness = harness(&server, TestStore::Memory);
    serve(&server, PROVIDERS, listing(&[make_test_provider(1, "Bank One")])).await;

    let mut state = harness.sdk.providers().observe_refresh_all();
    assert!(state.borrow().is_loading());

    let settled = tokio::time::timeout(Duration::from_secs(2), state.wait_for(|s| !s.is_loading()))
        .await
        .expect("refresh settles")
        .expect("sender alive")
        .clone();
    let report = expect_report(settled);
    assert_eq!(report.upserted, vec![1]);
    log.finish_ok();
}

#[tokio::test]
async fn spawn_refresh_all_reports_through_completion() {
    let log = TestLogger::new("spawn_refresh_all_reports_through_completion");
    let server = MockServer::start().await;
    let harness = harness(&server, TestStore::Sqlite);
    Mock::given(method("GET"))
        .and(path(ACCOUNTS))
        .respond_with(ResponseTemplate::new(500).set_body_json(api_error_json("F9000", "internal error")))
        .mount(&server)
        .await;

    let (sender, receiver) = tokio::sync::oneshot::channel();
    let handle = harness.sdk.accounts().spawn_refresh_all(move |outcome| {
        let _ = sender.send(outcome);
    });
    handle.await.unwrap();

    let outcome = receiver.await.unwrap();
    let err = outcome.error().expect("should fail");
    assert_eq!(err.kind, ApiErrorKind::Server);
    assert_eq!(err.message, "internal error");
    log.finish_ok();
}
