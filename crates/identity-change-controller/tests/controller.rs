mod common;

use common::*;
use cookie_sync_client::{CookieSyncError, SyncEndpoint};
use identity_change_controller::{
    sync_handler_fn, ControllerConfig, ControllerPhase, CycleFailure, IdentityChangeController,
    SyncError,
};
use identity_claims::{AuthUser, IdentityError, InMemoryIdentityProvider, ProviderUser};
use parking_lot::Mutex;
use serde_json::{json, Map};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount(server: &MockServer, endpoint: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(endpoint))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn signed_in_user_is_published_and_logged_in() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .and(header("authorization", "token-u1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let provider = Arc::new(InMemoryIdentityProvider::new());
    let controller = controller_for(&server, provider.clone());
    let mut rx = controller.watch();
    let _subscription = controller.subscribe(|_| {}).unwrap();

    provider.sign_in(
        ProviderUser::with_static_token("u1", "token-u1"),
        claims(json!({ "iss": "x", "role": "admin" })),
    );

    let snapshot = wait_until(&mut rx, |s| s.auth_request_completed).await;
    assert_eq!(snapshot.user().and_then(|u| u.id()), Some("u1"));
    assert_eq!(snapshot.claims().clone().into_inner(), claims(json!({ "role": "admin" })));
    assert!(snapshot.initialized());
    assert_eq!(controller.phase(), ControllerPhase::Idle);
}

#[tokio::test]
async fn signed_out_user_logs_out_without_auth_header() {
    let server = MockServer::start().await;
    mount(&server, "/api/logout", ResponseTemplate::new(200)).await;

    let provider = Arc::new(InMemoryIdentityProvider::new());
    let controller = controller_for(&server, provider.clone());
    let mut rx = controller.watch();
    let _subscription = controller.subscribe(|_| {}).unwrap();

    provider.sign_out();

    let snapshot = wait_until(&mut rx, |s| s.auth_request_completed).await;
    assert!(snapshot.user().is_none());
    assert!(snapshot.claims().is_empty());
    assert!(snapshot.initialized());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.path(), "/api/logout");
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn rejected_login_is_reported_and_never_completes() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/api/login",
        ResponseTemplate::new(401).set_body_json(json!({ "error": "Unauthorized" })),
    )
    .await;

    let provider = Arc::new(InMemoryIdentityProvider::new());
    let controller = controller_for(&server, provider.clone());
    let mut failures = controller.take_failures().unwrap();
    let _subscription = controller.subscribe(|_| {}).unwrap();

    provider.sign_in(ProviderUser::with_static_token("u1", "bad-token"), Map::new());

    match next_failure(&mut failures).await {
        CycleFailure::Sync {
            cycle,
            source:
                SyncError::Cookie(CookieSyncError::Endpoint {
                    endpoint,
                    status,
                    body,
                }),
        } => {
            assert_eq!(cycle, 1);
            assert_eq!(endpoint, SyncEndpoint::Login);
            assert_eq!(status, 401);
            assert_eq!(body, json!({ "error": "Unauthorized" }));
        }
        other => panic!("unexpected failure: {other:?}"),
    }

    let snapshot = controller.snapshot();
    assert!(!snapshot.auth_request_completed);
    assert!(snapshot.initialized());
    assert_eq!(controller.phase(), ControllerPhase::Failed);
}

#[tokio::test]
async fn teardown_during_pending_login_discards_result() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/api/login",
        ResponseTemplate::new(200).set_delay(Duration::from_millis(300)),
    )
    .await;

    let provider = Arc::new(InMemoryIdentityProvider::new());
    let controller = controller_for(&server, provider.clone());
    let recorder = Recorder::default();
    let mut rx = controller.watch();
    let mut subscription = controller.subscribe(recorder.callback()).unwrap();

    provider.sign_in(ProviderUser::with_static_token("u1", "t1"), Map::new());
    wait_until(&mut rx, |s| s.initialized()).await;

    subscription.unsubscribe();
    let before = controller.snapshot();
    let published = recorder.snapshots().len();

    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(controller.snapshot(), before);
    assert!(!controller.snapshot().auth_request_completed);
    assert_eq!(recorder.snapshots().len(), published);
    assert_eq!(controller.phase(), ControllerPhase::TornDown);
}

#[tokio::test]
async fn teardown_detaches_from_provider() {
    let server = MockServer::start().await;
    let provider = Arc::new(InMemoryIdentityProvider::new());
    let controller = controller_for(&server, provider.clone());

    let subscription = controller.subscribe(|_| {}).unwrap();
    assert_eq!(provider.listener_count(), 1);
    drop(subscription);

    for _ in 0..50 {
        if provider.listener_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(provider.listener_count(), 0);

    provider.sign_out();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!controller.snapshot().initialized());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn last_event_wins_when_later_tail_settles_first() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/api/login",
        ResponseTemplate::new(200).set_delay(Duration::from_millis(300)),
    )
    .await;
    mount(&server, "/api/logout", ResponseTemplate::new(200)).await;

    let provider = Arc::new(InMemoryIdentityProvider::new());
    let controller = controller_for(&server, provider.clone());
    let mut rx = controller.watch();
    let _subscription = controller.subscribe(|_| {}).unwrap();

    // The session stays in place so the first cycle can read its claims
    provider.sign_in(ProviderUser::with_static_token("u1", "t1"), Map::new());
    provider.emit(None);

    let snapshot = wait_until(&mut rx, |s| s.auth_request_completed).await;
    assert!(snapshot.user().is_none());

    // The superseded login settles later without changing anything
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    let snapshot = controller.snapshot();
    assert!(snapshot.user().is_none());
    assert!(snapshot.auth_request_completed);
}

#[tokio::test]
async fn superseded_tail_does_not_complete_latest_cycle() {
    let server = MockServer::start().await;
    mount(&server, "/api/login", ResponseTemplate::new(200)).await;
    mount(
        &server,
        "/api/logout",
        ResponseTemplate::new(200).set_delay(Duration::from_millis(400)),
    )
    .await;

    let provider = Arc::new(InMemoryIdentityProvider::new());
    let controller = controller_for(&server, provider.clone());
    let mut rx = controller.watch();
    let _subscription = controller.subscribe(|_| {}).unwrap();

    provider.sign_in(ProviderUser::with_static_token("u1", "t1"), Map::new());
    provider.emit(None);

    // Login has settled by now; logout is still pending
    tokio::time::sleep(Duration::from_millis(150)).await;
    let snapshot = controller.snapshot();
    assert!(snapshot.user().is_none());
    assert!(!snapshot.auth_request_completed);

    let snapshot = wait_until(&mut rx, |s| s.auth_request_completed).await;
    assert!(snapshot.user().is_none());
}

#[tokio::test]
async fn sign_out_during_claim_fetch_still_publishes_observed_user() {
    let server = MockServer::start().await;
    mount(&server, "/api/login", ResponseTemplate::new(200)).await;
    mount(&server, "/api/logout", ResponseTemplate::new(200)).await;

    let provider = Arc::new(
        InMemoryIdentityProvider::new().with_claims_latency(Duration::from_millis(200)),
    );
    let controller = controller_for(&server, provider.clone());
    let mut failures = controller.take_failures().unwrap();
    let recorder = Recorder::default();
    let mut rx = controller.watch();
    let _subscription = controller.subscribe(recorder.callback()).unwrap();

    provider.sign_in(
        ProviderUser::with_static_token("u1", "t1"),
        claims(json!({ "iss": "x", "role": "admin" })),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    provider.sign_out();

    let snapshot = wait_until(&mut rx, |s| s.auth_request_completed && s.user().is_none()).await;
    assert!(snapshot.claims().is_empty());
    assert!(snapshot.initialized());

    let observed = recorder
        .snapshots()
        .into_iter()
        .find(|s| s.user().and_then(|u| u.id()) == Some("u1"))
        .expect("u1 was never published");
    assert_eq!(observed.claims().get("role"), Some(&json!("admin")));
    assert!(observed.claims().get("iss").is_none());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(failures.try_recv().is_err());
    let paths: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect();
    assert!(paths.contains(&"/api/login".to_string()));
    assert!(paths.contains(&"/api/logout".to_string()));
}

#[tokio::test]
async fn empty_uid_is_synced_as_signed_out() {
    let server = MockServer::start().await;
    mount(&server, "/api/logout", ResponseTemplate::new(200)).await;

    let provider = Arc::new(InMemoryIdentityProvider::new());
    let controller = controller_for(&server, provider.clone());
    let mut rx = controller.watch();
    let _subscription = controller.subscribe(|_| {}).unwrap();

    provider.sign_in(
        ProviderUser::with_static_token("", "t"),
        claims(json!({ "role": "admin" })),
    );

    let snapshot = wait_until(&mut rx, |s| s.auth_request_completed).await;
    assert!(snapshot.user().is_none());
    assert!(snapshot.claims().is_empty());
    assert!(snapshot.initialized());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.path(), "/api/logout");
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn completion_resets_before_user_info_is_published() {
    let server = MockServer::start().await;
    mount(&server, "/api/login", ResponseTemplate::new(200)).await;
    mount(&server, "/api/logout", ResponseTemplate::new(200)).await;

    let provider = Arc::new(InMemoryIdentityProvider::new());
    let controller = controller_for(&server, provider.clone());
    let recorder = Recorder::default();
    let mut rx = controller.watch();
    let _subscription = controller.subscribe(recorder.callback()).unwrap();

    provider.sign_in(ProviderUser::with_static_token("u1", "t1"), Map::new());
    wait_until(&mut rx, |s| s.auth_request_completed && s.user().is_some()).await;

    provider.sign_out();
    wait_until(&mut rx, |s| s.auth_request_completed && s.user().is_none()).await;

    let snapshots = recorder.snapshots();
    assert_eq!(snapshots.len(), 6);

    // First cycle: reset, user info, completion
    assert!(!snapshots[0].initialized() && !snapshots[0].auth_request_completed);
    assert!(snapshots[1].initialized() && !snapshots[1].auth_request_completed);
    assert!(snapshots[2].auth_request_completed);

    // Second cycle resets completion while the previous user is still shown
    assert!(!snapshots[3].auth_request_completed);
    assert!(snapshots[3].user().is_some());
    assert!(snapshots[4].user().is_none() && !snapshots[4].auth_request_completed);
    assert!(snapshots[5].auth_request_completed);

    // Initialized never reverts
    assert!(snapshots[1..].iter().all(|s| s.initialized()));
}

#[tokio::test]
async fn claim_fetch_failure_skips_cycle_and_keeps_listening() {
    let server = MockServer::start().await;
    mount(&server, "/api/logout", ResponseTemplate::new(200)).await;

    let provider = Arc::new(InMemoryIdentityProvider::new());
    let controller = controller_for(&server, provider.clone());
    let mut failures = controller.take_failures().unwrap();
    let mut rx = controller.watch();
    let _subscription = controller.subscribe(|_| {}).unwrap();

    // Signing out before the first cycle reads claims leaves no session
    provider.sign_in(ProviderUser::with_static_token("u1", "t1"), Map::new());
    provider.sign_out();

    match next_failure(&mut failures).await {
        CycleFailure::ClaimFetch { cycle, source } => {
            assert_eq!(cycle, 1);
            assert!(matches!(source, IdentityError::NoCurrentSession));
        }
        other => panic!("unexpected failure: {other:?}"),
    }

    let snapshot = wait_until(&mut rx, |s| s.auth_request_completed).await;
    assert!(snapshot.user().is_none());
    assert!(snapshot.initialized());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.path(), "/api/logout");
}

#[tokio::test]
async fn first_claim_failure_leaves_controller_uninitialized() {
    let server = MockServer::start().await;
    let provider = Arc::new(InMemoryIdentityProvider::new());
    let controller = controller_for(&server, provider.clone());
    let mut failures = controller.take_failures().unwrap();
    let _subscription = controller.subscribe(|_| {}).unwrap();

    // Event without a session behind it
    provider.emit(Some(ProviderUser::with_static_token("u1", "t1")));

    assert!(matches!(
        next_failure(&mut failures).await,
        CycleFailure::ClaimFetch { .. }
    ));
    assert!(!controller.snapshot().initialized());
    assert_eq!(controller.phase(), ControllerPhase::Failed);
}

#[tokio::test]
async fn custom_handler_replaces_cookie_endpoints() {
    let server = MockServer::start().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let handler = sync_handler_fn(move |user: AuthUser| {
        let seen = seen_clone.clone();
        async move {
            let token = user.get_id_token().await?;
            seen.lock().push(token);
            Ok::<(), SyncError>(())
        }
    });

    let provider = Arc::new(InMemoryIdentityProvider::new());
    let controller = IdentityChangeController::new(
        provider.clone(),
        client_for(&server),
        ControllerConfig::with_sync_handler(handler),
    );
    let mut rx = controller.watch();
    let _subscription = controller.subscribe(|_| {}).unwrap();

    provider.sign_in(
        ProviderUser::with_static_token("u1", "custom-token").with_email("u1@example.com", true),
        Map::new(),
    );

    let snapshot = wait_until(&mut rx, |s| s.auth_request_completed).await;
    assert_eq!(snapshot.user().and_then(|u| u.email()), Some("u1@example.com"));
    assert_eq!(*seen.lock(), vec!["custom-token".to_string()]);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn failures_after_teardown_are_still_reported() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/api/logout",
        ResponseTemplate::new(500)
            .set_body_string("unavailable")
            .set_delay(Duration::from_millis(200)),
    )
    .await;

    let provider = Arc::new(InMemoryIdentityProvider::new());
    let controller = controller_for(&server, provider.clone());
    let mut failures = controller.take_failures().unwrap();
    let mut rx = controller.watch();
    let mut subscription = controller.subscribe(|_| {}).unwrap();

    provider.sign_out();
    wait_until(&mut rx, |s| s.initialized()).await;
    subscription.unsubscribe();

    match next_failure(&mut failures).await {
        CycleFailure::Sync { source, .. } => {
            assert_eq!(
                source.to_string(),
                r#"Received 500 response from logout API endpoint: "unavailable""#
            );
        }
        other => panic!("unexpected failure: {other:?}"),
    }
    assert_eq!(controller.phase(), ControllerPhase::TornDown);
}
