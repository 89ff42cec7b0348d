mod common;

use common::{make_token, Harness, MockAuthApi, MockServer};
use pitstop_storage::StoredCredentials;
use session_engine::{ApiRequest, GatewayError, RefreshFailure, SessionStatus};

fn network_failure() -> RefreshFailure {
    RefreshFailure::Network("connection reset".to_string())
}

#[tokio::test]
async fn fresh_token_is_sent_without_refresh() {
    let a1 = make_token("U1", 3600);
    let h = Harness::new(MockAuthApi::refreshing_to("unused"), MockServer::accepting(&[&a1]));
    h.sign_in(&a1, Some("R1")).await;

    let response = h.gateway.send(&ApiRequest::get("/garage")).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(h.server.bearers(), vec![Some(a1)]);
    assert_eq!(h.api.refresh_count(), 0);
}

#[tokio::test]
async fn aging_token_is_refreshed_before_send() {
    let a1 = make_token("U1", 60);
    let a2 = make_token("U1", 3600);
    let h = Harness::new(MockAuthApi::refreshing_to(&a2), MockServer::accepting(&[&a1, &a2]));
    h.sign_in(&a1, Some("R1")).await;

    let response = h.gateway.send(&ApiRequest::get("/garage")).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(h.server.bearers(), vec![Some(a2.clone())]);
    assert_eq!(h.api.refresh_count(), 1);

    let record = h.store.load().unwrap().unwrap();
    assert_eq!(record.access_token, a2);
    assert_eq!(record.refresh_token.as_deref(), Some("R2"));

    // Subscribers see the rotated pair right away.
    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.access_token.as_deref(), Some(a2.as_str()));
    assert_eq!(snapshot.refresh_token.as_deref(), Some("R2"));
}

#[tokio::test]
async fn simultaneous_calls_share_one_refresh() {
    let expired = make_token("U1", -30);
    let a2 = make_token("U1", 3600);
    let h = Harness::new(MockAuthApi::refreshing_to(&a2), MockServer::accepting(&[&a2]));
    h.sign_in(&expired, Some("R1")).await;

    let request = ApiRequest::get("/appointments");
    let (a, b, c) = tokio::join!(
        h.gateway.send(&request),
        h.gateway.send(&request),
        h.gateway.send(&request)
    );

    for response in [a, b, c] {
        assert_eq!(response.unwrap().status, 200);
    }
    assert_eq!(h.api.refresh_count(), 1);
    assert_eq!(h.server.bearers(), vec![Some(a2.clone()); 3]);
}

#[tokio::test]
async fn unauthorized_is_retried_once_with_new_token() {
    let a1 = make_token("U1", 3600);
    let a2 = make_token("U1", 7200);
    let h = Harness::new(MockAuthApi::refreshing_to(&a2), MockServer::accepting(&[&a2]));
    h.sign_in(&a1, Some("R1")).await;

    let response = h.gateway.send(&ApiRequest::get("/garage")).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(h.server.bearers(), vec![Some(a1), Some(a2)]);
    assert_eq!(h.api.refresh_count(), 1);
    assert_eq!(h.session.status(), SessionStatus::Authenticated);
}

#[tokio::test]
async fn second_unauthorized_forces_logout_without_another_retry() {
    let a1 = make_token("U1", 3600);
    let a2 = make_token("U1", 7200);
    let h = Harness::new(MockAuthApi::refreshing_to(&a2), MockServer::accepting(&[]));
    h.sign_in(&a1, Some("R1")).await;
    h.store.set_onboarding_complete(true).unwrap();

    let err = h.gateway.send(&ApiRequest::get("/garage")).await.unwrap_err();

    assert!(matches!(err, GatewayError::Unauthorized));
    assert_eq!(h.server.call_count(), 2);
    assert_eq!(h.api.refresh_count(), 1);
    assert_eq!(h.session.status(), SessionStatus::Unauthenticated);
    assert!(h.store.load().unwrap().is_none());
    assert!(!h.store.is_onboarding_complete().unwrap());
}

#[tokio::test]
async fn failed_refresh_after_unauthorized_clears_everything() {
    let a1 = make_token("U1", 3600);
    let h = Harness::new(
        MockAuthApi::failing_refresh(RefreshFailure::Rejected { status: Some(401) }),
        MockServer::accepting(&[]),
    );
    h.sign_in(&a1, Some("R1")).await;

    let err = h.gateway.send(&ApiRequest::get("/garage")).await.unwrap_err();

    assert!(matches!(err, GatewayError::Unauthorized));
    assert_eq!(h.server.call_count(), 1);
    assert_eq!(h.session.status(), SessionStatus::Unauthenticated);
    assert!(h.store.access_token().unwrap().is_none());
    assert!(h.store.refresh_token().unwrap().is_none());
}

#[tokio::test]
async fn concurrent_unauthorized_calls_share_one_refresh() {
    let a1 = make_token("U1", 3600);
    let a2 = make_token("U1", 7200);
    let h = Harness::new(MockAuthApi::refreshing_to(&a2), MockServer::accepting(&[&a2]));
    h.sign_in(&a1, Some("R1")).await;

    let request = ApiRequest::get("/messages");
    let (a, b, c) = tokio::join!(
        h.gateway.send(&request),
        h.gateway.send(&request),
        h.gateway.send(&request)
    );

    for response in [a, b, c] {
        assert_eq!(response.unwrap().status, 200);
    }
    assert_eq!(h.api.refresh_count(), 1);
    // Three rejected sends plus exactly one retry each.
    assert_eq!(h.server.call_count(), 6);
}

#[tokio::test]
async fn soft_refresh_failure_sends_current_token() {
    let a1 = make_token("U1", 60);
    let h = Harness::new(MockAuthApi::failing_refresh(network_failure()), MockServer::accepting(&[&a1]));
    h.sign_in(&a1, Some("R1")).await;

    let response = h.gateway.send(&ApiRequest::get("/garage")).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(h.server.bearers(), vec![Some(a1)]);

    // The failed refresh still signs the session out, without a store listener.
    assert!(h.store.load().unwrap().is_none());
    assert_eq!(h.session.status(), SessionStatus::Unauthenticated);
}

#[tokio::test]
async fn hard_refresh_failure_sends_unauthenticated() {
    let expired = make_token("U1", -30);
    let h = Harness::new(MockAuthApi::failing_refresh(network_failure()), MockServer::accepting(&[]));
    h.sign_in(&expired, Some("R1")).await;

    let response = h.gateway.send(&ApiRequest::get("/catalog")).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(h.server.bearers(), vec![None]);
    assert!(h.store.load().unwrap().is_none());

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Unauthenticated);
    assert!(snapshot.access_token.is_none());
    assert!(snapshot.user_id.is_none());
}

#[tokio::test]
async fn rejected_proactive_refresh_signs_session_out() {
    let expired = make_token("U1", -30);
    let h = Harness::new(
        MockAuthApi::failing_refresh(RefreshFailure::Rejected { status: Some(401) }),
        MockServer::accepting(&[]),
    );
    h.sign_in(&expired, Some("R1")).await;
    assert_eq!(h.session.status(), SessionStatus::Authenticated);
    let mut state = h.session.subscribe();

    let response = h.gateway.send(&ApiRequest::get("/catalog")).await.unwrap();

    assert_eq!(response.status, 200);
    assert!(h.store.load().unwrap().is_none());
    assert_eq!(h.session.status(), SessionStatus::Unauthenticated);
    assert!(state.has_changed().unwrap());
    assert!(!state.borrow_and_update().is_authenticated());
}

#[tokio::test]
async fn malformed_token_is_cleared_and_never_sent() {
    let h = Harness::new(MockAuthApi::refreshing_to("unused"), MockServer::accepting(&[]));
    h.sign_in(&make_token("U1", 3600), Some("R1")).await;
    assert_eq!(h.session.status(), SessionStatus::Authenticated);

    // Corrupted underneath a signed-in session.
    h.store
        .replace(&StoredCredentials::new("not-a-token", Some("R1".to_string()), "U1", None))
        .unwrap();

    let response = h.gateway.send(&ApiRequest::get("/catalog")).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(h.server.bearers(), vec![None]);
    assert!(h.store.load().unwrap().is_none());
    assert_eq!(h.api.refresh_count(), 0);
    assert_eq!(h.session.status(), SessionStatus::Unauthenticated);
}

#[tokio::test]
async fn public_call_without_session() {
    let h = Harness::new(MockAuthApi::refreshing_to("unused"), MockServer::accepting(&[]));
    h.session.hydrate().await;

    let response = h.gateway.send(&ApiRequest::get("/catalog")).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(h.server.bearers(), vec![None]);
    assert_eq!(h.api.refresh_count(), 0);
}

#[tokio::test]
async fn non_auth_errors_pass_through() {
    let a1 = make_token("U1", 3600);
    let h = Harness::new(MockAuthApi::refreshing_to("unused"), MockServer::accepting(&[&a1]));
    h.sign_in(&a1, Some("R1")).await;

    let value: serde_json::Value = h.gateway.send_json(&ApiRequest::get("/garage")).await.unwrap();
    assert_eq!(value["ok"], true);
}
