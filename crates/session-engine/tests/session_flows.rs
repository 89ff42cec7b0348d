mod common;

use common::{make_token, Harness, MockAuthApi, MockServer};
use session_engine::{AuthError, LoginData, LoginResponse, Role, SessionStatus};

fn login_response(data: LoginData) -> LoginResponse {
    LoginResponse {
        success: true,
        data: Some(data),
        message: None,
    }
}

#[tokio::test]
async fn login_stores_credentials_and_authenticates() {
    let h = Harness::new(MockAuthApi::refreshing_to("unused"), MockServer::accepting(&[]));
    h.session.hydrate().await;
    h.api.set_login(Ok(login_response(LoginData {
        access_token: Some("A1".to_string()),
        refresh_token: Some("R1".to_string()),
        user_id: Some("U1".to_string()),
        profile: None,
    })));

    let user = h.session.login("u1", "s1", Role::Customer).await.unwrap();

    assert_eq!(user.user_id, "U1");
    assert_eq!(h.session.status(), SessionStatus::Authenticated);
    let record = h.store.load().unwrap().unwrap();
    assert_eq!(record.access_token, "A1");
    assert_eq!(record.refresh_token.as_deref(), Some("R1"));
    assert_eq!(record.user_id, "U1");
}

#[tokio::test]
async fn login_without_token_and_user_is_rejected() {
    let h = Harness::new(MockAuthApi::refreshing_to("unused"), MockServer::accepting(&[]));
    h.session.hydrate().await;
    h.api.set_login(Ok(login_response(LoginData::default())));

    let err = h.session.login("u1", "s1", Role::Customer).await.unwrap_err();

    assert!(matches!(err, AuthError::ProtocolViolation(_)));
    assert_eq!(h.session.status(), SessionStatus::Unauthenticated);
    assert!(h.store.load().unwrap().is_none());
}

#[tokio::test]
async fn login_timeout_has_its_own_message() {
    let h = Harness::new(MockAuthApi::refreshing_to("unused"), MockServer::accepting(&[]));

    let err = h.session.login("u1", "s1", Role::Provider).await.unwrap_err();

    assert!(matches!(err, AuthError::Timeout));
    assert!(err.user_message().contains("timed out"));
}

#[tokio::test]
async fn logout_is_idempotent() {
    let h = Harness::new(MockAuthApi::refreshing_to("unused"), MockServer::accepting(&[]));
    h.sign_in(&make_token("U1", 3600), Some("R1")).await;
    assert_eq!(h.session.status(), SessionStatus::Authenticated);

    h.session.logout();
    h.session.logout();

    assert_eq!(h.session.status(), SessionStatus::Unauthenticated);
    assert!(h.store.load().unwrap().is_none());
}

#[tokio::test]
async fn relogin_after_logout() {
    let h = Harness::new(MockAuthApi::refreshing_to("unused"), MockServer::accepting(&[]));
    h.sign_in(&make_token("U1", 3600), Some("R1")).await;
    h.session.logout();

    h.api.set_login(Ok(login_response(LoginData {
        access_token: Some("A9".to_string()),
        refresh_token: None,
        user_id: Some("U9".to_string()),
        profile: None,
    })));
    h.session.login("u9", "s9", Role::Customer).await.unwrap();

    let snapshot = h.session.snapshot();
    assert!(snapshot.is_authenticated());
    assert_eq!(snapshot.user_id.as_deref(), Some("U9"));
    assert_eq!(snapshot.refresh_token, None);
}
