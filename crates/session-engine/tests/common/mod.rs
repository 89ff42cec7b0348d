#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use pitstop_storage::{CredentialStore, MemoryStore, StoredCredentials};
use session_engine::{
    ApiRequest, ApiResponse, AuthApi, AuthError, AuthResult, GatewayResult, HttpTransport,
    LoginRequest, LoginResponse, RefreshFailure, RefreshGrant, RegistrationRequest,
    RegistrationResponse, RequestGateway, SessionConfig, SessionController,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Unsigned token for user `sub` that expires `exp_in_secs` from now.
pub fn make_token(sub: &str, exp_in_secs: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let exp = Utc::now().timestamp() + exp_in_secs;
    let body = URL_SAFE_NO_PAD.encode(serde_json::json!({ "sub": sub, "exp": exp }).to_string());
    format!("{header}.{body}.c2ln")
}

/// Auth endpoints with a scripted refresh outcome.
pub struct MockAuthApi {
    pub refresh_calls: AtomicUsize,
    refresh_delay: Duration,
    refresh_result: Mutex<Result<RefreshGrant, RefreshFailure>>,
    login_result: Mutex<Option<AuthResult<LoginResponse>>>,
}

impl MockAuthApi {
    pub fn refreshing_to(token: &str) -> Self {
        Self::with_refresh(Ok(RefreshGrant {
            access_token: token.to_string(),
            refresh_token: Some("R2".to_string()),
        }))
    }

    pub fn failing_refresh(failure: RefreshFailure) -> Self {
        Self::with_refresh(Err(failure))
    }

    fn with_refresh(result: Result<RefreshGrant, RefreshFailure>) -> Self {
        Self {
            refresh_calls: AtomicUsize::new(0),
            refresh_delay: Duration::from_millis(20),
            refresh_result: Mutex::new(result),
            login_result: Mutex::new(None),
        }
    }

    pub fn set_login(&self, response: AuthResult<LoginResponse>) {
        *self.login_result.lock().unwrap() = Some(response);
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthApi for MockAuthApi {
    async fn login(&self, _request: &LoginRequest) -> AuthResult<LoginResponse> {
        self.login_result
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Err(AuthError::Timeout))
    }

    async fn register(&self, _request: &RegistrationRequest) -> AuthResult<RegistrationResponse> {
        Ok(RegistrationResponse {
            success: true,
            message: None,
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshGrant, RefreshFailure> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.refresh_delay).await;
        self.refresh_result.lock().unwrap().clone()
    }
}

/// Server that answers 200 only for bearer tokens it has been told about.
pub struct MockServer {
    accepted: Mutex<Vec<String>>,
    public_paths: Vec<String>,
    pub calls: Mutex<Vec<(String, Option<String>)>>,
}

impl MockServer {
    pub fn accepting(tokens: &[&str]) -> Self {
        Self {
            accepted: Mutex::new(tokens.iter().map(|t| t.to_string()).collect()),
            public_paths: vec!["/catalog".to_string()],
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn bearers(&self) -> Vec<Option<String>> {
        self.calls.lock().unwrap().iter().map(|(_, b)| b.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for MockServer {
    async fn execute(&self, request: &ApiRequest, bearer: Option<&str>) -> GatewayResult<ApiResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((request.path.clone(), bearer.map(str::to_string)));

        let authorized = self.public_paths.contains(&request.path)
            || bearer.is_some_and(|b| self.accepted.lock().unwrap().iter().any(|t| t == b));

        Ok(if authorized {
            ApiResponse {
                status: 200,
                body: r#"{"ok":true}"#.to_string(),
            }
        } else {
            ApiResponse {
                status: 401,
                body: String::new(),
            }
        })
    }
}

pub struct Harness {
    pub store: Arc<CredentialStore>,
    pub api: Arc<MockAuthApi>,
    pub server: Arc<MockServer>,
    pub session: Arc<SessionController>,
    pub gateway: RequestGateway,
}

impl Harness {
    pub fn new(api: MockAuthApi, server: MockServer) -> Self {
        let store = Arc::new(CredentialStore::new(Box::new(MemoryStore::new())));
        let api = Arc::new(api);
        let server = Arc::new(server);
        let session = Arc::new(SessionController::new(
            store.clone(),
            api.clone(),
            SessionConfig::default(),
        ));
        let gateway = RequestGateway::new(session.clone(), server.clone());
        Self {
            store,
            api,
            server,
            session,
            gateway,
        }
    }

    /// Store a session for `U1` and hydrate the controller from it.
    pub async fn sign_in(&self, access_token: &str, refresh_token: Option<&str>) {
        self.store
            .replace(&StoredCredentials::new(
                access_token,
                refresh_token.map(str::to_string),
                "U1",
                None,
            ))
            .unwrap();
        self.session.hydrate().await;
    }
}
