//! Session controller with FSM-based state management.
//!
//! The controller owns the in-memory view of the session and publishes it
//! through a `watch` channel. The credential record in storage stays the
//! source of truth: whenever it changes underneath (a refresh, a forced
//! clear), the controller re-reads it so the two never diverge.

use crate::api::{AuthApi, LoginRequest, RegistrationRequest, Role};
use crate::config::SessionConfig;
use crate::error::{AuthError, AuthResult, RefreshError};
use crate::refresh::RefreshCoordinator;
use crate::session_fsm::{SessionMachine, SessionMachineInput, SessionStatus};
use crate::token;
use chrono::Utc;
use pitstop_storage::{ClearReason, CredentialStore, StoredCredentials, UserProfile};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Snapshot of the session published to subscribers.
///
/// `status` is `Authenticated` exactly when `access_token` and `user_id` are
/// both present.
#[derive(Clone, PartialEq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user_id: Option<String>,
    pub profile: Option<UserProfile>,
}

impl SessionSnapshot {
    fn loading() -> Self {
        Self {
            status: SessionStatus::Loading,
            access_token: None,
            refresh_token: None,
            user_id: None,
            profile: None,
        }
    }

    fn signed_out() -> Self {
        Self {
            status: SessionStatus::Unauthenticated,
            ..Self::loading()
        }
    }

    fn from_record(record: &StoredCredentials) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            access_token: Some(record.access_token.clone()),
            refresh_token: record.refresh_token.clone(),
            user_id: Some(record.user_id.clone()),
            profile: record.profile.clone(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.status.is_authenticated()
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for SessionSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSnapshot")
            .field("status", &self.status)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("user_id", &self.user_id)
            .field("profile", &self.profile)
            .finish()
    }
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub profile: Option<UserProfile>,
}

/// Result of a successful registration. The session is not signed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationReceipt {
    pub message: Option<String>,
}

/// Session manager: hydrate, login, register, logout.
pub struct SessionController {
    store: Arc<CredentialStore>,
    api: Arc<dyn AuthApi>,
    coordinator: RefreshCoordinator,
    config: SessionConfig,
    fsm: Mutex<SessionMachine>,
    state_tx: watch::Sender<SessionSnapshot>,
}

impl SessionController {
    pub fn new(store: Arc<CredentialStore>, api: Arc<dyn AuthApi>, config: SessionConfig) -> Self {
        let coordinator = RefreshCoordinator::new(store.clone(), api.clone());
        let (state_tx, _) = watch::channel(SessionSnapshot::loading());
        Self {
            store,
            api,
            coordinator,
            config,
            fsm: Mutex::new(SessionMachine::new()),
            state_tx,
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        self.state_tx.borrow().status
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state_tx.borrow().clone()
    }

    /// Observe every session change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state_tx.subscribe()
    }

    /// Restore the session from storage. Always leaves `Loading`.
    ///
    /// A usable access token signs the session in. An expired one with a
    /// refresh token either signs in right away (optimistic, the first
    /// request refreshes) or refreshes first (strict).
    pub async fn hydrate(&self) -> SessionStatus {
        let record = match self.store.load() {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Failed to read stored credentials");
                None
            }
        };

        let Some(record) = record else {
            info!("No stored session");
            self.enter_unauthenticated();
            return SessionStatus::Unauthenticated;
        };

        if !token::is_well_formed(&record.access_token) {
            warn!(user_id = %record.user_id, "Stored access token is malformed, discarding session");
            self.discard(&record.user_id, ClearReason::Invalid);
            return SessionStatus::Unauthenticated;
        }

        let expiry = token::effective_expiry(&record.access_token, record.issued_at);
        if !token::expired(expiry, Utc::now()) {
            info!(user_id = %record.user_id, "Session restored");
            self.enter_authenticated(&record);
            return SessionStatus::Authenticated;
        }

        if record.refresh_token.is_none() {
            info!(user_id = %record.user_id, "Stored session expired with no refresh token");
            self.discard(&record.user_id, ClearReason::RefreshUnavailable);
            return SessionStatus::Unauthenticated;
        }

        if self.config.optimistic_hydration {
            info!(user_id = %record.user_id, "Access token expired, restoring session pending refresh");
            self.enter_authenticated(&record);
            return SessionStatus::Authenticated;
        }

        debug!(user_id = %record.user_id, "Access token expired, refreshing before restoring session");
        match self.refresh().await {
            Ok(_) => self.status(),
            Err(e) => {
                info!(error = %e, "Could not refresh stored session");
                self.enter_unauthenticated();
                SessionStatus::Unauthenticated
            }
        }
    }

    /// Sign in. Fails with [`AuthError::ProtocolViolation`] when the server
    /// claims success without a token and user id.
    pub async fn login(
        &self,
        identifier: &str,
        secret: &str,
        role: Role,
    ) -> AuthResult<AuthenticatedUser> {
        let request = LoginRequest {
            identifier: identifier.to_string(),
            secret: secret.to_string(),
            role,
        };

        let response = match self.api.login(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Login request failed");
                return Err(e);
            }
        };

        if !response.success {
            info!("Login rejected by server");
            return Err(AuthError::Rejected {
                status: None,
                message: response.message,
            });
        }

        let data = response.data.unwrap_or_default();
        let access_token = data.access_token.filter(|t| !t.is_empty());
        let user_id = data.user_id.filter(|id| !id.is_empty());
        let (Some(access_token), Some(user_id)) = (access_token, user_id) else {
            warn!("Login response is missing the access token or user id");
            return Err(AuthError::ProtocolViolation(
                "login succeeded without accessToken and userId".to_string(),
            ));
        };

        let record = StoredCredentials::new(
            access_token,
            data.refresh_token.filter(|t| !t.is_empty()),
            user_id,
            data.profile,
        );
        self.store.replace(&record)?;
        self.enter_authenticated(&record);

        info!(user_id = %record.user_id, "Login successful");
        Ok(AuthenticatedUser {
            user_id: record.user_id,
            profile: record.profile,
        })
    }

    /// Create an account. Does not sign in.
    pub async fn register(&self, request: &RegistrationRequest) -> AuthResult<RegistrationReceipt> {
        let response = match self.api.register(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Registration request failed");
                return Err(e);
            }
        };

        if !response.success {
            info!("Registration rejected by server");
            return Err(AuthError::Rejected {
                status: None,
                message: response.message,
            });
        }

        info!("Registration successful");
        Ok(RegistrationReceipt {
            message: response.message,
        })
    }

    /// Sign out from any state. Never fails.
    ///
    /// Memory is cleared before storage so subscribers react immediately;
    /// storage errors are logged and swallowed.
    pub fn logout(&self) {
        self.end_session(ClearReason::Logout);
        info!("Logged out");
    }

    /// Sign out because the server no longer accepts this session.
    pub fn forced_logout(&self, reason: ClearReason) {
        warn!(reason = ?reason, "Forcing logout");
        self.end_session(reason);
    }

    /// Replace the cached profile of the signed-in user.
    pub fn update_profile(&self, profile: UserProfile) -> AuthResult<()> {
        let user_id = self
            .state_tx
            .borrow()
            .user_id
            .clone()
            .ok_or(AuthError::NotLoggedIn)?;

        if !self.store.update_profile(&user_id, profile)? {
            return Err(AuthError::NotLoggedIn);
        }
        self.resync();
        Ok(())
    }

    /// Refresh the access token through the shared coordinator.
    ///
    /// Whatever the outcome, the published session is re-read from storage
    /// before returning, so a failed refresh has already signed it out.
    pub async fn refresh(&self) -> Result<String, RefreshError> {
        let outcome = self.coordinator.refresh().await;
        self.resync();
        outcome
    }

    /// Re-sync whenever the credential record changes underneath.
    ///
    /// The task holds only a weak reference and ends with the controller.
    pub fn spawn_store_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.store.subscribe();
        let controller: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                let change = match changes.recv().await {
                    Ok(change) => Some(change),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Credential change listener lagged");
                        None
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let Some(controller) = controller.upgrade() else {
                    break;
                };
                if let Some(change) = change {
                    debug!(change = ?change, "Credential record changed");
                }
                controller.resync();
            }
        })
    }

    /// Align memory with the stored record.
    fn resync(&self) -> SessionStatus {
        match self.store.load() {
            Ok(Some(record)) => {
                self.enter_authenticated(&record);
                SessionStatus::Authenticated
            }
            Ok(None) => {
                self.enter_unauthenticated();
                SessionStatus::Unauthenticated
            }
            Err(e) => {
                warn!(error = %e, "Failed to re-read credentials, signing out");
                self.enter_unauthenticated();
                SessionStatus::Unauthenticated
            }
        }
    }

    fn end_session(&self, reason: ClearReason) {
        self.enter_unauthenticated();
        if let Err(e) = self.store.clear_account(reason) {
            warn!(error = %e, "Failed to clear stored account data");
        }
    }

    /// Drop `user_id`'s stored credentials and follow the store.
    pub(crate) fn discard(&self, user_id: &str, reason: ClearReason) {
        match self.store.clear_if_user(user_id, reason) {
            Ok(_) => {
                self.resync();
            }
            Err(e) => {
                warn!(error = %e, "Failed to clear stored credentials");
                self.enter_unauthenticated();
            }
        }
    }

    fn enter_authenticated(&self, record: &StoredCredentials) {
        self.transition(&SessionMachineInput::CredentialsFound);
        self.publish(SessionSnapshot::from_record(record));
    }

    fn enter_unauthenticated(&self) {
        self.transition(&SessionMachineInput::CredentialsMissing);
        self.publish(SessionSnapshot::signed_out());
    }

    fn transition(&self, input: &SessionMachineInput) {
        let mut fsm = self.fsm.lock().unwrap_or_else(|e| e.into_inner());
        let old_state = SessionStatus::from(fsm.state());

        // Every input is accepted in every state.
        if fsm.consume(input).is_err() {
            warn!(input = ?input, state = ?old_state, "Rejected session transition");
            return;
        }

        let new_state = SessionStatus::from(fsm.state());
        if old_state != new_state {
            debug!(old_state = ?old_state, new_state = ?new_state, "Session state transition");
        }
    }

    fn publish(&self, snapshot: SessionSnapshot) {
        self.state_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
