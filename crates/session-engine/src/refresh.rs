//! Single-flight access token refresh.
//!
//! Every caller that needs a fresh token joins the wait queue. The first one
//! in starts the network refresh on a detached task, so a caller that gives
//! up does not cancel the refresh for everyone else. All waiters receive the
//! same outcome.

use crate::api::AuthApi;
use crate::error::RefreshError;
use chrono::Utc;
use pitstop_storage::{ClearReason, CredentialStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

type Waiter = oneshot::Sender<Result<String, RefreshError>>;

enum RefreshState {
    Idle,
    Refreshing { waiters: Vec<Waiter> },
}

struct Inner {
    store: Arc<CredentialStore>,
    api: Arc<dyn AuthApi>,
    state: Mutex<RefreshState>,
    completed: AtomicU64,
}

/// Shares one in-flight refresh between all concurrent callers.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<CredentialStore>, api: Arc<dyn AuthApi>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                api,
                state: Mutex::new(RefreshState::Idle),
                completed: AtomicU64::new(0),
            }),
        }
    }

    /// Get a new access token, joining the in-flight refresh if there is one.
    pub async fn refresh(&self) -> Result<String, RefreshError> {
        let (tx, rx) = oneshot::channel();

        let leader = {
            let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    waiters.push(tx);
                    debug!(waiting = waiters.len(), "Joined in-flight token refresh");
                    false
                }
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing { waiters: vec![tx] };
                    true
                }
            }
        };

        if leader {
            let coordinator = self.clone();
            tokio::spawn(async move {
                let outcome = coordinator.run().await;
                coordinator.finish(outcome);
            });
        }

        rx.await.unwrap_or(Err(RefreshError::Interrupted))
    }

    /// Whether a refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        let state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        matches!(*state, RefreshState::Refreshing { .. })
    }

    /// Number of refresh cycles that have run to completion.
    pub fn completed_cycles(&self) -> u64 {
        self.inner.completed.load(Ordering::Relaxed)
    }

    async fn run(&self) -> Result<String, RefreshError> {
        let store = &self.inner.store;

        let record = store
            .load()
            .map_err(|e| RefreshError::Storage(e.to_string()))?;

        let Some(record) = record else {
            debug!("No stored credentials to refresh");
            return Err(RefreshError::Unavailable);
        };

        let Some(refresh_token) = record.refresh_token.clone() else {
            warn!(user_id = %record.user_id, "Refresh needed but no refresh token stored");
            self.clear(&record.user_id, ClearReason::RefreshUnavailable);
            return Err(RefreshError::Unavailable);
        };

        debug!(user_id = %record.user_id, "Refreshing access token");

        match self.inner.api.refresh(&refresh_token).await {
            Ok(grant) => {
                let rotated = store
                    .rotate_tokens(
                        &record.user_id,
                        &grant.access_token,
                        grant.refresh_token.as_deref(),
                        Utc::now(),
                    )
                    .map_err(|e| RefreshError::Storage(e.to_string()))?;

                if !rotated {
                    info!("Session ended during refresh, discarding new tokens");
                    return Err(RefreshError::Unavailable);
                }

                info!(user_id = %record.user_id, "Access token refreshed");
                Ok(grant.access_token)
            }
            Err(failure) => {
                // Fail closed: a session that cannot refresh must not keep
                // using its stale token.
                warn!(user_id = %record.user_id, error = %failure, "Token refresh failed, clearing credentials");
                self.clear(&record.user_id, ClearReason::RefreshFailed);
                Err(RefreshError::Failed(failure))
            }
        }
    }

    fn clear(&self, user_id: &str, reason: ClearReason) {
        if let Err(e) = self.inner.store.clear_if_user(user_id, reason) {
            warn!(error = %e, "Failed to clear credentials after refresh failure");
        }
    }

    fn finish(&self, outcome: Result<String, RefreshError>) {
        let waiters = {
            let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
            match std::mem::replace(&mut *state, RefreshState::Idle) {
                RefreshState::Refreshing { waiters } => waiters,
                RefreshState::Idle => Vec::new(),
            }
        };
        self.inner.completed.fetch_add(1, Ordering::Relaxed);

        debug!(waiters = waiters.len(), ok = outcome.is_ok(), "Releasing refresh waiters");
        for waiter in waiters {
            // A waiter that went away no longer needs the result.
            let _ = waiter.send(outcome.clone());
        }
    }
}
