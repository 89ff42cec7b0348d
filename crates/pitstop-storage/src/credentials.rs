//! High-level API for the stored credential record.

use crate::{KeyValueStore, StorageError, StorageKeys, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const CHANGE_CHANNEL_CAPACITY: usize = 32;

/// Cached identity of the signed-in account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Fields the server sends that this client does not model.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The whole persisted session. Always written and removed as one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user_id: String,
    #[serde(default)]
    pub profile: Option<UserProfile>,
    /// When this client received `access_token`.
    pub issued_at: DateTime<Utc>,
}

impl StoredCredentials {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        user_id: impl Into<String>,
        profile: Option<UserProfile>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            user_id: user_id.into(),
            profile,
            issued_at: Utc::now(),
        }
    }

    fn is_usable(&self) -> bool {
        !self.access_token.is_empty() && !self.user_id.is_empty()
    }
}

/// Why the credential record was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    /// The user signed out.
    Logout,
    /// The refresh endpoint rejected the refresh token or was unreachable.
    RefreshFailed,
    /// A refresh was needed but no refresh token was stored.
    RefreshUnavailable,
    /// The server kept rejecting requests after a refresh.
    Unauthorized,
    /// The stored access token could not be decoded.
    Invalid,
}

/// Notification sent to subscribers after every committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialChange {
    Replaced,
    Cleared(ClearReason),
}

/// Owner of the stored credential record.
///
/// The record lives under a single key, so a reader sees either the old or
/// the new token pair and never a mix of both.
pub struct CredentialStore {
    backend: Box<dyn KeyValueStore>,
    write_lock: Mutex<()>,
    changes: broadcast::Sender<CredentialChange>,
}

impl CredentialStore {
    pub fn new(backend: Box<dyn KeyValueStore>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            backend,
            write_lock: Mutex::new(()),
            changes,
        }
    }

    /// Subscribe to record changes made through this store.
    pub fn subscribe(&self) -> broadcast::Receiver<CredentialChange> {
        self.changes.subscribe()
    }

    /// Load the record. A corrupt or incomplete record reads as absent.
    pub fn load(&self) -> StorageResult<Option<StoredCredentials>> {
        let Some(raw) = self.backend.get(StorageKeys::CREDENTIALS)? else {
            return Ok(None);
        };

        match serde_json::from_str::<StoredCredentials>(&raw) {
            Ok(record) if record.is_usable() => Ok(Some(record)),
            Ok(_) => {
                warn!("Stored credentials are missing a token or user id, ignoring");
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "Stored credentials are corrupt, ignoring");
                Ok(None)
            }
        }
    }

    pub fn access_token(&self) -> StorageResult<Option<String>> {
        Ok(self.load()?.map(|record| record.access_token))
    }

    pub fn refresh_token(&self) -> StorageResult<Option<String>> {
        Ok(self.load()?.and_then(|record| record.refresh_token))
    }

    /// Replace the whole record, e.g. after login.
    pub fn replace(&self, record: &StoredCredentials) -> StorageResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.write(record)?;
        info!(user_id = %record.user_id, "Stored credentials replaced");
        self.notify(CredentialChange::Replaced);
        Ok(())
    }

    /// Swap in a refreshed token pair for `user_id`.
    ///
    /// Returns `false` without writing when the record is gone or belongs to
    /// another user, so a logout during a refresh stays a logout. A `None`
    /// refresh token keeps the current one.
    pub fn rotate_tokens(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        issued_at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let Some(mut record) = self.load()? else {
            debug!("Credentials cleared while refreshing, dropping new tokens");
            return Ok(false);
        };
        if record.user_id != user_id {
            debug!("Credentials belong to another user now, dropping new tokens");
            return Ok(false);
        }

        record.access_token = access_token.to_string();
        if let Some(refresh_token) = refresh_token {
            record.refresh_token = Some(refresh_token.to_string());
        }
        record.issued_at = issued_at;

        self.write(&record)?;
        debug!(user_id = %user_id, "Rotated stored tokens");
        self.notify(CredentialChange::Replaced);
        Ok(true)
    }

    /// Replace the cached profile for `user_id`. Returns `false` if that user
    /// is no longer signed in.
    pub fn update_profile(&self, user_id: &str, profile: UserProfile) -> StorageResult<bool> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let Some(mut record) = self.load()? else {
            return Ok(false);
        };
        if record.user_id != user_id {
            return Ok(false);
        }

        record.profile = Some(profile);
        self.write(&record)?;
        self.notify(CredentialChange::Replaced);
        Ok(true)
    }

    /// Remove the credential record.
    pub fn clear(&self, reason: ClearReason) -> StorageResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.backend.delete(StorageKeys::CREDENTIALS)?;
        info!(reason = ?reason, "Stored credentials cleared");
        self.notify(CredentialChange::Cleared(reason));
        Ok(())
    }

    /// Remove the record only if it still belongs to `user_id`.
    pub fn clear_if_user(&self, user_id: &str, reason: ClearReason) -> StorageResult<bool> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        match self.load()? {
            Some(record) if record.user_id == user_id => {}
            _ => return Ok(false),
        }

        self.backend.delete(StorageKeys::CREDENTIALS)?;
        info!(reason = ?reason, "Stored credentials cleared");
        self.notify(CredentialChange::Cleared(reason));
        Ok(true)
    }

    /// Remove the credential record and every per-account flag.
    pub fn clear_account(&self, reason: ClearReason) -> StorageResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut keys = Vec::with_capacity(StorageKeys::ACCOUNT_FLAGS.len() + 1);
        keys.push(StorageKeys::CREDENTIALS);
        keys.extend_from_slice(StorageKeys::ACCOUNT_FLAGS);

        let removed = self.backend.multi_remove(&keys)?;
        info!(reason = ?reason, removed, "Account data cleared");
        self.notify(CredentialChange::Cleared(reason));
        Ok(())
    }

    pub fn set_onboarding_complete(&self, complete: bool) -> StorageResult<()> {
        if complete {
            self.backend.set(StorageKeys::ONBOARDING_COMPLETE, "true")
        } else {
            self.backend
                .delete(StorageKeys::ONBOARDING_COMPLETE)
                .map(|_| ())
        }
    }

    pub fn is_onboarding_complete(&self) -> StorageResult<bool> {
        Ok(self
            .backend
            .get(StorageKeys::ONBOARDING_COMPLETE)?
            .is_some_and(|value| value == "true"))
    }

    fn write(&self, record: &StoredCredentials) -> StorageResult<()> {
        let encoded =
            serde_json::to_string(record).map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.backend.set(StorageKeys::CREDENTIALS, &encoded)
    }

    fn notify(&self, change: CredentialChange) {
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }
}
