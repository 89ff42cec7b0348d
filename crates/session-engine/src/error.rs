//! Session error types.

use thiserror::Error;

/// Shown for anything without a more specific message.
const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The server answered but refused the request (wrong secret, validation, ...)
    #[error("Rejected by server{}", format_rejection(.status, .message))]
    Rejected {
        status: Option<u16>,
        message: Option<String>,
    },

    /// The server reported success but left out required fields
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Session not found
    #[error("Not logged in")]
    NotLoggedIn,

    /// Session expired and could not be refreshed
    #[error("Session expired: {0}")]
    SessionExpired(#[from] RefreshError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] pitstop_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Network unavailable (transient error, can retry)
    #[error("Network unavailable")]
    NetworkUnavailable,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] pitstop_config_and_utils::CoreError),
}

fn format_rejection(status: &Option<u16>, message: &Option<String>) -> String {
    match (status, message) {
        (Some(status), Some(message)) => format!(" (HTTP {status}): {message}"),
        (Some(status), None) => format!(" (HTTP {status})"),
        (None, Some(message)) => format!(": {message}"),
        (None, None) => String::new(),
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AuthError::Timeout
        } else if e.is_connect() {
            AuthError::NetworkUnavailable
        } else {
            AuthError::Http(e)
        }
    }
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::NetworkUnavailable | AuthError::Timeout => true,
            AuthError::Rejected {
                status: Some(status),
                ..
            } => *status >= 500,
            AuthError::Http(e) => e.status().is_some_and(|s| s.is_server_error()),
            _ => false,
        }
    }

    /// Message safe to show the end user.
    ///
    /// Refresh failures all collapse into one "session expired" message so
    /// the UI never reveals whether a refresh token was rejected or merely
    /// unreachable.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Timeout => "The request timed out. Please try again.".to_string(),
            AuthError::NetworkUnavailable => {
                "Unable to reach the server. Check your connection and try again.".to_string()
            }
            AuthError::Rejected {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            AuthError::SessionExpired(_) | AuthError::NotLoggedIn => {
                "Your session has expired. Please log in again.".to_string()
            }
            _ => GENERIC_FAILURE.to_string(),
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

/// Why a refresh network call failed. Kept for diagnostics only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    #[error("refresh token rejected{}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Rejected { status: Option<u16> },

    #[error("network error: {0}")]
    Network(String),

    #[error("timed out")]
    Timeout,

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for RefreshFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RefreshFailure::Timeout
        } else if e.is_decode() {
            RefreshFailure::Malformed(e.to_string())
        } else {
            RefreshFailure::Network(e.to_string())
        }
    }
}

/// Outcome delivered to every caller waiting on one refresh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// No refresh token, or the session ended while refreshing.
    #[error("no refresh token available")]
    Unavailable,

    #[error("refresh failed: {0}")]
    Failed(#[from] RefreshFailure),

    #[error("credential storage failed: {0}")]
    Storage(String),

    /// The refresh task ended without reporting.
    #[error("refresh was interrupted")]
    Interrupted,
}
