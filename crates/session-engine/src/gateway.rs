//! Authenticated request gateway.
//!
//! Wraps every outbound API call: attaches the stored access token,
//! refreshes it ahead of expiry, and recovers from a 401 with exactly one
//! refresh-and-retry before forcing logout.

use crate::api::join_base;
use crate::session::SessionController;
use crate::token;
use async_trait::async_trait;
use chrono::Utc;
use pitstop_storage::{ClearReason, CredentialStore};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

/// The only status treated as an authorization failure.
pub const UNAUTHORIZED: u16 = 401;

/// Gateway error type.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The session could not be recovered and has been signed out
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Request timed out")]
    Timeout,

    #[error("Network unavailable")]
    NetworkUnavailable,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else if e.is_connect() {
            GatewayError::NetworkUnavailable
        } else {
            GatewayError::Http(e.to_string())
        }
    }
}

impl GatewayError {
    /// Message safe to show the end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized => "Your session has expired. Please log in again.",
            GatewayError::Timeout => "The request timed out. Please try again.",
            GatewayError::NetworkUnavailable => {
                "Unable to reach the server. Check your connection and try again."
            }
            _ => "Something went wrong. Please try again.",
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// An API call, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> GatewayResult<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Sends one request. `bearer` is attached as the Authorization header.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: &ApiRequest, bearer: Option<&str>) -> GatewayResult<ApiResponse>;
}

/// [`HttpTransport`] backed by reqwest.
pub struct ReqwestTransport {
    http_client: Client,
    base_url: Url,
}

impl ReqwestTransport {
    pub fn new(base_url: Url, timeout: Duration) -> GatewayResult<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: join_base(base_url),
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &ApiRequest, bearer: Option<&str>) -> GatewayResult<ApiResponse> {
        let url = self.base_url.join(request.path.trim_start_matches('/'))?;

        let mut builder = self.http_client.request(request.method.clone(), url);
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(ApiResponse { status, body })
    }
}

/// Drop-in wrapper for authenticated API calls.
pub struct RequestGateway {
    session: Arc<SessionController>,
    transport: Arc<dyn HttpTransport>,
}

impl RequestGateway {
    pub fn new(session: Arc<SessionController>, transport: Arc<dyn HttpTransport>) -> Self {
        Self { session, transport }
    }

    fn store(&self) -> &CredentialStore {
        self.session.store()
    }

    /// Send `request` with the best credential available.
    ///
    /// A 401 triggers one refresh and one retry. If the refresh fails or the
    /// retry is rejected too, the session is signed out and
    /// [`GatewayError::Unauthorized`] is returned.
    pub async fn send(&self, request: &ApiRequest) -> GatewayResult<ApiResponse> {
        let bearer = self.credential_for_call().await;

        let response = self.transport.execute(request, bearer.as_deref()).await?;
        if response.status != UNAUTHORIZED {
            return Ok(response);
        }

        debug!(path = %request.path, "Request unauthorized, refreshing before one retry");
        match self.session.refresh().await {
            Ok(fresh) => {
                let retried = self.transport.execute(request, Some(&fresh)).await?;
                if retried.status != UNAUTHORIZED {
                    return Ok(retried);
                }
                warn!(path = %request.path, "Request unauthorized again after refresh");
            }
            Err(e) => {
                warn!(path = %request.path, error = %e, "Refresh after unauthorized response failed");
            }
        }

        self.session.forced_logout(ClearReason::Unauthorized);
        Err(GatewayError::Unauthorized)
    }

    /// Send and decode a JSON body. Non-2xx responses other than 401 are
    /// returned as [`GatewayError::Http`].
    pub async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> GatewayResult<T> {
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(GatewayError::Http(format!("HTTP {}", response.status)));
        }
        response.json()
    }

    /// Pick the token for one call, refreshing first when it is close to
    /// expiry. `None` sends the call unauthenticated.
    async fn credential_for_call(&self) -> Option<String> {
        let record = match self.store().load() {
            Ok(record) => record?,
            Err(e) => {
                warn!(error = %e, "Failed to read credentials, sending unauthenticated");
                return None;
            }
        };

        if !token::is_well_formed(&record.access_token) {
            warn!(user_id = %record.user_id, "Stored access token is malformed, clearing it");
            self.session.discard(&record.user_id, ClearReason::Invalid);
            return None;
        }

        let now = Utc::now();
        let expiry = token::effective_expiry(&record.access_token, record.issued_at);
        if !token::refresh_due(expiry, now, self.session.config().refresh_lead_time) {
            return Some(record.access_token);
        }

        debug!(user_id = %record.user_id, "Access token near expiry, refreshing before send");
        match self.session.refresh().await {
            Ok(fresh) => Some(fresh),
            Err(e) if !token::expired(expiry, now) => {
                // The old token still works for a moment; a 401 is handled after send.
                info!(error = %e, "Proactive refresh failed, using current token");
                Some(record.access_token)
            }
            Err(e) => {
                info!(error = %e, "Refresh failed and token expired, sending unauthenticated");
                None
            }
        }
    }
}
