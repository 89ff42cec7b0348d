//! Unauthenticated auth endpoints: login, registration, token refresh.

use crate::error::{AuthError, AuthResult, RefreshFailure};
use async_trait::async_trait;
use pitstop_storage::UserProfile;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Account type the user signs in as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Customer,
    Provider,
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "provider" => Ok(Role::Provider),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub identifier: String,
    pub secret: String,
    pub role: Role,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub profile: Option<UserProfile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<LoginData>,
    #[serde(default)]
    pub message: Option<String>,
}

/// New account details. Profile fields travel flattened next to the secret.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub secret: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Tokens minted by a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshGrant {
    pub access_token: String,
    /// `None` when the server keeps the old refresh token valid.
    pub refresh_token: Option<String>,
}

/// The auth endpoints this crate talks to.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// A `success: false` body is returned as `Ok`; only transport and
    /// decode failures are errors.
    async fn login(&self, request: &LoginRequest) -> AuthResult<LoginResponse>;

    async fn register(&self, request: &RegistrationRequest) -> AuthResult<RegistrationResponse>;

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant, RefreshFailure>;
}

/// Make `base` usable with [`Url::join`] so relative paths append instead of
/// replacing its last segment.
pub(crate) fn join_base(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

/// [`AuthApi`] over HTTPS.
pub struct HttpAuthApi {
    http_client: Client,
    base_url: Url,
}

impl HttpAuthApi {
    pub fn new(base_url: Url, timeout: Duration) -> AuthResult<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: join_base(base_url),
        })
    }

    fn endpoint(&self, path: &str) -> AuthResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// POST `body` and decode the reply, accepting error statuses that still
    /// carry a JSON body.
    async fn post_json<B, R>(&self, path: &str, body: &B) -> AuthResult<R>
    where
        B: Serialize + ?Sized + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let url = self.endpoint(path)?;
        debug!(url = %url, "Calling auth endpoint");

        let response = self.http_client.post(url).json(body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        match serde_json::from_slice::<R>(&bytes) {
            Ok(decoded) => Ok(decoded),
            Err(e) if status.is_success() => Err(AuthError::ProtocolViolation(format!(
                "undecodable response from {path}: {e}"
            ))),
            Err(_) => {
                warn!(status = %status, path, "Auth endpoint failed without a JSON body");
                Err(AuthError::Rejected {
                    status: Some(status.as_u16()),
                    message: None,
                })
            }
        }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, request: &LoginRequest) -> AuthResult<LoginResponse> {
        self.post_json("auth/login", request).await
    }

    async fn register(&self, request: &RegistrationRequest) -> AuthResult<RegistrationResponse> {
        self.post_json("auth/register", request).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant, RefreshFailure> {
        let url = self
            .base_url
            .join("auth/refresh")
            .map_err(|e| RefreshFailure::Network(e.to_string()))?;

        let response = self
            .http_client
            .post(url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Token refresh rejected");
            return Err(RefreshFailure::Rejected {
                status: Some(status.as_u16()),
            });
        }

        let body: RefreshResponse = response.json().await?;
        if !body.success {
            return Err(RefreshFailure::Rejected { status: None });
        }
        let access_token = body
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RefreshFailure::Malformed("missing token".to_string()))?;

        Ok(RefreshGrant {
            access_token,
            refresh_token: body.refresh_token.filter(|t| !t.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_wire_shape() {
        let request = LoginRequest {
            identifier: "u1".to_string(),
            secret: "s1".to_string(),
            role: Role::Provider,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "identifier": "u1", "secret": "s1", "role": "provider" })
        );
    }

    #[test]
    fn test_login_response_tolerates_missing_data() {
        let response: LoginResponse =
            serde_json::from_str(r#"{ "success": true, "data": {} }"#).unwrap();
        assert!(response.success);
        let data = response.data.unwrap();
        assert!(data.access_token.is_none());
        assert!(data.user_id.is_none());

        let response: LoginResponse =
            serde_json::from_str(r#"{ "success": false, "message": "Wrong password" }"#).unwrap();
        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("Wrong password"));
    }

    #[test]
    fn test_registration_request_flattens_profile() {
        let request = RegistrationRequest {
            profile: UserProfile {
                name: Some("Dana".to_string()),
                phone: Some("+15550100".to_string()),
                ..Default::default()
            },
            secret: "s1".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["name"], "Dana");
        assert_eq!(value["phone"], "+15550100");
        assert_eq!(value["secret"], "s1");
        assert!(value.get("profile").is_none());
    }

    #[test]
    fn test_join_base_keeps_path_prefix() {
        let base = join_base(Url::parse("https://api.example.com/v1").unwrap());
        assert_eq!(
            base.join("auth/login").unwrap().as_str(),
            "https://api.example.com/v1/auth/login"
        );

        let root = join_base(Url::parse("https://api.example.com").unwrap());
        assert_eq!(
            root.join("auth/refresh").unwrap().as_str(),
            "https://api.example.com/auth/refresh"
        );
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Customer".parse::<Role>().unwrap(), Role::Customer);
        assert_eq!("provider".parse::<Role>().unwrap(), Role::Provider);
        assert!("admin".parse::<Role>().is_err());
    }
}
