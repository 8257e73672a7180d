//! Wire types and the REST seam for the authenticator and login requests.

use crate::AuthResult;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

/// Authenticator name for the interactive browser flow.
pub const AUTHENTICATOR_EXTERNAL_BROWSER: &str = "EXTERNALBROWSER";

/// Authenticator name when logging in with a cached identity token.
pub const AUTHENTICATOR_ID_TOKEN: &str = "ID_TOKEN";

/// Server code returned when a cached identity token is no longer accepted.
pub const ID_TOKEN_INVALID_CODE: &str = "390195";

const AUTHENTICATOR_REQUEST_PATH: &str = "/session/authenticator-request";
const LOGIN_REQUEST_PATH: &str = "/session/v1/login-request";

/// Outer `{"data": ...}` wrapper of every request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope<T> {
    pub data: T,
}

impl<T> RequestEnvelope<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Outer wrapper of every response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub success: bool,
}

impl<T> ResponseEnvelope<T> {
    /// A successful response carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            code: None,
            message: None,
            success: true,
        }
    }

    /// A rejected response with a server code.
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            data: None,
            code: Some(code.into()),
            message: Some(message.into()),
            success: false,
        }
    }
}

/// Body of the request that asks the server for an SSO URL and proof key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AuthenticatorRequestData {
    pub account_name: String,
    pub login_name: String,
    pub authenticator: String,
    pub browser_mode_redirect_port: String,
    pub client_app_id: String,
    pub client_app_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorResponseData {
    pub sso_url: String,
    pub proof_key: String,
}

/// Body of the login request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct LoginRequestData {
    pub account_name: String,
    pub login_name: String,
    pub authenticator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_key: Option<String>,
    pub client_app_id: String,
    pub client_app_version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub session_parameters: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponseData {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub master_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub session_id: Option<u64>,
}

pub type AuthenticatorRequest = RequestEnvelope<AuthenticatorRequestData>;
pub type AuthenticatorResponse = ResponseEnvelope<AuthenticatorResponseData>;
pub type LoginRequest = RequestEnvelope<LoginRequestData>;
pub type LoginResponse = ResponseEnvelope<LoginResponseData>;

/// Transport used by the authenticator. Retries and timeouts belong to the
/// implementation.
#[async_trait]
pub trait SsoRestClient: Send + Sync {
    /// Ask the server for a provider-issued SSO URL and proof key.
    async fn request_authenticator(
        &self,
        request: &AuthenticatorRequest,
    ) -> AuthResult<AuthenticatorResponse>;

    /// Submit the login request.
    async fn login(&self, request: &LoginRequest) -> AuthResult<LoginResponse>;
}

/// `SsoRestClient` over reqwest.
#[derive(Debug, Clone)]
pub struct HttpSsoRestClient {
    base_url: Url,
    http_client: reqwest::Client,
}

impl HttpSsoRestClient {
    /// Client for the server at `base_url` (e.g. `https://acct.example.com`).
    pub fn new(base_url: &str) -> AuthResult<Self> {
        Ok(Self::with_client(Url::parse(base_url)?, reqwest::Client::new()))
    }

    /// Use a preconfigured reqwest client.
    pub fn with_client(base_url: Url, http_client: reqwest::Client) -> Self {
        Self {
            base_url,
            http_client,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> AuthResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> AuthResult<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!(url = %url, "Posting SSO request");

        let response = self
            .http_client
            .post(url)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

#[async_trait]
impl SsoRestClient for HttpSsoRestClient {
    async fn request_authenticator(
        &self,
        request: &AuthenticatorRequest,
    ) -> AuthResult<AuthenticatorResponse> {
        self.post(AUTHENTICATOR_REQUEST_PATH, request).await
    }

    async fn login(&self, request: &LoginRequest) -> AuthResult<LoginResponse> {
        self.post(LOGIN_REQUEST_PATH, request).await
    }
}
