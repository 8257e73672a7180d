//! Browser SSO authenticator.
//!
//! One call to [`BrowserSsoAuthenticator::authenticate`] is one attempt:
//! try the cached identity token, otherwise bind a loopback listener, send the
//! user to the identity provider, wait for the redirect and log in with the
//! returned token and the attempt's proof key.

use crate::browser::{BrowserLauncher, SystemBrowser};
use crate::callback::{CallbackListener, PendingCallback};
use crate::proof_key::ProofKey;
use crate::rest::{
    AuthenticatorRequest, AuthenticatorRequestData, LoginRequest, LoginRequestData,
    LoginResponse, LoginResponseData, SsoRestClient, AUTHENTICATOR_EXTERNAL_BROWSER,
    AUTHENTICATOR_ID_TOKEN, ID_TOKEN_INVALID_CODE,
};
use crate::sso_fsm::{SsoAttempt, SsoMachineInput};
use crate::{AuthError, AuthResult};
use credential_storage::{CredentialKey, CredentialStore, StorageResult};
use driver_config_and_utils::SsoConfig;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

const CLIENT_APP_ID: &str = "snowlink";
const CLIENT_STORE_TEMPORARY_CREDENTIAL: &str = "CLIENT_STORE_TEMPORARY_CREDENTIAL";

/// Who is logging in, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoTarget {
    /// Account name sent in request bodies.
    pub account: String,
    /// Server host, e.g. `acct.example.com`.
    pub host: String,
    /// Login name.
    pub user: String,
}

impl SsoTarget {
    pub fn new(account: impl Into<String>, host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            host: host.into(),
            user: user.into(),
        }
    }

    fn id_token_key(&self) -> String {
        CredentialKey::id_token(&self.host, &self.user).to_string()
    }
}

/// Token delivered by the browser redirect, bound to its attempt's proof key.
pub struct BrowserSsoToken {
    pub token: String,
    pub proof_key: ProofKey,
}

impl fmt::Debug for BrowserSsoToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserSsoToken")
            .field("token", &"<redacted>")
            .field("proof_key", &self.proof_key)
            .finish()
    }
}

/// Result of a successful authentication.
#[derive(Debug, Clone)]
pub struct SsoLogin {
    pub data: LoginResponseData,
    /// Whether the cached identity token was accepted and the browser skipped.
    pub used_cached_token: bool,
}

/// Build the console-login URL that embeds the callback port and proof key.
pub fn console_login_url(host: &str, user: &str, port: u16, proof_key: &ProofKey) -> AuthResult<Url> {
    let mut url = Url::parse(&format!("https://{}/console/login", host))?;
    url.query_pairs_mut()
        .append_pair("login_name", user)
        .append_pair("browser_mode_redirect_port", &port.to_string())
        .append_pair("proof_key", proof_key.as_str());
    Ok(url)
}

/// Runs browser SSO attempts for one target.
pub struct BrowserSsoAuthenticator {
    target: SsoTarget,
    config: SsoConfig,
    rest: Arc<dyn SsoRestClient>,
    launcher: Arc<dyn BrowserLauncher>,
    credentials: Arc<dyn CredentialStore>,
    client_app_id: String,
    client_app_version: String,
}

impl BrowserSsoAuthenticator {
    /// Create an authenticator that opens the system browser.
    pub fn new(
        target: SsoTarget,
        config: SsoConfig,
        rest: Arc<dyn SsoRestClient>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            target,
            config,
            rest,
            launcher: Arc::new(SystemBrowser),
            credentials,
            client_app_id: CLIENT_APP_ID.to_string(),
            client_app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Replace the browser launcher.
    pub fn with_launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Override the client application id and version reported to the server.
    pub fn with_client_app(mut self, id: impl Into<String>, version: impl Into<String>) -> Self {
        self.client_app_id = id.into();
        self.client_app_version = version.into();
        self
    }

    pub fn target(&self) -> &SsoTarget {
        &self.target
    }

    /// Authenticate, preferring a cached identity token over the browser.
    pub async fn authenticate(&self) -> AuthResult<SsoLogin> {
        if self.config.client_store_temporary_credential {
            if let Some(login) = self.login_with_cached_token().await? {
                return Ok(login);
            }
        }

        let browser_token = self.run_browser_flow().await?;
        let request = self.login_request(
            AUTHENTICATOR_EXTERNAL_BROWSER,
            browser_token.token,
            Some(browser_token.proof_key.as_str().to_string()),
        );
        let data = expect_success(self.rest.login(&request).await?)?;

        if self.config.client_store_temporary_credential {
            if let Some(id_token) = data.id_token.clone() {
                let key = self.target.id_token_key();
                self.with_store(move |store| store.save(&key, &id_token)).await?;
                debug!(user = %self.target.user, "Cached identity token");
            }
        }

        info!(user = %self.target.user, host = %self.target.host, "Browser SSO login succeeded");
        Ok(SsoLogin {
            data,
            used_cached_token: false,
        })
    }

    /// Run the interactive part of one attempt and return the redirected token.
    pub async fn run_browser_flow(&self) -> AuthResult<BrowserSsoToken> {
        let mut attempt = SsoAttempt::new();

        let (pending, proof_key) = match self.start_listener().await {
            Ok(started) => started,
            Err(e) => {
                attempt.advance(SsoMachineInput::SetupFailed)?;
                return Err(e);
            }
        };
        attempt.advance(SsoMachineInput::ListenerReady)?;

        let port = pending.port();
        let timeout = self.config.browser_response_timeout();
        debug!(port, timeout = ?timeout, "Waiting for SSO callback");

        let outcome = pending.wait(timeout).await;
        attempt.record_wait_outcome(&outcome)?;
        let token = outcome?;

        info!(port, "Received SSO token from browser");
        Ok(BrowserSsoToken { token, proof_key })
    }

    /// Bind the listener, resolve the login URL and open the browser.
    async fn start_listener(&self) -> AuthResult<(PendingCallback, ProofKey)> {
        let listener = CallbackListener::bind().await?;
        let (url, proof_key) = self.login_url(listener.port()).await?;

        let pending = listener.spawn();
        self.launcher.open(&url)?;
        Ok((pending, proof_key))
    }

    async fn login_url(&self, port: u16) -> AuthResult<(String, ProofKey)> {
        if !self.config.disable_console_login {
            let proof_key = ProofKey::generate();
            let url = console_login_url(&self.target.host, &self.target.user, port, &proof_key)?;
            return Ok((url.into(), proof_key));
        }

        let request = AuthenticatorRequest::new(AuthenticatorRequestData {
            account_name: self.target.account.clone(),
            login_name: self.target.user.clone(),
            authenticator: AUTHENTICATOR_EXTERNAL_BROWSER.to_string(),
            browser_mode_redirect_port: port.to_string(),
            client_app_id: self.client_app_id.clone(),
            client_app_version: self.client_app_version.clone(),
        });
        let response = self.rest.request_authenticator(&request).await?;

        match response.data {
            Some(data) if response.success => Ok((data.sso_url, ProofKey::from_server(data.proof_key))),
            _ => Err(AuthError::Authenticator(
                response
                    .message
                    .unwrap_or_else(|| "Server returned no SSO URL".to_string()),
            )),
        }
    }

    /// Log in with the cached identity token, if there is one.
    ///
    /// A token the server reports as invalid is removed so the browser flow
    /// runs instead.
    async fn login_with_cached_token(&self) -> AuthResult<Option<SsoLogin>> {
        let key = self.target.id_token_key();
        let Some(cached) = self.with_store(move |store| store.get(&key)).await? else {
            return Ok(None);
        };

        let mut attempt = SsoAttempt::new();
        attempt.advance(SsoMachineInput::CachedTokenFound)?;

        let request = self.login_request(AUTHENTICATOR_ID_TOKEN, cached, None);
        let response = self.rest.login(&request).await?;

        if !response.success && response.code.as_deref() == Some(ID_TOKEN_INVALID_CODE) {
            warn!(user = %self.target.user, "Cached identity token rejected, falling back to browser");
            let key = self.target.id_token_key();
            self.with_store(move |store| store.remove(&key)).await?;
            return Ok(None);
        }

        let data = expect_success(response)?;
        info!(user = %self.target.user, "Logged in with cached identity token");
        Ok(Some(SsoLogin {
            data,
            used_cached_token: true,
        }))
    }

    fn login_request(&self, authenticator: &str, token: String, proof_key: Option<String>) -> LoginRequest {
        let mut session_parameters = BTreeMap::new();
        if self.config.client_store_temporary_credential {
            session_parameters.insert(
                CLIENT_STORE_TEMPORARY_CREDENTIAL.to_string(),
                serde_json::Value::Bool(true),
            );
        }

        LoginRequest::new(LoginRequestData {
            account_name: self.target.account.clone(),
            login_name: self.target.user.clone(),
            authenticator: authenticator.to_string(),
            token: Some(token),
            proof_key,
            client_app_id: self.client_app_id.clone(),
            client_app_version: self.client_app_version.clone(),
            session_parameters,
        })
    }

    /// Run a credential store call off the async executor.
    async fn with_store<T, F>(&self, f: F) -> AuthResult<T>
    where
        F: FnOnce(&dyn CredentialStore) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.credentials);
        let result = tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| AuthError::Internal(format!("Credential store task failed: {}", e)))?;
        Ok(result?)
    }
}

fn expect_success(response: LoginResponse) -> AuthResult<LoginResponseData> {
    if response.success {
        return Ok(response.data.unwrap_or_default());
    }
    Err(AuthError::Login {
        code: response.code.unwrap_or_else(|| "unknown".to_string()),
        message: response.message.unwrap_or_default(),
    })
}
