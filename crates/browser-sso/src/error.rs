//! Browser SSO error types.

use std::time::Duration;
use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// No callback arrived within the configured window
    #[error("Browser SSO timed out after {0:?} waiting for the identity provider redirect")]
    Timeout(Duration),

    /// Callback request used a method other than GET
    #[error("Browser SSO callback used HTTP method {0}, expected GET")]
    InvalidHttpMethod(String),

    /// Callback query did not start with `?token=`
    #[error("Browser SSO callback query does not start with ?token=")]
    InvalidQueryPrefix,

    /// Callback carried `?token=` with nothing after it
    #[error("Browser SSO callback carried an empty token")]
    MissingToken,

    /// The local listener could not be started or stopped early
    #[error("Callback listener error: {0}")]
    CallbackListener(String),

    /// The system browser could not be opened
    #[error("Failed to open browser: {0}")]
    BrowserLaunch(String),

    /// The server refused to issue an SSO URL
    #[error("Authenticator request rejected: {0}")]
    Authenticator(String),

    /// The login request was rejected
    #[error("Login failed ({code}): {message}")]
    Login { code: String, message: String },

    /// Invalid state transition in the SSO FSM
    #[error("Invalid SSO state transition: {0}")]
    InvalidStateTransition(String),

    /// Credential store error
    #[error("Credential store error: {0}")]
    Storage(#[from] credential_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Background task failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Only transport failures qualify: connection errors, HTTP timeouts and
    /// 5xx responses. A browser timeout is final.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }

    /// Returns true if the callback request itself was malformed.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidHttpMethod(_) | AuthError::InvalidQueryPrefix | AuthError::MissingToken
        )
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_names_duration() {
        let message = AuthError::Timeout(Duration::from_secs(1)).to_string();
        assert!(message.contains("1s"), "{}", message);
    }

    #[test]
    fn test_protocol_violations() {
        assert!(AuthError::InvalidHttpMethod("POST".to_string()).is_protocol_violation());
        assert!(AuthError::InvalidQueryPrefix.is_protocol_violation());
        assert!(AuthError::MissingToken.is_protocol_violation());
        assert!(!AuthError::Timeout(Duration::from_secs(1)).is_protocol_violation());
    }

    #[test]
    fn test_is_not_transient() {
        assert!(!AuthError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!AuthError::InvalidQueryPrefix.is_transient());
        assert!(!AuthError::Login {
            code: "390100".to_string(),
            message: "Incorrect username or password".to_string(),
        }
        .is_transient());
    }
}
