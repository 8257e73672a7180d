//! Browser single-sign-on for the snowlink session core.
//!
//! This crate provides:
//! - A single-shot loopback HTTP listener that receives the identity provider redirect
//! - An explicit FSM per authentication attempt
//! - The authenticator tying cached identity tokens, the browser, and login together
//! - A REST seam for the authenticator and login requests, with a reqwest implementation

mod authenticator;
mod browser;
mod callback;
mod error;
mod proof_key;
mod rest;
mod sso_fsm;

pub use authenticator::{
    console_login_url, BrowserSsoAuthenticator, BrowserSsoToken, SsoLogin, SsoTarget,
};
pub use browser::{BrowserLauncher, SystemBrowser};
pub use callback::{CallbackListener, PendingCallback, TOKEN_QUERY_PREFIX};
pub use error::{AuthError, AuthResult};
pub use proof_key::ProofKey;
pub use rest::{
    AuthenticatorRequest, AuthenticatorRequestData, AuthenticatorResponse,
    AuthenticatorResponseData, HttpSsoRestClient, LoginRequest, LoginRequestData, LoginResponse,
    LoginResponseData, RequestEnvelope, ResponseEnvelope, SsoRestClient,
    AUTHENTICATOR_EXTERNAL_BROWSER, AUTHENTICATOR_ID_TOKEN, ID_TOKEN_INVALID_CODE,
};
pub use sso_fsm::sso_machine;
pub use sso_fsm::{SsoAttempt, SsoMachine, SsoMachineInput, SsoMachineState};
