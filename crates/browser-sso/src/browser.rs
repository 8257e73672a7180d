//! Opening the identity provider URL.

use crate::{AuthError, AuthResult};
use tracing::info;

/// Something that can show a URL to the user.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> AuthResult<()>;
}

/// The platform default browser, via the `open` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> AuthResult<()> {
        info!("Opening system browser for SSO login");
        open::that_detached(url).map_err(|e| AuthError::BrowserLaunch(e.to_string()))
    }
}
