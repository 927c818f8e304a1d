//! Application configuration.

use std::fmt;

/// Settings read by the dispatcher and the default session codec.
///
/// Usually set through the chained methods on [`App`](crate::App)
/// (`App::new().debug(true).secret_key("...")`).
#[derive(Clone, Default)]
pub struct Config {
    pub(crate) debug: bool,
    pub(crate) secret_key: Option<Vec<u8>>,
    pub(crate) session_cookie_name: Option<String>,
}

impl Config {
    pub const DEFAULT_SESSION_COOKIE: &'static str = "session";

    /// Debug mode: unhandled failures propagate even when a 500 handler is
    /// registered, and the failing request's context is left on the stack.
    pub fn debug(&self) -> bool { self.debug }

    /// Key used to sign the session cookie. Without one, requests get no
    /// session at all.
    pub fn secret_key(&self) -> Option<&[u8]> { self.secret_key.as_deref() }

    pub fn session_cookie_name(&self) -> &str {
        self.session_cookie_name.as_deref().unwrap_or(Self::DEFAULT_SESSION_COOKIE)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("debug", &self.debug)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("session_cookie_name", &self.session_cookie_name())
            .finish()
    }
}
