//! Error types.
//!
//! Three families:
//!
//! - [`ContextError`]: misuse of the context stack. Always a programming
//!   error; nothing in vial catches it.
//! - [`HttpError`]: a handler deliberately answering with a status code
//!   (`abort(StatusCode::FORBIDDEN)`). Recoverable via a registered error
//!   handler, otherwise rendered as-is.
//! - [`Error`]: what [`App::handle`](crate::App::handle) and the helper
//!   functions return to their caller.

use std::fmt;

use http::StatusCode;
use thiserror::Error;

use crate::response::Response;
use crate::urls::escape_html;

/// Failure to resolve the context stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// A proxy or helper was used outside any active request context.
    #[error("working outside of request context")]
    NoActiveContext,
    /// `pop()` without a matching `push()`.
    #[error("pop from an empty context stack")]
    EmptyStack,
    /// A context was closed while one pushed after it is still active.
    #[error("request context closed while an inner context is still active")]
    NotInnermost,
}

/// An HTTP-level failure raised from inside a handler.
///
/// Return it through `anyhow` (`Err(HttpError::new(..).into())` or
/// [`abort`](crate::abort)); the dispatcher recognises it by downcasting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    status: StatusCode,
    description: Option<String>,
    allow: Vec<http::Method>,
}

impl HttpError {
    pub fn new(status: StatusCode) -> Self {
        Self { status, description: None, allow: Vec::new() }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND).with_description(
            "The requested URL was not found on the server.",
        )
    }

    pub(crate) fn method_not_allowed(allow: Vec<http::Method>) -> Self {
        Self {
            status: StatusCode::METHOD_NOT_ALLOWED,
            description: Some("The method is not allowed for the requested URL.".to_owned()),
            allow,
        }
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn description(&self) -> Option<&str> { self.description.as_deref() }

    /// Methods the path does accept; only set for `405` errors.
    pub fn allowed_methods(&self) -> &[http::Method] { &self.allow }

    /// Renders the error as a small HTML page carrying its status.
    pub fn to_response(&self) -> Response {
        let reason = self.status.canonical_reason().unwrap_or("Unknown Error");
        let mut body = format!(
            "<!doctype html>\n<title>{code} {reason}</title>\n<h1>{reason}</h1>\n",
            code = self.status.as_u16(),
        );
        if let Some(description) = &self.description {
            body.push_str(&format!("<p>{}</p>\n", escape_html(description)));
        }
        let mut builder = Response::builder().status(self.status);
        if !self.allow.is_empty() {
            let allow = self.allow.iter().map(http::Method::as_str).collect::<Vec<_>>().join(", ");
            builder = builder.header("allow", &allow);
        }
        builder.html(body)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status)?;
        if let Some(description) = &self.description {
            write!(f, ": {description}")?;
        }
        Ok(())
    }
}

impl std::error::Error for HttpError {}

/// The error type returned by vial's fallible operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Context(#[from] ContextError),

    /// A handler or hook failed and nothing was registered to turn the
    /// failure into a response (or debug mode is on).
    #[error(transparent)]
    Unhandled(anyhow::Error),

    #[error("could not build url for endpoint `{endpoint}`: {reason}")]
    Build { endpoint: String, reason: String },

    #[error("the session is unavailable because no secret key was set")]
    SessionUnavailable,

    #[error("no template engine configured")]
    NoTemplateEngine,

    #[error("template rendering failed: {0}")]
    Template(anyhow::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Shorthand for `Result<T, vial::Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
