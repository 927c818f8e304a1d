//! Free functions that act on the current request.
//!
//! Each one reads the innermost frame of [`REQUEST_STACK`], so it works
//! from inside a view function, a hook, or a test context, and fails with
//! [`ContextError::NoActiveContext`](crate::ContextError::NoActiveContext)
//! anywhere else.

use http::StatusCode;

use crate::context::REQUEST_STACK;
use crate::error::{HttpError, Result};
use crate::response::Response;

/// Builds the URL for `endpoint`. Values that do not fill a placeholder are
/// appended as the query string.
///
/// ```rust
/// use std::sync::Arc;
/// use vial::{App, Request, url_for};
///
/// let app = Arc::new(App::new().route("/users/{id}", "user", |_| Ok("")));
/// let _ctx = app.test_request_context(Request::get("/"));
/// assert_eq!(url_for("user", &[("id", "7"), ("tab", "posts")]).unwrap(), "/users/7?tab=posts");
/// ```
pub fn url_for(endpoint: &str, params: &[(&str, &str)]) -> Result<String> {
    REQUEST_STACK.top()?.url_for(endpoint, params)
}

/// Queues `message` in the session for the next request that asks for it.
pub fn flash(message: impl Into<String>) -> Result<()> {
    REQUEST_STACK.top()?.flash(message)
}

/// Takes the messages flashed by earlier requests. Repeated calls within one
/// request return the same list.
pub fn get_flashed_messages() -> Result<Vec<String>> {
    let ctx = REQUEST_STACK.top()?;
    let messages = ctx.flashed_messages()?.to_vec();
    Ok(messages)
}

/// Stops the current view with an HTTP error.
///
/// ```rust
/// use http::StatusCode;
/// use vial::{Params, abort};
///
/// fn show(params: &Params) -> anyhow::Result<String> {
///     let Some(id) = params.get("id") else { return abort(StatusCode::NOT_FOUND) };
///     Ok(format!("item {id}"))
/// }
/// # let _ = show;
/// ```
pub fn abort<T>(status: StatusCode) -> anyhow::Result<T> {
    Err(HttpError::new(status).into())
}

/// A `302 Found` pointing at `location`.
pub fn redirect(location: &str) -> Response {
    Response::redirect(location)
}
