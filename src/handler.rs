//! Callback storage and type erasure.
//!
//! The application keeps view functions, hooks and error handlers of many
//! different closure types in a handful of collections. Each kind is boxed
//! behind one trait object so it can be stored uniformly:
//!
//! ```text
//! fn index(_: &Params) -> anyhow::Result<&'static str>   ← user writes this
//!        ↓ App::route("/", "index", index)
//! Box::new(FnHandler(index))                             ← BoxedHandler
//!        ↓ dispatch
//! handler.call(&params)?.into_reply()                    ← one vtable call
//! ```
//!
//! All callbacks are synchronous: a request runs start to finish on one
//! thread, which is what keeps the thread-local context stack coherent.

use serde_json::{Map, Value};

use crate::reply::{IntoReply, Reply};
use crate::response::Response;
use crate::router::Params;

/// Internal dispatch interface for view functions.
pub(crate) trait ErasedHandler {
    fn call(&self, params: &Params) -> anyhow::Result<Reply>;
}

pub(crate) type BoxedHandler = Box<dyn ErasedHandler + Send + Sync + 'static>;

/// Newtype bridging a concrete closure to [`ErasedHandler`].
pub(crate) struct FnHandler<F>(pub(crate) F);

impl<F, R> ErasedHandler for FnHandler<F>
where
    F: Fn(&Params) -> anyhow::Result<R> + Send + Sync,
    R: IntoReply,
{
    fn call(&self, params: &Params) -> anyhow::Result<Reply> {
        (self.0)(params).map(IntoReply::into_reply)
    }
}

/// Runs before the view; `Some` short-circuits the request.
pub(crate) type BeforeHook = Box<dyn Fn() -> anyhow::Result<Option<Reply>> + Send + Sync>;

/// Runs after the view; may replace the response.
pub(crate) type AfterHook = Box<dyn Fn(Response) -> anyhow::Result<Response> + Send + Sync>;

/// Turns a failure into a reply. Receives the original error, so an
/// [`HttpError`](crate::HttpError) can be recovered with `downcast_ref`.
pub(crate) type ErrorHandler = Box<dyn Fn(&anyhow::Error) -> anyhow::Result<Reply> + Send + Sync>;

/// Contributes variables to every template context.
pub(crate) type ContextProcessor = Box<dyn Fn() -> Map<String, Value> + Send + Sync>;
