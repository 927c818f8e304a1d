//! # vial
//!
//! A small web framework built around one idea: the request being handled
//! is reachable from anywhere on the thread that handles it.
//!
//! Every request gets a [`RequestContext`] that is pushed on a thread-local
//! stack for the duration of dispatch. View functions don't take a request
//! argument; they read [`REQUEST`], [`SESSION`], [`G`] and [`CURRENT_APP`],
//! proxies that resolve to the innermost frame of that stack at the moment
//! they are used.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vial::{App, REQUEST, SESSION, redirect, url_for};
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = App::new()
//!         .secret_key("change me")
//!         .route("/", "index", |_| Ok("Yet another hello!"))
//!         .route("/hello/{name}", "hello", |params| {
//!             let agent = REQUEST.get()?.header("user-agent").unwrap_or("?").to_owned();
//!             Ok(format!("hello {}, from {agent}", params.get("name").unwrap_or("stranger")))
//!         })
//!         .route("/login", "login", |_| {
//!             if let Some(session) = SESSION.get()?.as_ref() {
//!                 session.insert("user", "admin");
//!             }
//!             Ok(redirect(&url_for("index", &[])?))
//!         });
//!
//!     Arc::new(app).run("127.0.0.1:5000").await.unwrap();
//! }
//! ```
//!
//! ## Threads and async
//!
//! The stack is per OS thread. [`App::handle`] runs a request from push to
//! pop without yielding, so the server can read bodies asynchronously on
//! tokio and still hand each worker thread a coherent stack. Frames are held
//! in `Rc`s, so a context never migrates to another thread.

mod app;
mod config;
mod context;
mod error;
mod handler;
mod helpers;
mod reply;
mod request;
mod response;
mod router;
mod server;
mod session;
mod templating;
mod testing;
mod urls;

pub mod proxy;
pub mod stack;

pub use app::App;
pub use config::Config;
pub use context::{
    CURRENT_APP, ContextGuard, ContextState, G, Globals, REQUEST, REQUEST_STACK, RequestContext, SESSION,
};
pub use error::{ContextError, Error, HttpError, Result};
pub use helpers::{abort, flash, get_flashed_messages, redirect, url_for};
pub use proxy::LocalProxy;
pub use reply::{IntoReply, NestedApp, Reply};
pub use request::{Request, RequestBuilder};
pub use response::{ContentType, Response, ResponseBuilder};
pub use router::{Params, RouteMatch, Router};
pub use server::Server;
pub use session::{Session, SessionInterface, SignedCookieSessions};
pub use stack::LocalStack;
pub use templating::{TemplateEngine, render_template, render_template_string};
pub use testing::TestClient;
