//! The application registry and the request dispatcher.
//!
//! An [`App`] is built once at startup by chaining registration calls, then
//! shared behind an `Arc` for the rest of the process. Registration order is
//! kept: hooks run in the order they were added.
//!
//! # One request, start to finish
//!
//! [`App::handle`] drives a request through these steps, all on the calling
//! thread:
//!
//! 1. build a [`RequestContext`] and push it;
//! 2. run `before_request` hooks; the first one returning `Some` short-circuits;
//! 3. otherwise match the URL and call the view function, routing failures
//!    through the registered error handlers;
//! 4. normalize the [`Reply`] into a [`Response`];
//! 5. save the session into the response, then run `after_request` hooks;
//! 6. pop the context, or keep it on the stack when an unhandled failure
//!    escapes in debug mode.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::{Method, StatusCode};
use serde_json::{Map, Value};
use tracing::{debug, error, info_span};

use crate::config::Config;
use crate::context::{ContextGuard, RequestContext};
use crate::error::{Error, HttpError};
use crate::handler::{AfterHook, BeforeHook, BoxedHandler, ContextProcessor, ErrorHandler, FnHandler};
use crate::reply::{IntoReply, Reply};
use crate::request::Request;
use crate::response::Response;
use crate::router::{Params, Router};
use crate::server::Server;
use crate::session::{Session, SessionInterface, SignedCookieSessions};
use crate::templating::{self, TemplateEngine};
use crate::testing::TestClient;

/// The central registry: URL map, view functions, error handlers, hooks,
/// configuration.
///
/// ```rust
/// use std::sync::Arc;
/// use vial::{App, Request};
///
/// let app = Arc::new(
///     App::new().route("/", "index", |_| Ok("Yet another hello!")),
/// );
///
/// let resp = app.handle(Request::get("/")).unwrap();
/// assert_eq!(resp.body(), b"Yet another hello!");
/// ```
pub struct App {
    config: Config,
    router: Router,
    view_functions: HashMap<String, BoxedHandler>,
    error_handlers: HashMap<StatusCode, ErrorHandler>,
    before_request: Vec<BeforeHook>,
    after_request: Vec<AfterHook>,
    context_processors: Vec<ContextProcessor>,
    session_interface: Box<dyn SessionInterface>,
    templates: Option<Box<dyn TemplateEngine>>,
}

impl App {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            router: Router::new(),
            view_functions: HashMap::new(),
            error_handlers: HashMap::new(),
            before_request: Vec::new(),
            after_request: Vec::new(),
            context_processors: Vec::new(),
            session_interface: Box::new(SignedCookieSessions),
            templates: None,
        }
    }

    // ── Configuration ────────────────────────────────────────────────────────

    pub fn config(&self) -> &Config { &self.config }
    pub fn router(&self) -> &Router { &self.router }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        self
    }

    /// Enables sessions, signed with `key`.
    pub fn secret_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.config.secret_key = Some(key.into());
        self
    }

    pub fn session_cookie_name(mut self, name: &str) -> Self {
        self.config.session_cookie_name = Some(name.to_owned());
        self
    }

    pub fn session_interface(mut self, interface: impl SessionInterface + 'static) -> Self {
        self.session_interface = Box::new(interface);
        self
    }

    pub fn template_engine(mut self, engine: impl TemplateEngine + 'static) -> Self {
        self.templates = Some(Box::new(engine));
        self
    }

    pub(crate) fn templates(&self) -> Option<&dyn TemplateEngine> {
        self.templates.as_deref()
    }

    // ── Registration ─────────────────────────────────────────────────────────

    /// Registers a `GET` view function for `rule` under `endpoint`.
    ///
    /// Rules use `{name}` for one segment and `{*name}` for the rest of the
    /// path; the handler receives them as [`Params`].
    ///
    /// # Panics
    ///
    /// Panics if the rule is malformed, already registered, or `endpoint`
    /// already has a different view function.
    pub fn route<F, R>(self, rule: &str, endpoint: &str, handler: F) -> Self
    where
        F: Fn(&Params) -> anyhow::Result<R> + Send + Sync + 'static,
        R: IntoReply + 'static,
    {
        self.route_methods(&[Method::GET], rule, endpoint, handler)
    }

    /// Like [`route`](Self::route), for an explicit set of methods.
    pub fn route_methods<F, R>(self, methods: &[Method], rule: &str, endpoint: &str, handler: F) -> Self
    where
        F: Fn(&Params) -> anyhow::Result<R> + Send + Sync + 'static,
        R: IntoReply + 'static,
    {
        self.add_url_rule(methods, rule, endpoint).view(endpoint, handler)
    }

    /// Connects a URL rule to an endpoint without attaching a view function.
    /// Useful for URLs that are only ever built, never served.
    pub fn add_url_rule(mut self, methods: &[Method], rule: &str, endpoint: &str) -> Self {
        self.router.add(rule, endpoint, methods);
        self
    }

    /// Attaches the view function for `endpoint`.
    ///
    /// # Panics
    ///
    /// Panics if `endpoint` already has one.
    pub fn view<F, R>(mut self, endpoint: &str, handler: F) -> Self
    where
        F: Fn(&Params) -> anyhow::Result<R> + Send + Sync + 'static,
        R: IntoReply + 'static,
    {
        if self.view_functions.contains_key(endpoint) {
            panic!("endpoint `{endpoint}` already has a view function");
        }
        self.view_functions.insert(endpoint.to_owned(), Box::new(FnHandler(handler)));
        self
    }

    /// Registers the handler for failures with `status`.
    ///
    /// A `500` handler also receives every failure that is not an
    /// [`HttpError`], unless debug mode is on.
    pub fn error_handler<F, R>(mut self, status: StatusCode, handler: F) -> Self
    where
        F: Fn(&anyhow::Error) -> anyhow::Result<R> + Send + Sync + 'static,
        R: IntoReply + 'static,
    {
        self.error_handlers.insert(
            status,
            Box::new(move |err: &anyhow::Error| handler(err).map(IntoReply::into_reply)),
        );
        self
    }

    /// Registers a hook run before every request.
    pub fn before_request<F, R>(mut self, hook: F) -> Self
    where
        F: Fn() -> anyhow::Result<Option<R>> + Send + Sync + 'static,
        R: IntoReply + 'static,
    {
        self.before_request.push(Box::new(move || hook().map(|reply| reply.map(IntoReply::into_reply))));
        self
    }

    /// Registers a hook run after every successful request. Each hook gets
    /// the response the previous one returned.
    pub fn after_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(Response) -> anyhow::Result<Response> + Send + Sync + 'static,
    {
        self.after_request.push(Box::new(hook));
        self
    }

    /// Registers a function whose variables are merged into every template
    /// context.
    pub fn context_processor<F>(mut self, processor: F) -> Self
    where
        F: Fn() -> Map<String, Value> + Send + Sync + 'static,
    {
        self.context_processors.push(Box::new(processor));
        self
    }

    // ── Contexts ─────────────────────────────────────────────────────────────

    /// Builds (without pushing) the context for `request`.
    pub fn request_context(self: &Arc<Self>, request: Request) -> std::rc::Rc<RequestContext> {
        RequestContext::new(Arc::clone(self), request)
    }

    /// Builds and pushes a context, for tests and scripts that need the
    /// proxies without going through dispatch.
    pub fn test_request_context(self: &Arc<Self>, request: Request) -> ContextGuard {
        self.request_context(request).enter()
    }

    /// A client that dispatches through [`handle`](Self::handle) and keeps
    /// cookies between requests.
    pub fn test_client(self: &Arc<Self>) -> TestClient {
        TestClient::new(Arc::clone(self))
    }

    pub fn open_session(&self, request: &Request) -> Option<Session> {
        self.session_interface.open_session(&self.config, request)
    }

    pub fn save_session(&self, session: &Session, response: &mut Response) {
        self.session_interface.save_session(&self.config, session, response);
    }

    /// Adds `request`, `session`, `g` and every context processor's output
    /// to `context`. Processor values replace caller-supplied ones.
    pub fn update_template_context(&self, ctx: &RequestContext, context: &mut Map<String, Value>) {
        context.extend(templating::default_context(ctx));
        for processor in &self.context_processors {
            context.extend(processor());
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    /// Handles one request on the calling thread.
    ///
    /// Returns `Err` only for failures that nothing turned into a response:
    /// a failing hook, a failing error handler, or an unrecognized handler
    /// failure with no `500` handler or with debug mode on. In debug mode
    /// the request's context is then left on this thread's stack.
    pub fn handle(self: &Arc<Self>, request: Request) -> Result<Response, Error> {
        let span = info_span!("request", method = %request.method(), path = request.path());
        let _entered = span.enter();

        let guard = self.request_context(request).enter();
        match self.full_dispatch(&guard) {
            Ok(response) => {
                debug!(status = response.status_code().as_u16(), "request completed");
                guard.close()?;
                Ok(response)
            }
            Err(err) => {
                error!(error = %err, "unhandled failure");
                if self.config.debug {
                    guard.retain();
                } else {
                    guard.close()?;
                }
                Err(Error::Unhandled(err))
            }
        }
    }

    fn full_dispatch(&self, ctx: &RequestContext) -> anyhow::Result<Response> {
        let reply = match self.preprocess_request()? {
            Some(reply) => reply,
            None => self.dispatch_request(ctx)?,
        };
        let response = self.make_response(reply, ctx.request());
        self.process_response(ctx, response)
    }

    /// Runs the `before_request` hooks in order; the first `Some` wins.
    pub fn preprocess_request(&self) -> anyhow::Result<Option<Reply>> {
        for hook in &self.before_request {
            if let Some(reply) = hook()? {
                debug!("before_request hook short-circuited the request");
                return Ok(Some(reply));
            }
        }
        Ok(None)
    }

    /// Matches the URL and calls the view function, diverting failures to
    /// the registered error handlers.
    pub fn dispatch_request(&self, ctx: &RequestContext) -> anyhow::Result<Reply> {
        let outcome = match ctx.match_request() {
            Ok(matched) => match self.view_functions.get(matched.endpoint()) {
                Some(view) => view.call(matched.params()),
                None => Err(anyhow::anyhow!(
                    "no view function registered for endpoint `{}`",
                    matched.endpoint(),
                )),
            },
            Err(http_error) => Err(http_error.into()),
        };
        outcome.or_else(|err| self.handle_failure(err))
    }

    fn handle_failure(&self, err: anyhow::Error) -> anyhow::Result<Reply> {
        if let Some(http_error) = err.downcast_ref::<HttpError>() {
            return match self.error_handlers.get(&http_error.status()) {
                Some(handler) => handler(&err),
                None => Ok(Reply::Response(http_error.to_response())),
            };
        }
        match self.error_handlers.get(&StatusCode::INTERNAL_SERVER_ERROR) {
            Some(handler) if !self.config.debug => {
                error!(error = %err, "handler failed, answering with the 500 handler");
                handler(&err)
            }
            _ => Err(err),
        }
    }

    /// Normalizes a reply into the canonical response.
    pub fn make_response(&self, reply: Reply, request: &Request) -> Response {
        reply.into_response(request)
    }

    /// Saves the session into `response`, then threads it through the
    /// `after_request` hooks in order.
    pub fn process_response(&self, ctx: &RequestContext, mut response: Response) -> anyhow::Result<Response> {
        if let Some(session) = ctx.session() {
            self.save_session(session, &mut response);
        }
        for hook in &self.after_request {
            response = hook(response)?;
        }
        Ok(response)
    }

    // ── Serving ──────────────────────────────────────────────────────────────

    /// Serves the application on `addr` until SIGTERM / Ctrl-C.
    pub async fn run(self: Arc<Self>, addr: &str) -> Result<(), Error> {
        Server::bind(addr).serve(self).await
    }
}

impl Default for App {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("endpoints", &self.view_functions.keys().collect::<Vec<_>>())
            .field("before_request", &self.before_request.len())
            .field("after_request", &self.after_request.len())
            .finish_non_exhaustive()
    }
}
