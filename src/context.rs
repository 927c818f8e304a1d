//! The request frame and the process-wide proxies onto it.
//!
//! # Lifecycle
//!
//! ```text
//! RequestContext::new ──► Created
//!        │ enter()
//!        ▼
//!      Active ── ContextGuard::close() ──► Completed   (popped)
//!        │
//!        └────── ContextGuard::retain() ─► Retained    (left on the stack)
//! ```
//!
//! `Retained` is reserved for one case: a failure escaped the dispatcher
//! while the application is in debug mode. The frame stays on the thread's
//! stack so whoever catches the failure on that thread can still read
//! `REQUEST`, `SESSION` and `G` as they were at the point of failure. Session
//! save and post-request hooks are skipped on that path.

use std::cell::{Cell, OnceCell, Ref, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::app::App;
use crate::error::{ContextError, Error, HttpError};
use crate::proxy::LocalProxy;
use crate::request::Request;
use crate::router::RouteMatch;
use crate::session::Session;
use crate::stack::{Frames, LocalStack};

const FLASHES_KEY: &str = "_flashes";

thread_local! {
    static REQUEST_FRAMES: Frames<RequestContext> = const { RefCell::new(Vec::new()) };
}

/// Every thread's stack of active request contexts.
pub static REQUEST_STACK: LocalStack<RequestContext> = LocalStack::new(&REQUEST_FRAMES);

/// The application handling the current request.
pub static CURRENT_APP: LocalProxy<RequestContext, Arc<App>> =
    LocalProxy::new(&REQUEST_STACK, RequestContext::app);

/// The current request.
pub static REQUEST: LocalProxy<RequestContext, Request> =
    LocalProxy::new(&REQUEST_STACK, RequestContext::request);

/// The current session; `None` when the application has no secret key.
pub static SESSION: LocalProxy<RequestContext, Option<Session>> =
    LocalProxy::new(&REQUEST_STACK, RequestContext::session_slot);

/// Per-request scratch space.
pub static G: LocalProxy<RequestContext, Globals> =
    LocalProxy::new(&REQUEST_STACK, RequestContext::globals);

/// Where a frame is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextState {
    Created,
    Active,
    Completed,
    Retained,
}

/// Scratch values a request's hooks and handlers share with each other.
///
/// Starts empty for every request and is dropped with it.
#[derive(Debug, Default)]
pub struct Globals(RefCell<Map<String, Value>>);

impl Globals {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.borrow().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.borrow_mut().insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.borrow_mut().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    /// A copy of the current contents.
    pub fn to_map(&self) -> Map<String, Value> {
        self.0.borrow().clone()
    }
}

/// Everything known about one request while it is being handled.
pub struct RequestContext {
    app: Arc<App>,
    request: Request,
    session: Option<Session>,
    globals: Globals,
    flashes: RefCell<Option<Vec<String>>>,
    route_match: OnceCell<RouteMatch>,
    state: Cell<ContextState>,
}

impl RequestContext {
    /// Builds a frame for `request` and opens its session. Nothing is pushed
    /// yet.
    pub fn new(app: Arc<App>, request: Request) -> Rc<Self> {
        let session = app.open_session(&request);
        Rc::new(Self {
            app,
            request,
            session,
            globals: Globals::default(),
            flashes: RefCell::new(None),
            route_match: OnceCell::new(),
            state: Cell::new(ContextState::Created),
        })
    }

    pub fn app(&self) -> &Arc<App> { &self.app }
    pub fn request(&self) -> &Request { &self.request }
    pub fn session(&self) -> Option<&Session> { self.session.as_ref() }
    pub fn globals(&self) -> &Globals { &self.globals }
    pub fn state(&self) -> ContextState { self.state.get() }

    fn session_slot(&self) -> &Option<Session> { &self.session }

    /// The endpoint and parameters, once routing has succeeded.
    pub fn route_match(&self) -> Option<&RouteMatch> {
        self.route_match.get()
    }

    /// Resolves this request against the application's URL map and records
    /// the result on the frame.
    pub fn match_request(&self) -> Result<&RouteMatch, HttpError> {
        if let Some(matched) = self.route_match.get() {
            return Ok(matched);
        }
        let matched = self.app.router().lookup(self.request.method(), self.request.path())?;
        Ok(self.route_match.get_or_init(|| matched))
    }

    /// Builds a URL through the application's URL map.
    pub fn url_for(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<String, Error> {
        self.app.router().build(endpoint, params)
    }

    /// Queues a message for a later request.
    pub fn flash(&self, message: impl Into<String>) -> Result<(), Error> {
        let session = self.session().ok_or(Error::SessionUnavailable)?;
        let mut queued = match session.get(FLASHES_KEY) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        queued.push(Value::String(message.into()));
        session.insert(FLASHES_KEY, Value::Array(queued));
        Ok(())
    }

    /// Takes the queued messages out of the session. Later calls during the
    /// same request return the same messages.
    pub fn flashed_messages(&self) -> Result<Ref<'_, [String]>, Error> {
        if self.flashes.borrow().is_none() {
            let session = self.session().ok_or(Error::SessionUnavailable)?;
            let messages = match session.remove(FLASHES_KEY) {
                Some(Value::Array(items)) => items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(message) => Some(message),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            *self.flashes.borrow_mut() = Some(messages);
        }
        Ok(Ref::map(self.flashes.borrow(), |flashes| flashes.as_deref().unwrap_or_default()))
    }

    /// Pushes this frame onto the calling thread's stack.
    pub fn enter(self: &Rc<Self>) -> ContextGuard {
        REQUEST_STACK.push(Rc::clone(self));
        self.state.set(ContextState::Active);
        debug!(depth = REQUEST_STACK.depth(), "request context pushed");
        ContextGuard { frame: Rc::clone(self), released: false }
    }

    /// Pops this frame. Retained frames left above it by failed
    /// sub-requests are discarded first; any other frame above it means an
    /// inner context is still open, and nothing is popped.
    fn leave(&self) -> Result<(), ContextError> {
        loop {
            let top = REQUEST_STACK.top().map_err(|_| ContextError::EmptyStack)?;
            if std::ptr::eq(Rc::as_ptr(&top), self) {
                break;
            }
            if top.state() != ContextState::Retained {
                return Err(ContextError::NotInnermost);
            }
            REQUEST_STACK.pop()?;
            debug!(path = top.request.path(), "discarding retained request context");
        }
        REQUEST_STACK.pop()?;
        self.state.set(ContextState::Completed);
        debug!(depth = REQUEST_STACK.depth(), "request context popped");
        Ok(())
    }

    fn retain(&self) {
        self.state.set(ContextState::Retained);
        warn!(
            path = self.request.path(),
            depth = REQUEST_STACK.depth(),
            "request context retained on the stack for inspection",
        );
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", self.request.method())
            .field("path", &self.request.path())
            .field("route_match", &self.route_match.get())
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

/// Scope of one pushed [`RequestContext`].
///
/// End it with [`close`](Self::close) (pop) or [`retain`](Self::retain)
/// (leave on the stack). A guard that is simply dropped pops its frame,
/// except while the thread is panicking in debug mode, where it retains it.
#[must_use = "the context is popped as soon as the guard is dropped"]
pub struct ContextGuard {
    frame: Rc<RequestContext>,
    released: bool,
}

impl ContextGuard {
    pub fn frame(&self) -> &Rc<RequestContext> {
        &self.frame
    }

    /// Pops the frame; it moves to [`ContextState::Completed`].
    ///
    /// Fails with [`ContextError::NotInnermost`] while a context pushed after
    /// this one is still active.
    pub fn close(mut self) -> Result<(), ContextError> {
        self.released = true;
        self.frame.leave()
    }

    /// Leaves the frame on the stack; it moves to
    /// [`ContextState::Retained`].
    pub fn retain(mut self) {
        self.released = true;
        self.frame.retain();
    }
}

impl Deref for ContextGuard {
    type Target = RequestContext;

    fn deref(&self) -> &RequestContext {
        &self.frame
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if thread::panicking() && self.frame.app.config().debug() {
            self.frame.retain();
        } else if let Err(e) = self.frame.leave() {
            error!("failed to pop request context: {e}");
        }
    }
}
