//! Sessions and the signed-cookie codec.
//!
//! The session lives in the request frame and is reachable through the
//! [`SESSION`](crate::SESSION) proxy. It is opened when the frame is built
//! and written back into the response before any post-request hook runs,
//! on every request, whether or not it changed.
//!
//! # Cookie format
//!
//! ```text
//! session=<base64url(json)>.<base64url(hmac_sha256(secret_key, base64url(json)))>
//! ```
//!
//! Both parts use the URL-safe alphabet without padding, so the value needs
//! no quoting.

use std::cell::{Cell, RefCell};
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::Config;
use crate::request::Request;
use crate::response::Response;

/// A mutable string-keyed bag of JSON values, scoped to one request.
///
/// Mutation goes through `&self` so that every holder of the frame (the
/// dispatcher, handlers reading through the proxy) sees the same data.
#[derive(Default)]
pub struct Session {
    data: RefCell<Map<String, Value>>,
    modified: Cell<bool>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(data: Map<String, Value>) -> Self {
        Self { data: RefCell::new(data), modified: Cell::new(false) }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.borrow().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.modified.set(true);
        self.data.borrow_mut().insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = self.data.borrow_mut().remove(key);
        if removed.is_some() {
            self.modified.set(true);
        }
        removed
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.borrow().contains_key(key)
    }

    pub fn clear(&self) {
        self.modified.set(true);
        self.data.borrow_mut().clear();
    }

    pub fn len(&self) -> usize { self.data.borrow().len() }
    pub fn is_empty(&self) -> bool { self.data.borrow().is_empty() }

    /// Whether anything was written since the session was opened.
    pub fn is_modified(&self) -> bool { self.modified.get() }

    /// A copy of the current contents.
    pub fn to_map(&self) -> Map<String, Value> {
        self.data.borrow().clone()
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        *self.data.borrow() == *other.data.borrow()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("data", &self.data.borrow())
            .field("modified", &self.modified.get())
            .finish()
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Loads a session from a request and stores it into a response.
///
/// Swap the default with [`App::session_interface`](crate::App::session_interface)
/// to keep sessions server-side, in another cookie format, etc.
pub trait SessionInterface: Send + Sync {
    /// `None` means the application has no sessions (no secret key).
    fn open_session(&self, config: &Config, request: &Request) -> Option<Session>;

    fn save_session(&self, config: &Config, session: &Session, response: &mut Response);
}

/// Default codec: the whole session in one HMAC-SHA256-signed cookie.
#[derive(Clone, Copy, Debug, Default)]
pub struct SignedCookieSessions;

impl SessionInterface for SignedCookieSessions {
    fn open_session(&self, config: &Config, request: &Request) -> Option<Session> {
        let key = config.secret_key()?;
        let name = config.session_cookie_name();
        let Some(cookie) = request.cookie(name) else {
            return Some(Session::new());
        };
        match decode(key, cookie) {
            Some(data) => Some(Session::from_map(data)),
            None => {
                warn!(cookie = name, "discarding session cookie with a bad signature or payload");
                Some(Session::new())
            }
        }
    }

    fn save_session(&self, config: &Config, session: &Session, response: &mut Response) {
        let Some(key) = config.secret_key() else {
            debug!("no secret key, session not saved");
            return;
        };
        let value = encode(key, &session.to_map());
        response.set_cookie(config.session_cookie_name(), &value);
    }
}

fn encode(key: &[u8], data: &Map<String, Value>) -> String {
    let json = Value::Object(data.clone()).to_string();
    let payload = URL_SAFE_NO_PAD.encode(json.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(hmac_sha256(key, payload.as_bytes()));
    format!("{payload}.{signature}")
}

fn decode(key: &[u8], cookie: &str) -> Option<Map<String, Value>> {
    let (payload, signature) = cookie.rsplit_once('.')?;
    let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
    if !constant_time_eq(&signature, &hmac_sha256(key, payload.as_bytes())) {
        return None;
    }
    let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
    match serde_json::from_slice(&json).ok()? {
        Value::Object(data) => Some(data),
        _ => None,
    }
}

const BLOCK_SIZE: usize = 64;

/// HMAC (RFC 2104) over SHA-256.
fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut block = [0u8; BLOCK_SIZE];
    if key.len() > BLOCK_SIZE {
        block[..32].copy_from_slice(&Sha256::digest(key));
    } else {
        block[..key.len()].copy_from_slice(key);
    }

    let mut inner_pad = [0x36u8; BLOCK_SIZE];
    let mut outer_pad = [0x5cu8; BLOCK_SIZE];
    for ((i, o), k) in inner_pad.iter_mut().zip(outer_pad.iter_mut()).zip(block) {
        *i ^= k;
        *o ^= k;
    }

    let inner = Sha256::new().chain_update(inner_pad).chain_update(message).finalize();
    let outer = Sha256::new().chain_update(outer_pad).chain_update(inner).finalize();
    let mut tag = [0u8; 32];
    tag.copy_from_slice(&outer);
    tag
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
