//! In-process client for exercising an application in tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use http::Method;

use crate::app::App;
use crate::error::Result;
use crate::request::{Request, RequestBuilder};
use crate::response::Response;

/// Dispatches requests straight through [`App::handle`], no socket
/// involved, and carries cookies from one response to the next request
/// like a browser would.
///
/// ```rust
/// use std::sync::Arc;
/// use vial::{App, SESSION};
///
/// let app = Arc::new(App::new().secret_key("k").route("/visit", "visit", |_| {
///     let session = SESSION.get()?;
///     let session = session.as_ref().unwrap();
///     let visits = session.get("visits").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
///     session.insert("visits", visits);
///     Ok(visits.to_string())
/// }));
///
/// let mut client = app.test_client();
/// client.get("/visit").unwrap();
/// assert_eq!(client.get("/visit").unwrap().body(), b"2");
/// ```
#[derive(Debug)]
pub struct TestClient {
    app: Arc<App>,
    cookies: BTreeMap<String, String>,
}

impl TestClient {
    pub(crate) fn new(app: Arc<App>) -> Self {
        Self { app, cookies: BTreeMap::new() }
    }

    pub fn get(&mut self, uri: &str) -> Result<Response> {
        self.request(Request::builder().uri(uri))
    }

    pub fn post(&mut self, uri: &str, body: impl Into<Bytes>) -> Result<Response> {
        self.request(Request::builder().method(Method::POST).uri(uri).body(body))
    }

    /// Sends a hand-built request with the stored cookies attached.
    pub fn request(&mut self, request: RequestBuilder) -> Result<Response> {
        let request = match self.cookie_header() {
            Some(cookies) => request.header("cookie", &cookies),
            None => request,
        };
        let response = self.app.handle(request.build())?;
        self.store_cookies(&response);
        Ok(response)
    }

    /// Value of a cookie the application has set.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn set_cookie(&mut self, name: &str, value: &str) {
        self.cookies.insert(name.to_owned(), value.to_owned());
    }

    pub fn clear_cookies(&mut self) {
        self.cookies.clear();
    }

    fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self.cookies.iter().map(|(name, value)| format!("{name}={value}")).collect();
        Some(pairs.join("; "))
    }

    /// An empty value or `Max-Age=0` deletes the cookie.
    fn store_cookies(&mut self, response: &Response) {
        for header in response.headers().get_all(http::header::SET_COOKIE) {
            let Ok(header) = header.to_str() else { continue };
            let mut attributes = header.split(';').map(str::trim);
            let Some((name, value)) = attributes.next().and_then(|pair| pair.split_once('=')) else {
                continue;
            };
            let expired = attributes.any(|attr| attr.eq_ignore_ascii_case("max-age=0"));
            if value.is_empty() || expired {
                self.cookies.remove(name);
            } else {
                self.cookies.insert(name.to_owned(), value.to_owned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> Arc<App> {
        Arc::new(
            App::new()
                .route("/set", "set", |_| {
                    let mut resp = Response::text("set");
                    resp.set_cookie("theme", "dark");
                    Ok(resp)
                })
                .route("/unset", "unset", |_| {
                    let mut resp = Response::text("unset");
                    resp.headers_mut().append(
                        http::header::SET_COOKIE,
                        http::HeaderValue::from_static("theme=; Max-Age=0; Path=/"),
                    );
                    Ok(resp)
                })
                .route("/echo", "echo", |_| {
                    Ok(crate::REQUEST.get()?.header("cookie").unwrap_or("").to_owned())
                }),
        )
    }

    #[test]
    fn cookies_carry_over_between_requests() {
        let mut client = app().test_client();
        assert_eq!(client.get("/echo").unwrap().body(), b"");

        client.get("/set").unwrap();
        assert_eq!(client.cookie("theme"), Some("dark"));
        client.set_cookie("lang", "en");
        assert_eq!(client.get("/echo").unwrap().body(), b"lang=en; theme=dark");
    }

    #[test]
    fn expired_cookies_are_dropped() {
        let mut client = app().test_client();
        client.get("/set").unwrap();
        client.get("/unset").unwrap();
        assert_eq!(client.cookie("theme"), None);

        client.set_cookie("a", "1");
        client.clear_cookies();
        assert_eq!(client.get("/echo").unwrap().body(), b"");
    }
}
