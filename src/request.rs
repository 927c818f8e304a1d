//! Incoming HTTP request type.

use std::borrow::Cow;
use std::collections::HashMap;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::Method;
use serde_json::{Value, json};

use crate::urls::percent_decode;

/// An incoming HTTP request, as handed over by the transport layer.
///
/// Inside a handler you usually reach it through the
/// [`REQUEST`](crate::REQUEST) proxy rather than as an argument.
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    cookies: HashMap<String, String>,
}

impl Request {
    /// Assembles a request from hyper's head and an already-collected body.
    pub fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        let path = parts.uri.path().to_owned();
        let query = parts.uri.query().map(str::to_owned);
        Self::assemble(parts.method, path, query, parts.headers, body)
    }

    /// Starts a request by hand: tests, scripts, sub-requests.
    ///
    /// ```rust
    /// use vial::Request;
    ///
    /// let req = Request::builder()
    ///     .method(http::Method::POST)
    ///     .uri("/users?page=2")
    ///     .header("cookie", "theme=dark")
    ///     .body("name=alice")
    ///     .build();
    /// assert_eq!(req.path(), "/users");
    /// assert_eq!(req.cookie("theme"), Some("dark"));
    /// ```
    pub fn builder() -> RequestBuilder {
        RequestBuilder {
            method: Method::GET,
            uri: "/".to_owned(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// `GET path` with no headers and no body.
    pub fn get(uri: &str) -> Self {
        Self::builder().uri(uri).build()
    }

    fn assemble(
        method: Method,
        path: String,
        query: Option<String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        let cookies = parse_cookies(&headers);
        Self { method, path, query, headers, body, cookies }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn query(&self) -> Option<&str> { self.query.as_deref() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn cookies(&self) -> &HashMap<String, String> { &self.cookies }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Decoded value of the first query-string argument called `name`.
    /// `+` and `%XX` are decoded as in form encoding.
    pub fn arg(&self, name: &str) -> Option<Cow<'_, str>> {
        self.query.as_deref()?
            .split('&')
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
            .find(|(key, _)| percent_decode(key, true) == name)
            .map(|(_, value)| percent_decode(value, true))
    }

    /// The view of this request exposed to templates as `request`.
    pub(crate) fn template_value(&self) -> Value {
        json!({
            "method": self.method.as_str(),
            "path": self.path,
            "query": self.query,
        })
    }
}

/// Fluent builder for [`Request`]. Obtain via [`Request::builder()`].
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Bytes,
}

impl RequestBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Path plus optional `?query`.
    pub fn uri(mut self, uri: &str) -> Self {
        self.uri = uri.to_owned();
        self
    }

    /// Appends a header.
    ///
    /// # Panics
    ///
    /// Panics if `name` or `value` is not a legal header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        let header_name = HeaderName::try_from(name)
            .unwrap_or_else(|e| panic!("invalid header name `{name}`: {e}"));
        let header_value = HeaderValue::try_from(value)
            .unwrap_or_else(|e| panic!("invalid value for header `{name}`: {e}"));
        self.headers.append(header_name, header_value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Request {
        let (path, query) = match self.uri.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (self.uri, None),
        };
        Request::assemble(self.method, path, query, self.headers, self.body)
    }
}

/// Collects `name=value` pairs from every `Cookie` header. The first
/// occurrence of a name wins.
fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for value in headers.get_all(header::COOKIE) {
        let Ok(value) = value.to_str() else { continue };
        for pair in value.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                cookies
                    .entry(name.trim().to_owned())
                    .or_insert_with(|| value.trim().trim_matches('"').to_owned());
            }
        }
    }
    cookies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_splits_path_and_query() {
        let req = Request::get("/search?q=rust&page=2");
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query(), Some("q=rust&page=2"));
        assert_eq!(req.arg("page").as_deref(), Some("2"));
        assert_eq!(req.arg("missing"), None);
    }

    #[test]
    fn query_arguments_are_decoded() {
        let req = Request::get("/search?q=rust+web%20dev&caf%C3%A9=1&flag");
        assert_eq!(req.arg("q").as_deref(), Some("rust web dev"));
        assert_eq!(req.arg("café").as_deref(), Some("1"));
        assert_eq!(req.arg("flag").as_deref(), Some(""));
    }

    #[test]
    fn cookies_are_parsed_from_every_header() {
        let req = Request::builder()
            .header("cookie", "a=1; b=\"two\"")
            .header("cookie", "a=shadowed; c=3")
            .build();
        assert_eq!(req.cookie("a"), Some("1"));
        assert_eq!(req.cookie("b"), Some("two"));
        assert_eq!(req.cookie("c"), Some("3"));
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = Request::builder().header("X-Token", "abc").build();
        assert_eq!(req.header("x-token"), Some("abc"));
    }

    #[test]
    fn from_parts_keeps_method_and_body() {
        let (parts, ()) = http::Request::builder()
            .method(Method::PUT)
            .uri("http://example.com/items/9?x=1")
            .body(())
            .unwrap()
            .into_parts();
        let req = Request::from_parts(parts, Bytes::from_static(b"payload"));
        assert_eq!(req.method(), Method::PUT);
        assert_eq!(req.path(), "/items/9");
        assert_eq!(req.query(), Some("x=1"));
        assert_eq!(req.body(), b"payload");
    }
}
