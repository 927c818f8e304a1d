//! Outgoing HTTP response type.
//!
//! [`Response`] is the canonical shape every handler result is normalized
//! into before post-request hooks see it. Most handlers never build one by
//! hand: returning a `&str`, a `String` or a `(body, status)` tuple is enough
//! (see [`IntoReply`](crate::IntoReply)).

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;

use crate::urls::{escape_html, quote_location};

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use http::StatusCode;
/// use vial::Response;
///
/// Response::html("<h1>hi</h1>");
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Clone, Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

impl Response {
    /// `200 OK`: `text/html; charset=utf-8`. The default for bare string
    /// handler results.
    pub fn html(body: impl Into<Bytes>) -> Self {
        Self::typed(ContentType::Html, body.into())
    }

    /// `200 OK`: `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::typed(ContentType::Text, Bytes::from(body.into()))
    }

    /// `200 OK`: `application/json`.
    pub fn json(body: Vec<u8>) -> Self {
        Self::typed(ContentType::Json, Bytes::from(body))
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: HeaderMap::new(), body: Bytes::new() }
    }

    /// `302 Found` pointing at `location`.
    ///
    /// Characters a header cannot carry (controls, spaces, non-ASCII) are
    /// percent-encoded, so any string is accepted.
    pub fn redirect(location: &str) -> Self {
        let location = quote_location(location);
        let shown = escape_html(&location);
        Response::builder()
            .status(StatusCode::FOUND)
            .header("location", &location)
            .html(format!(
                "<!doctype html>\n<title>Redirecting...</title>\n<h1>Redirecting...</h1>\n\
                 <p>You should be redirected automatically to <a href=\"{shown}\">{shown}</a>.</p>\n"
            ))
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    fn typed(content_type: ContentType, body: Bytes) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
        Self { status: StatusCode::OK, headers, body }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn set_status(&mut self, status: StatusCode) { self.status = status; }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// First value of the named header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Replaces any existing values of `name`.
    ///
    /// # Panics
    ///
    /// Panics if `name` or `value` is not a legal header.
    pub fn set_header(&mut self, name: &str, value: &str) {
        let (name, value) = header_pair(name, value);
        self.headers.insert(name, value);
    }

    /// Appends a `Set-Cookie` header.
    pub fn set_cookie(&mut self, name: &str, value: &str) {
        let (_, value) = header_pair("set-cookie", &format!("{name}={value}; Path=/; HttpOnly"));
        self.headers.append(header::SET_COOKIE, value);
    }

    /// Converts into the `http` crate's response for hyper.
    pub fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut inner = http::Response::new(Full::new(self.body));
        *inner.status_mut() = self.status;
        *inner.headers_mut() = self.headers;
        inner
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method.
#[derive(Debug)]
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Appends a header.
    ///
    /// # Panics
    ///
    /// Panics if `name` or `value` is not a legal header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        let (name, value) = header_pair(name, value);
        self.headers.append(name, value);
        self
    }

    pub fn html(self, body: impl Into<Bytes>) -> Response {
        self.finish(ContentType::Html, body.into())
    }

    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(ContentType::Text, Bytes::from(body.into()))
    }

    pub fn json(self, body: Vec<u8>) -> Response {
        self.finish(ContentType::Json, Bytes::from(body))
    }

    /// Terminate with a typed body. Use this for XML, binary, etc.
    pub fn bytes(self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.finish(content_type, body.into())
    }

    /// Terminate with no body (e.g. `204 No Content`).
    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: Bytes::new() }
    }

    fn finish(mut self, content_type: ContentType, body: Bytes) -> Response {
        if !self.headers.contains_key(header::CONTENT_TYPE) {
            self.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
        }
        Response { status: self.status, headers: self.headers, body }
    }
}

fn header_pair(name: &str, value: &str) -> (HeaderName, HeaderValue) {
    let header_name = HeaderName::try_from(name)
        .unwrap_or_else(|e| panic!("invalid header name `{name}`: {e}"));
    let header_value = HeaderValue::try_from(value)
        .unwrap_or_else(|e| panic!("invalid value for header `{name}`: {e}"));
    (header_name, header_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_is_the_default_text_mimetype() {
        let resp = Response::html("hi");
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.header("content-type"), Some("text/html; charset=utf-8"));
        assert_eq!(resp.body(), b"hi");
    }

    #[test]
    fn builder_keeps_explicit_content_type() {
        let resp = Response::builder()
            .header("content-type", "text/csv")
            .text("a,b");
        assert_eq!(resp.header("content-type"), Some("text/csv"));
    }

    #[test]
    fn redirect_sets_location() {
        let resp = Response::redirect("/login");
        assert_eq!(resp.status_code(), StatusCode::FOUND);
        assert_eq!(resp.header("location"), Some("/login"));
    }

    #[test]
    fn redirect_neutralizes_header_injection() {
        let resp = Response::redirect("/next\r\nSet-Cookie: x=1");
        assert_eq!(resp.status_code(), StatusCode::FOUND);
        assert_eq!(resp.header("location"), Some("/next%0D%0ASet-Cookie:%20x=1"));
        assert!(resp.header("set-cookie").is_none());
    }

    #[test]
    fn redirect_escapes_the_body_link() {
        let resp = Response::redirect("/search?q=1&r=2");
        assert_eq!(resp.header("location"), Some("/search?q=1&r=2"));
        let body = std::str::from_utf8(resp.body()).unwrap();
        assert!(body.contains(r#"<a href="/search?q=1&amp;r=2">"#));
    }

    #[test]
    fn set_cookie_appends() {
        let mut resp = Response::status(StatusCode::NO_CONTENT);
        resp.set_cookie("a", "1");
        resp.set_cookie("b", "2");
        let cookies: Vec<_> = resp.headers().get_all("set-cookie").iter().collect();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0], "a=1; Path=/; HttpOnly");
    }

    #[test]
    fn into_inner_preserves_parts() {
        let inner = Response::builder()
            .status(StatusCode::CREATED)
            .header("x-id", "7")
            .text("made")
            .into_inner();
        assert_eq!(inner.status(), StatusCode::CREATED);
        assert_eq!(inner.headers()["x-id"], "7");
    }
}
