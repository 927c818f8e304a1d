//! Handler results and their normalization into a [`Response`].
//!
//! A view function may hand back several shapes of result. Rather than
//! inspecting types at runtime, every accepted shape is one variant of
//! [`Reply`], and [`Reply::into_response`] is the single place that turns a
//! reply into the canonical response.
//!
//! | Returned value                         | Becomes                                   |
//! |----------------------------------------|-------------------------------------------|
//! | `Response`                             | itself                                    |
//! | `&'static str` / `String`              | `200`, `text/html; charset=utf-8` body    |
//! | `(body, StatusCode)`                   | that body with that status                |
//! | `(body, StatusCode, headers)`          | same, plus the headers                    |
//! | `Reply::nested(f)`                     | whatever `f(&request)` returns            |
//! | `StatusCode`                           | empty body with that status               |
//! | `HttpError`                            | the error's HTML page                     |

use std::fmt;

use bytes::Bytes;
use http::StatusCode;

use crate::error::HttpError;
use crate::request::Request;
use crate::response::Response;

/// Nested callable run against the current request.
pub type NestedApp = Box<dyn FnOnce(&Request) -> Response>;

/// Every result shape a handler, pre-request hook or error handler may
/// produce.
pub enum Reply {
    Response(Response),
    Text(String),
    Parts {
        body: Bytes,
        status: StatusCode,
        headers: Vec<(String, String)>,
    },
    Nested(NestedApp),
}

impl Reply {
    /// Defers to another responder (a mounted sub-application, a proxy...)
    /// that is called with the current request.
    pub fn nested(app: impl FnOnce(&Request) -> Response + 'static) -> Self {
        Self::Nested(Box::new(app))
    }

    /// Normalizes into the canonical response.
    pub fn into_response(self, request: &Request) -> Response {
        match self {
            Self::Response(response) => response,
            Self::Text(text) => Response::html(text),
            Self::Parts { body, status, headers } => headers
                .iter()
                .fold(Response::builder().status(status), |builder, (name, value)| {
                    builder.header(name, value)
                })
                .html(body),
            Self::Nested(app) => app(request),
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Response(r) => f.debug_tuple("Response").field(r).finish(),
            Self::Text(t) => f.debug_tuple("Text").field(t).finish(),
            Self::Parts { body, status, headers } => f
                .debug_struct("Parts")
                .field("body", body)
                .field("status", status)
                .field("headers", headers)
                .finish(),
            Self::Nested(_) => f.write_str("Nested(..)"),
        }
    }
}

// ── IntoReply ─────────────────────────────────────────────────────────────────

/// Conversion into a [`Reply`].
///
/// Implemented for the shapes listed in the module docs. Implement it on
/// your own types to return them directly from handlers.
pub trait IntoReply {
    fn into_reply(self) -> Reply;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Reply { self }
}

impl IntoReply for Response {
    fn into_reply(self) -> Reply { Reply::Response(self) }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Reply { Reply::Text(self.to_owned()) }
}

impl IntoReply for String {
    fn into_reply(self) -> Reply { Reply::Text(self) }
}

impl IntoReply for StatusCode {
    fn into_reply(self) -> Reply { Reply::Response(Response::status(self)) }
}

impl IntoReply for HttpError {
    fn into_reply(self) -> Reply { Reply::Response(self.to_response()) }
}

impl<B: Into<Bytes>> IntoReply for (B, StatusCode) {
    fn into_reply(self) -> Reply {
        Reply::Parts { body: self.0.into(), status: self.1, headers: Vec::new() }
    }
}

impl<B: Into<Bytes>> IntoReply for (B, StatusCode, Vec<(String, String)>) {
    fn into_reply(self) -> Reply {
        Reply::Parts { body: self.0.into(), status: self.1, headers: self.2 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(reply: impl IntoReply) -> Response {
        reply.into_reply().into_response(&Request::get("/"))
    }

    #[test]
    fn text_becomes_html_200() {
        let resp = normalize("Yet another hello!");
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.header("content-type"), Some("text/html; charset=utf-8"));
        assert_eq!(resp.body(), b"Yet another hello!");
    }

    #[test]
    fn response_passes_through() {
        let resp = normalize(Response::json(b"{}".to_vec()));
        assert_eq!(resp.header("content-type"), Some("application/json"));
    }

    #[test]
    fn tuple_sets_status_and_headers() {
        let resp = normalize((
            "gone",
            StatusCode::GONE,
            vec![("x-reason".to_owned(), "moved".to_owned())],
        ));
        assert_eq!(resp.status_code(), StatusCode::GONE);
        assert_eq!(resp.header("x-reason"), Some("moved"));
        assert_eq!(resp.body(), b"gone");
    }

    #[test]
    fn tuple_header_may_override_content_type() {
        let resp = normalize((
            String::from("a,b"),
            StatusCode::OK,
            vec![("content-type".to_owned(), "text/csv".to_owned())],
        ));
        assert_eq!(resp.header("content-type"), Some("text/csv"));
    }

    #[test]
    fn nested_app_sees_current_request() {
        let reply = Reply::nested(|req| Response::text(format!("mounted at {}", req.path())));
        let resp = reply.into_response(&Request::get("/admin"));
        assert_eq!(resp.body(), b"mounted at /admin");
    }

    #[test]
    fn bare_status_has_empty_body() {
        let resp = normalize(StatusCode::NO_CONTENT);
        assert_eq!(resp.status_code(), StatusCode::NO_CONTENT);
        assert!(resp.body().is_empty());
    }
}
