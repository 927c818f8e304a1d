//! A tiny guestbook showing the context-local proxies at work.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example hello
//!
//! Try:
//!   curl http://localhost:5000/
//!   curl -c jar -b jar -X POST 'http://localhost:5000/sign?name=alice'
//!   curl -c jar -b jar http://localhost:5000/book
//!   curl http://localhost:5000/missing

use std::sync::Arc;

use http::{Method, StatusCode};
use tracing_subscriber::EnvFilter;
use vial::{App, G, REQUEST, Response, abort, flash, get_flashed_messages, redirect, url_for};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app = App::new()
        .secret_key("not so secret")
        .before_request(|| {
            G.get()?.insert("visitor", REQUEST.get()?.header("user-agent").unwrap_or("anonymous"));
            Ok(None::<Response>)
        })
        .route("/", "index", |_| Ok("Yet another hello!"))
        .route_methods(&[Method::POST], "/sign", "sign", |_| {
            let Some(name) = REQUEST.get()?.arg("name").map(|name| name.into_owned()) else {
                return abort(StatusCode::BAD_REQUEST);
            };
            flash(format!("{name} signed the book"))?;
            Ok(redirect(&url_for("book", &[])?))
        })
        .route("/book", "book", |_| {
            let visitor = G.get()?.get("visitor").unwrap_or_default();
            let mut page = format!("<h1>Guestbook</h1><p>viewing as {visitor}</p><ul>");
            for message in get_flashed_messages()? {
                page.push_str(&format!("<li>{message}</li>"));
            }
            page.push_str("</ul>");
            Ok(Response::html(page))
        })
        .error_handler(StatusCode::NOT_FOUND, |_| {
            Ok(("nothing here, try /".to_owned(), StatusCode::NOT_FOUND))
        });

    if let Err(e) = Arc::new(app).run("127.0.0.1:5000").await {
        eprintln!("server error: {e}");
    }
}
