use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use http::{Method, StatusCode};
use vial::{
    App, CURRENT_APP, ContextState, Error, G, HttpError, Params, REQUEST, REQUEST_STACK, Reply,
    Request, Response, abort,
};

fn body(resp: &Response) -> &str {
    std::str::from_utf8(resp.body()).unwrap()
}

#[test]
fn hello_world() {
    let app = Arc::new(App::new().route("/", "index", |_| Ok("Yet another hello!")));

    let resp = app.handle(Request::get("/")).unwrap();

    assert_eq!(resp.status_code(), StatusCode::OK);
    assert_eq!(body(&resp), "Yet another hello!");
    assert_eq!(resp.header("content-type"), Some("text/html; charset=utf-8"));
    assert!(REQUEST_STACK.is_empty());
}

#[test]
fn before_request_short_circuits_the_view() {
    static VIEW_CALLED: AtomicBool = AtomicBool::new(false);

    let app = Arc::new(
        App::new()
            .before_request(|| Ok(Some("denied")))
            .route("/", "index", |_| {
                VIEW_CALLED.store(true, Ordering::SeqCst);
                Ok("index")
            }),
    );

    let resp = app.handle(Request::get("/")).unwrap();

    assert_eq!(body(&resp), "denied");
    assert!(!VIEW_CALLED.load(Ordering::SeqCst));
}

#[test]
fn before_request_none_falls_through() {
    let app = Arc::new(
        App::new()
            .before_request(|| {
                G.get()?.insert("user", "alice");
                Ok(None::<Reply>)
            })
            .route("/", "index", |_| {
                let user = G.get()?.get("user").and_then(|v| v.as_str().map(str::to_owned));
                Ok(format!("hi {}", user.unwrap_or_default()))
            }),
    );

    assert_eq!(body(&app.handle(Request::get("/")).unwrap()), "hi alice");
}

#[test]
fn abort_without_handler_renders_the_default_page() {
    let app = Arc::new(App::new().route("/secret", "secret", |_| abort::<&str>(StatusCode::NOT_FOUND)));

    let resp = app.handle(Request::get("/secret")).unwrap();

    assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
    assert!(body(&resp).contains("Not Found"));
    assert!(REQUEST_STACK.is_empty());
}

#[test]
fn unknown_url_goes_to_the_404_handler() {
    let app = Arc::new(
        App::new()
            .route("/", "index", |_| Ok("index"))
            .error_handler(StatusCode::NOT_FOUND, |err| {
                let status = err.downcast_ref::<HttpError>().map(HttpError::status);
                Ok((format!("custom {:?}", status.map(|s| s.as_u16())), StatusCode::NOT_FOUND))
            }),
    );

    let resp = app.handle(Request::get("/nope")).unwrap();

    assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(body(&resp), "custom Some(404)");
}

#[test]
fn debug_mode_retains_the_context_on_failure() {
    let app = Arc::new(
        App::new()
            .debug(true)
            .route("/", "index", |_| -> anyhow::Result<&'static str> { Err(anyhow::anyhow!("boom")) })
            .error_handler(StatusCode::INTERNAL_SERVER_ERROR, |_| Ok("handled")),
    );

    let err = app.handle(Request::get("/")).unwrap_err();

    assert!(matches!(err, Error::Unhandled(_)));
    assert_eq!(err.to_string(), "boom");
    assert_eq!(REQUEST_STACK.depth(), 1);
    let retained = REQUEST_STACK.top().unwrap();
    assert_eq!(retained.state(), ContextState::Retained);
    assert_eq!(REQUEST.get().unwrap().path(), "/");

    REQUEST_STACK.pop().unwrap();
    assert!(REQUEST_STACK.is_empty());
}

#[test]
fn production_mode_uses_the_500_handler() {
    let app = Arc::new(
        App::new()
            .route("/", "index", |_| -> anyhow::Result<&'static str> { Err(anyhow::anyhow!("boom")) })
            .error_handler(StatusCode::INTERNAL_SERVER_ERROR, |err| {
                Ok((format!("sorry: {err}"), StatusCode::INTERNAL_SERVER_ERROR))
            }),
    );

    let resp = app.handle(Request::get("/")).unwrap();

    assert_eq!(resp.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body(&resp), "sorry: boom");
    assert!(REQUEST_STACK.is_empty());
}

#[test]
fn production_mode_without_500_handler_propagates() {
    let app = Arc::new(
        App::new().route("/", "index", |_| -> anyhow::Result<&'static str> { Err(anyhow::anyhow!("boom")) }),
    );

    assert!(matches!(app.handle(Request::get("/")), Err(Error::Unhandled(_))));
    assert!(REQUEST_STACK.is_empty());
}

#[test]
fn after_request_hooks_run_in_order() {
    let app = Arc::new(
        App::new()
            .route("/", "index", |_| Ok("index"))
            .after_request(|mut resp| {
                resp.set_header("x-step", "one");
                Ok(resp)
            })
            .after_request(|mut resp| {
                let previous = resp.header("x-step").unwrap_or("none").to_owned();
                resp.set_header("x-step", &format!("{previous},two"));
                Ok(resp)
            }),
    );

    let resp = app.handle(Request::get("/")).unwrap();

    assert_eq!(resp.header("x-step"), Some("one,two"));
}

#[test]
fn reply_shapes_are_normalized() {
    let app = Arc::new(
        App::new()
            .route("/text", "text", |_| Ok(String::from("plain")))
            .route("/created", "created", |_| Ok(("made", StatusCode::CREATED)))
            .route("/headers", "headers", |_| {
                Ok(("tagged", StatusCode::ACCEPTED, vec![("x-tag".to_owned(), "7".to_owned())]))
            })
            .route("/status", "status", |_| Ok(StatusCode::NO_CONTENT))
            .route("/mounted", "mounted", |_| {
                Ok(Reply::nested(|req| Response::text(format!("mounted at {}", req.path()))))
            }),
    );

    let text = app.handle(Request::get("/text")).unwrap();
    assert_eq!(body(&text), "plain");

    let created = app.handle(Request::get("/created")).unwrap();
    assert_eq!(created.status_code(), StatusCode::CREATED);
    assert_eq!(body(&created), "made");

    let tagged = app.handle(Request::get("/headers")).unwrap();
    assert_eq!(tagged.status_code(), StatusCode::ACCEPTED);
    assert_eq!(tagged.header("x-tag"), Some("7"));

    let status = app.handle(Request::get("/status")).unwrap();
    assert_eq!(status.status_code(), StatusCode::NO_CONTENT);

    let mounted = app.handle(Request::get("/mounted")).unwrap();
    assert_eq!(body(&mounted), "mounted at /mounted");
}

#[test]
fn method_mismatch_is_405_and_head_falls_back_to_get() {
    let app = Arc::new(
        App::new()
            .route("/items", "items", |_| Ok("list"))
            .route_methods(&[Method::POST], "/items/new", "create", |_| Ok("created")),
    );

    let post = app.handle(Request::builder().method(Method::POST).uri("/items").build()).unwrap();
    assert_eq!(post.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(post.header("allow"), Some("GET, HEAD"));

    let head = app.handle(Request::builder().method(Method::HEAD).uri("/items").build()).unwrap();
    assert_eq!(head.status_code(), StatusCode::OK);

    let create = app.handle(Request::builder().method(Method::POST).uri("/items/new").build()).unwrap();
    assert_eq!(body(&create), "created");
}

#[test]
fn path_parameters_reach_the_view() {
    let app = Arc::new(
        App::new()
            .route("/users/{id}", "user", |params| Ok(format!("user {}", params.get("id").unwrap_or("?"))))
            .route("/files/{*path}", "file", |params| Ok(format!("file {}", params.get("path").unwrap_or("?")))),
    );

    assert_eq!(body(&app.handle(Request::get("/users/42")).unwrap()), "user 42");
    assert_eq!(body(&app.handle(Request::get("/files/a/b.txt")).unwrap()), "file a/b.txt");
}

#[test]
fn nested_dispatch_restores_the_outer_request() {
    let app = Arc::new(
        App::new()
            .route("/inner", "inner", |_| Ok(format!("inner saw {}", REQUEST.get()?.path())))
            .route("/outer", "outer", |_| {
                let app: Arc<App> = CURRENT_APP.get()?.clone();
                let inner = app.handle(Request::get("/inner"))?;
                let inner_body = String::from_utf8_lossy(inner.body()).into_owned();
                Ok(format!("{inner_body}; outer saw {}", REQUEST.get()?.path()))
            }),
    );

    let resp = app.handle(Request::get("/outer")).unwrap();

    assert_eq!(body(&resp), "inner saw /inner; outer saw /outer");
    assert!(REQUEST_STACK.is_empty());
}

#[test]
fn failing_before_hook_propagates() {
    static AFTER_CALLED: AtomicBool = AtomicBool::new(false);

    let app = Arc::new(
        App::new()
            .before_request(|| -> anyhow::Result<Option<&'static str>> { Err(anyhow::anyhow!("db down")) })
            .route("/", "index", |_| Ok("index"))
            .after_request(|resp| {
                AFTER_CALLED.store(true, Ordering::SeqCst);
                Ok(resp)
            }),
    );

    let err = app.handle(Request::get("/")).unwrap_err();

    assert_eq!(err.to_string(), "db down");
    assert!(!AFTER_CALLED.load(Ordering::SeqCst));
    assert!(REQUEST_STACK.is_empty());
}

#[test]
fn threads_see_only_their_own_request() {
    static SERVED: AtomicUsize = AtomicUsize::new(0);

    let barrier = Arc::new(Barrier::new(4));
    let app = Arc::new(App::new().route("/who/{n}", "who", {
        let barrier = Arc::clone(&barrier);
        move |_: &Params| {
            // all four requests are on their stacks at the same time here
            barrier.wait();
            SERVED.fetch_add(1, Ordering::SeqCst);
            Ok(REQUEST.get()?.path().to_owned())
        }
    }));

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let app = Arc::clone(&app);
            thread::spawn(move || {
                let resp = app.handle(Request::get(&format!("/who/{n}"))).unwrap();
                assert_eq!(resp.body(), format!("/who/{n}").as_bytes());
                assert!(REQUEST_STACK.is_empty());
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(SERVED.load(Ordering::SeqCst), 4);
}

#[test]
fn recovered_sub_request_failure_does_not_strand_the_caller() {
    let app = Arc::new(
        App::new()
            .debug(true)
            .route("/inner", "inner", |_| -> anyhow::Result<&'static str> { Err(anyhow::anyhow!("inner broke")) })
            .route("/outer", "outer", |_| {
                let app: Arc<App> = CURRENT_APP.get()?.clone();
                let inner = app.handle(Request::get("/inner"));
                assert!(matches!(inner, Err(Error::Unhandled(_))));
                // the failed inner frame is kept above this one
                assert_eq!(REQUEST.get()?.path(), "/inner");
                assert_eq!(REQUEST_STACK.depth(), 2);
                Ok("recovered")
            }),
    );

    let resp = app.handle(Request::get("/outer")).unwrap();

    assert_eq!(body(&resp), "recovered");
    assert!(REQUEST_STACK.is_empty());
}

#[test]
fn url_for_output_routes_back_to_the_same_params() {
    let app = Arc::new(
        App::new()
            .route("/users/{name}", "user", |params| Ok(params.get("name").unwrap_or("?").to_owned()))
            .route("/link", "link", |_| Ok(vial::url_for("user", &[("name", "a b/ü"), ("q", "x&y")])?)),
    );

    let url = String::from_utf8(app.handle(Request::get("/link")).unwrap().body().to_vec()).unwrap();
    assert_eq!(url, "/users/a%20b%2F%C3%BC?q=x%26y");

    let resp = app.handle(Request::get(&url)).unwrap();
    assert_eq!(body(&resp), "a b/ü");
}

#[test]
fn redirect_to_hostile_location_still_answers() {
    let app = Arc::new(App::new().route("/go", "go", |_| {
        let next = REQUEST.get()?.arg("next").map(|next| next.into_owned()).unwrap_or_default();
        Ok(vial::redirect(&next))
    }));

    let resp = app.handle(Request::get("/go?next=/home%0D%0ASet-Cookie:%20admin=1")).unwrap();

    assert_eq!(resp.status_code(), StatusCode::FOUND);
    assert_eq!(resp.header("location"), Some("/home%0D%0ASet-Cookie:%20admin=1"));
    assert!(resp.header("set-cookie").is_none());
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn retained_contexts_are_logged_with_the_stack_depth() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer({
            let logs = logs.clone();
            move || logs.clone()
        })
        .finish();
    let app = Arc::new(
        App::new()
            .debug(true)
            .route("/", "index", |_| -> anyhow::Result<&'static str> { Err(anyhow::anyhow!("boom")) }),
    );

    tracing::subscriber::with_default(subscriber, || {
        assert!(app.handle(Request::get("/")).is_err());
        assert!(app.handle(Request::get("/")).is_err());
    });

    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("retained on the stack"), "{output}");
    assert!(output.contains("depth=1"), "{output}");
    assert!(output.contains("depth=2"), "{output}");

    REQUEST_STACK.pop().unwrap();
    REQUEST_STACK.pop().unwrap();
}
