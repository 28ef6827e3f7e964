//! Tests for the dispatcher against the demo route table
//!
//! # Test Strategy
//!
//! The demo app is built into a [`Dispatcher`] and requests are dispatched directly,
//! without a socket. Isolated routes point at a missing worker program, so only the
//! inline handlers are exercised here; `server_tests` covers isolated routes end to end.

use serde_json::{json, Value};
use std::time::Duration;
use zealrouter::config::AppConfig;
use zealrouter::context::RequestContext;
use zealrouter::dispatcher::{Dispatcher, CONTENT_TYPE_HTML, CONTENT_TYPE_JSON, NOT_FOUND_BODY};
use zealrouter::isolated::{IsolatedExecutor, WorkerCommand};
use zealrouter::router::RouteOptions;

fn dispatcher() -> Dispatcher {
    zealrouter::demo::build_app(AppConfig::default())
        .unwrap()
        .with_executor(IsolatedExecutor::new(
            WorkerCommand::new("/nonexistent/zeal-worker"),
            Duration::from_secs(1),
        ))
        .build()
        .unwrap()
}

fn body(d: &Dispatcher, method: &str, uri: &str) -> (u16, String) {
    let resp = d.dispatch(RequestContext::new(method, uri));
    (resp.status, String::from_utf8(resp.body).unwrap())
}

#[test]
fn test_demo_quiz_route() {
    let d = dispatcher();
    let resp = d.dispatch(RequestContext::new("GET", "/quiz/intro"));
    assert_eq!(resp.status, 200);
    assert_eq!(resp.content_type(), Some(CONTENT_TYPE_HTML));
    assert_eq!(resp.body, b"<h1>This is quiz: intro</h1>");
}

#[test]
fn test_demo_not_found() {
    let d = dispatcher();
    let resp = d.dispatch(RequestContext::new("GET", "/does/not/exist"));
    assert_eq!(resp.status, 404);
    assert_eq!(resp.body, NOT_FOUND_BODY.as_bytes());
}

#[test]
fn test_demo_default_site_name() {
    let d = dispatcher();
    assert_eq!(
        body(&d, "GET", "/hello/ada").1,
        "<h1>Hello, ada! Welcome to zealrouter</h1>"
    );
}

#[test]
fn test_demo_session_global() {
    let d = dispatcher();
    let request = RequestContext::new("GET", "/global/session");
    let id = request.request_id.to_string();
    let resp = d.dispatch(request);
    let session: Value = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(session["UNIQUE_REQUEST_ID"], id.as_str());
    assert!(session["__start_time"].as_f64().unwrap() > 0.0);
}

#[test]
fn test_demo_json_body_is_post_global() {
    let d = dispatcher();
    let resp = d.dispatch(
        RequestContext::new("POST", "/global/post")
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"q": [1, 2]}"#),
    );
    let post: Value = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(post, json!({"q": [1, 2]}));
}

#[test]
fn test_demo_catch_all_is_json() {
    let d = dispatcher();
    let resp = d.dispatch(RequestContext::new("GET", "/api/a/b"));
    assert_eq!(resp.content_type(), Some(CONTENT_TYPE_JSON));
    assert_eq!(resp.get_header("x-api-module"), Some("a"));
}

#[test]
fn test_demo_isolated_without_worker_is_500() {
    let d = dispatcher();
    let (status, text) = body(&d, "GET", "/isolated/created");
    assert_eq!(status, 500);
    assert!(text.contains("error"));
}

#[test]
fn test_demo_raw_pattern_accepts_only_get() {
    let d = dispatcher();
    assert_eq!(body(&d, "GET", "/raw/x").1, "You requested: x");
    assert_eq!(body(&d, "POST", "/raw/x").0, 404);
}

#[test]
fn test_binder_capture_shadows_reserved_request() {
    let mut app = zealrouter::App::new(AppConfig::default()).with_executor(IsolatedExecutor::new(
        WorkerCommand::new("/nonexistent"),
        Duration::from_secs(1),
    ));
    app.route(
        "/shadow/{request}",
        RouteOptions::new().params(["request", "response"]),
        |args| {
            let kind = if args.request().is_some() { "object" } else { "capture" };
            Ok(format!("{kind}:{}", args.text("request").unwrap_or_default()))
        },
    )
    .unwrap();
    let d = app.build().unwrap();
    assert_eq!(body(&d, "GET", "/shadow/literal").1, "capture:literal");
}

#[test]
fn test_unknown_method_token_is_404() {
    let d = dispatcher();
    assert_eq!(body(&d, "BR EW", "/").0, 404);
}
