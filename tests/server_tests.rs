//! Integration tests for the HTTP server and request processing pipeline
//!
//! # Test Strategy
//!
//! Starts the demo application on a free local port and talks raw HTTP/1.1 to it:
//! request decoding → router → dispatcher → handler (inline or isolated) → response
//! encoding. Isolated routes use the crate's own binary as the worker.

use serde_json::{json, Value};
use std::time::Duration;
use zealrouter::config::AppConfig;

mod common;
use common::http::{get, post, send_request};
use common::test_server::DemoServer;

fn server() -> DemoServer {
    let mut config = AppConfig::default();
    config.context.insert("site_name".into(), json!("ZealTest"));
    DemoServer::start(config, Duration::from_secs(3))
}

#[test]
fn test_root_and_override() {
    let s = server();
    let resp = get(&s.addr, "/");
    assert_eq!(resp.status, 200);
    assert_eq!(resp.text(), "<h1>Hello, Zeal!</h1>");
    assert_eq!(resp.header("content-type"), Some("text/html; charset=UTF-8"));
    assert_eq!(get(&s.addr, "/home").text(), "<h1>This is home override</h1>");
}

#[test]
fn test_quiz_templates_by_depth() {
    let s = server();
    assert_eq!(get(&s.addr, "/quiz/intro").text(), "<h1>This is quiz: intro</h1>");
    assert_eq!(
        get(&s.addr, "/quiz/intro/2").text(),
        "<h1>This is quiz: intro tab=2</h1>"
    );
    assert_eq!(
        get(&s.addr, "/quiz/intro/2/9").text(),
        "<h1>This is quiz: intro tab=2 id=9</h1>"
    );
}

#[test]
fn test_not_found() {
    let s = server();
    let resp = get(&s.addr, "/does/not/exist");
    assert_eq!(resp.status, 404);
    assert_eq!(resp.text(), "<h1>404 Not Found</h1>");
}

#[test]
fn test_framework_handle_and_root_context() {
    let s = server();
    assert_eq!(
        get(&s.addr, "/hello/ada").text(),
        "<h1>Hello, ada! Welcome to ZealTest</h1>"
    );
}

#[test]
fn test_request_global_views() {
    let s = server();
    let get_view: Value = serde_json::from_str(&get(&s.addr, "/global/get?a=1&b=two").text()).unwrap();
    assert_eq!(get_view, json!({"a": "1", "b": "two"}));

    let post_view: Value = serde_json::from_str(
        &post(
            &s.addr,
            "/global/post",
            "application/x-www-form-urlencoded",
            "name=ada&lang=rust",
        )
        .text(),
    )
    .unwrap();
    assert_eq!(post_view, json!({"name": "ada", "lang": "rust"}));

    let resp = send_request(
        &s.addr,
        "GET /global/cookie HTTP/1.1\r\nHost: localhost\r\nCookie: sid=abc; theme=dark\r\n\r\n",
    );
    let cookies: Value = serde_json::from_str(&resp.text()).unwrap();
    assert_eq!(cookies, json!({"sid": "abc", "theme": "dark"}));

    assert_eq!(get(&s.addr, "/global/nope").text(), "Unknown superglobal");
}

#[test]
fn test_two_placeholders_and_methods() {
    let s = server();
    assert_eq!(get(&s.addr, "/user/7/post/42").text(), "<h1>User 7, Post 42</h1>");
    assert_eq!(
        post(&s.addr, "/user/7/post/42", "text/plain", "").text(),
        "<h1>User 7, Post 42</h1>"
    );
    let resp = send_request(
        &s.addr,
        "DELETE /user/7/post/42 HTTP/1.1\r\nHost: localhost\r\n\r\n",
    );
    assert_eq!(resp.status, 404);
}

#[test]
fn test_namespace_route_reads_query() {
    let s = server();
    assert_eq!(get(&s.addr, "/watch/get/v?v=abc123").text(), "abc123");
    assert_eq!(get(&s.addr, "/watch/get/missing").text(), "");
}

#[test]
fn test_catch_all_json() {
    let s = server();
    let resp = get(&s.addr, "/api/users/list/active");
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("content-type"), Some("application/json"));
    assert_eq!(resp.header("x-api-module"), Some("users"));
    let body: Value = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(body, json!({"module": "users", "rest": "list/active"}));
}

#[test]
fn test_raw_pattern_route() {
    let s = server();
    assert_eq!(get(&s.addr, "/raw/a/b/c").text(), "You requested: a/b/c");
    assert_eq!(get(&s.addr, "/raw/").text(), "You requested: ");
}

#[test]
fn test_declared_default_and_sub_task() {
    let s = server();
    assert_eq!(get(&s.addr, "/greet/ada").text(), "Hello, ada");
    assert_eq!(get(&s.addr, "/spawn/ada").text(), "sub-task saw ada");
}

#[test]
fn test_handler_failures_are_500() {
    let s = server();
    let resp = get(&s.addr, "/fail/error");
    assert_eq!(resp.status, 500);
    assert_eq!(resp.header("content-type"), Some("application/json"));
    let body: Value = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(body, json!({"error": "handler refused"}));

    let resp = get(&s.addr, "/fail/panic");
    assert_eq!(resp.status, 500);
    // The server keeps serving after a handler panic.
    assert_eq!(get(&s.addr, "/").status, 200);
}

#[test]
fn test_isolated_routes_over_http() {
    let s = server();
    let resp = get(&s.addr, "/isolated/created");
    assert_eq!(resp.status, 201);
    assert_eq!(resp.text(), "ok");

    let resp = get(&s.addr, "/isolated/crash");
    assert_eq!(resp.status, 500);
    assert!(resp.body.is_empty());

    let resp = get(&s.addr, "/isolated/partial");
    assert_eq!(resp.status, 500);
    assert_eq!(resp.text(), "partial");

    let resp = get(&s.addr, "/isolated/exit");
    assert_eq!(resp.status, 200);
    assert_eq!(resp.text(), "stopping early");

    assert_eq!(get(&s.addr, "/isolated/eof").text(), "EOF");

    let resp = get(&s.addr, "/isolated/print");
    assert_eq!(resp.status, 200);
    assert_eq!(resp.text(), "printed by the task\nthen echoed");

    let resp = get(&s.addr, "/isolated/report/ada?x=1");
    assert_eq!(resp.header("content-type"), Some("application/json"));
    let body: Value = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(body["params"]["name"], "ada");
}

#[test]
fn test_isolated_timeout_is_504() {
    let s = server();
    let resp = get(&s.addr, "/isolated/sleep/10000");
    assert_eq!(resp.status, 504);
    assert!(resp.body.is_empty());
}

#[test]
fn test_coprocess_route() {
    let s = server();
    assert_eq!(
        get(&s.addr, "/coprocess?name=Zeal").text(),
        "<pre>Hello, Zeal</pre>"
    );
}

#[test]
fn test_concurrent_requests() {
    let s = server();
    let addr = s.addr;
    let handles: Vec<_> = (0..16)
        .map(|i| {
            std::thread::spawn(move || {
                let resp = get(&addr, &format!("/watch/get/k?k=v{i}"));
                (i, resp.text())
            })
        })
        .collect();
    for h in handles {
        let (i, text) = h.join().unwrap();
        assert_eq!(text, format!("v{i}"));
    }
}
