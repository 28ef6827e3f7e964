use super::*;
use crate::app::App;
use crate::config::AppConfig;
use crate::context::RequestContext;
use crate::isolated::{IsolatedExecutor, WorkerCommand};
use crate::middleware::Middleware;
use crate::router::{RouteMatch, RouteOptions};
use anyhow::anyhow;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn app() -> App {
    App::new(AppConfig::default()).with_executor(IsolatedExecutor::new(
        WorkerCommand::new("/nonexistent/zeal-worker"),
        Duration::from_secs(1),
    ))
}

fn get(dispatcher: &Dispatcher, uri: &str) -> DispatchResponse {
    dispatcher.dispatch(RequestContext::new("GET", uri))
}

fn body_json(resp: &DispatchResponse) -> Value {
    serde_json::from_slice(&resp.body).unwrap()
}

#[test]
fn test_text_reply_is_html() {
    let mut app = app();
    app.route("/quiz/{page}", RouteOptions::new().param("page"), |args| {
        Ok(format!("<h1>This is quiz: {}</h1>", args.text("page").unwrap_or_default()))
    })
    .unwrap();
    let d = app.build().unwrap();
    let resp = get(&d, "/quiz/intro");
    assert_eq!(resp.status, 200);
    assert_eq!(resp.content_type(), Some(CONTENT_TYPE_HTML));
    assert_eq!(resp.body, b"<h1>This is quiz: intro</h1>");
}

#[test]
fn test_object_reply_is_json() {
    let mut app = app();
    app.route("/data", RouteOptions::new(), |_| Ok(json!({"a": 1})))
        .unwrap()
        .route("/list", RouteOptions::new(), |_| Ok(json!([1, 2])))
        .unwrap()
        .route("/num", RouteOptions::new(), |_| Ok(json!(42)))
        .unwrap();
    let d = app.build().unwrap();

    let resp = get(&d, "/data");
    assert_eq!(resp.content_type(), Some(CONTENT_TYPE_JSON));
    assert_eq!(body_json(&resp), json!({"a": 1}));

    let resp = get(&d, "/list");
    assert_eq!(resp.content_type(), Some(CONTENT_TYPE_JSON));

    let resp = get(&d, "/num");
    assert_eq!(resp.content_type(), Some(CONTENT_TYPE_HTML));
    assert_eq!(resp.body, b"42");
}

#[test]
fn test_no_route_is_fixed_404() {
    let d = app().build().unwrap();
    let resp = get(&d, "/does/not/exist");
    assert_eq!(resp.status, 404);
    assert_eq!(resp.content_type(), Some(CONTENT_TYPE_HTML));
    assert_eq!(resp.body, NOT_FOUND_BODY.as_bytes());
}

#[test]
fn test_wrong_method_falls_through_to_404() {
    let mut app = app();
    app.route("/only-get", RouteOptions::new(), |_| Ok("ok")).unwrap();
    let d = app.build().unwrap();
    let resp = d.dispatch(RequestContext::new("POST", "/only-get"));
    assert_eq!(resp.status, 404);
}

#[test]
fn test_sink_overrides_status_and_headers() {
    let mut app = app();
    app.route("/made", RouteOptions::new().param("response"), |args| {
        let sink = args.response().ok_or_else(|| anyhow!("no sink"))?;
        sink.set_status(201);
        sink.set_header("Location", "/made/1");
        sink.set_header("content-type", "text/plain");
        Ok("created")
    })
    .unwrap();
    let d = app.build().unwrap();
    let resp = get(&d, "/made");
    assert_eq!(resp.status, 201);
    assert_eq!(resp.get_header("location"), Some("/made/1"));
    assert_eq!(resp.content_type(), Some("text/plain"));
    assert_eq!(resp.headers.len(), 2);
}

#[test]
fn test_handler_error_is_500_json() {
    let mut app = app();
    app.route("/boom", RouteOptions::new(), |_| -> anyhow::Result<Reply> {
        Err(anyhow!("database unavailable"))
    })
    .unwrap();
    let d = app.build().unwrap();
    let resp = get(&d, "/boom");
    assert_eq!(resp.status, 500);
    assert_eq!(body_json(&resp), json!({"error": "database unavailable"}));
}

#[test]
fn test_handler_panic_is_contained() {
    let mut app = app();
    app.route("/panic", RouteOptions::new(), |_| -> anyhow::Result<Reply> {
        panic!("kaboom")
    })
    .unwrap()
    .route("/after", RouteOptions::new(), |_| Ok("still serving"))
    .unwrap();
    let d = app.build().unwrap();
    let resp = get(&d, "/panic");
    assert_eq!(resp.status, 500);
    assert!(body_json(&resp)["error"].as_str().unwrap().contains("kaboom"));
    assert_eq!(get(&d, "/after").body, b"still serving");
}

#[test]
fn test_request_unit_populated_and_released() {
    let mut app = app();
    app.route("/who", RouteOptions::new().param("context"), |args| {
        let unit = args.context().ok_or_else(|| anyhow!("no unit"))?;
        let query = unit.query()?;
        let session = unit.session()?;
        Ok(json!({
            "name": query.get("name"),
            "has_id": session.contains_key("UNIQUE_REQUEST_ID"),
            "method": unit.server()?.get("REQUEST_METHOD"),
        }))
    })
    .unwrap();
    let d = app.build().unwrap();
    let resp = get(&d, "/who?name=ada");
    assert_eq!(
        body_json(&resp),
        json!({"name": "ada", "has_id": true, "method": "GET"})
    );
    assert_eq!(d.app().context().len(), 1, "request unit must be released");
}

#[test]
fn test_concurrent_requests_do_not_share_units() {
    let mut app = app();
    app.route("/echo", RouteOptions::new().param("context"), |args| {
        let unit = args.context().ok_or_else(|| anyhow!("no unit"))?;
        let query = unit.query()?;
        let mine = query.get("v").cloned().unwrap_or_default();
        unit.set("mine", json!(mine));
        std::thread::sleep(Duration::from_millis(5));
        Ok(unit.get_as::<String>("mine")?)
    })
    .unwrap();
    let d = Arc::new(app.build().unwrap());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let d = Arc::clone(&d);
            std::thread::spawn(move || (i, get(&d, &format!("/echo?v={i}"))))
        })
        .collect();
    for h in handles {
        let (i, resp) = h.join().unwrap();
        assert_eq!(resp.body, i.to_string().as_bytes());
    }
}

#[test]
fn test_root_values_visible_from_request() {
    let mut config = AppConfig::default();
    config.context.insert("site_name".into(), json!("Zeal"));
    let mut app = App::new(config).with_executor(IsolatedExecutor::new(
        WorkerCommand::new("/nonexistent"),
        Duration::from_secs(1),
    ));
    app.route("/site", RouteOptions::new().param("context"), |args| {
        let unit = args.context().ok_or_else(|| anyhow!("no unit"))?;
        Ok(unit.get("site_name")?)
    })
    .unwrap();
    let d = app.build().unwrap();
    assert_eq!(get(&d, "/site").body, b"Zeal");
}

#[test]
fn test_isolated_spawn_failure_is_500() {
    let mut app = app();
    app.isolated_route("/iso", RouteOptions::new(), "created").unwrap();
    let d = app.build().unwrap();
    let resp = get(&d, "/iso");
    assert_eq!(resp.status, 500);
    assert!(body_json(&resp)["error"].is_string());
}

struct Gate {
    after_calls: AtomicUsize,
}

impl Middleware for Gate {
    fn before(&self, req: &RequestContext, route: Option<&RouteMatch>) -> Option<DispatchResponse> {
        if req.header("x-block").is_some() && route.is_some() {
            return Some(DispatchResponse::error(403, "blocked"));
        }
        None
    }

    fn after(
        &self,
        _req: &RequestContext,
        route: Option<&RouteMatch>,
        res: &mut DispatchResponse,
        _latency: Duration,
    ) {
        self.after_calls.fetch_add(1, Ordering::SeqCst);
        let name = route.map_or("none", |m| &*m.handler_name);
        res.set_header("X-Handler", name.to_string());
    }
}

#[test]
fn test_middleware_short_circuit_and_after_hook() {
    let gate = Arc::new(Gate {
        after_calls: AtomicUsize::new(0),
    });
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let mut app = app();
    app.middleware(Arc::clone(&gate) as Arc<dyn Middleware>);
    app.route("/guarded", RouteOptions::new().name("guarded"), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok("in")
    })
    .unwrap();
    let d = app.build().unwrap();

    let resp = d.dispatch(RequestContext::new("GET", "/guarded").with_header("X-Block", "1"));
    assert_eq!(resp.status, 403);
    assert_eq!(resp.get_header("x-handler"), Some("guarded"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let resp = get(&d, "/guarded");
    assert_eq!(resp.status, 200);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let resp = get(&d, "/missing");
    assert_eq!(resp.get_header("x-handler"), Some("none"));
    assert_eq!(gate.after_calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_reply_conversions() {
    assert_eq!(Reply::from(json!("text")), Reply::Html("text".into()));
    assert_eq!(Reply::from(Value::Null), Reply::Html(String::new()));
    assert_eq!(Reply::from(json!(true)), Reply::Html("true".into()));
    assert!(matches!(Reply::from(json!({})), Reply::Json(_)));
    assert_eq!(Reply::from("x").content_type(), CONTENT_TYPE_HTML);
}

#[test]
fn test_sink_header_replacement_is_case_insensitive() {
    let sink = ResponseSink::new();
    sink.set_header("X-Trace", "a");
    sink.set_header("x-trace", "b");
    assert_eq!(sink.headers().len(), 1);
    assert_eq!(sink.header("X-TRACE").as_deref(), Some("b"));
    assert_eq!(sink.status(), None);
}
