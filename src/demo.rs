//! Demo application served by the `zealrouter` binary.
//!
//! The same routes back the end-to-end tests, and [`tasks`] is the registry the binary
//! uses when it is started as an isolated worker.

use crate::app::App;
use crate::config::AppConfig;
use crate::dispatcher::Reply;
use crate::isolated::{TaskFault, TaskRegistry};
use crate::middleware::{AccessLogMiddleware, TracingMiddleware};
use crate::router::{RegistrationError, RouteOptions};
use anyhow::anyhow;
use serde_json::json;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

/// Register the demo routes, in match-priority order.
pub fn build_app(config: AppConfig) -> Result<App, RegistrationError> {
    let mut app = App::new(config);
    app.middleware(Arc::new(TracingMiddleware))
        .middleware(Arc::new(AccessLogMiddleware::new()));

    app.route("/", RouteOptions::new(), |_| Ok("<h1>Hello, Zeal!</h1>"))?
        .route("/home", RouteOptions::new(), |_| {
            Ok("<h1>This is home override</h1>")
        })?
        .route("/quiz/{page}", RouteOptions::new().param("page"), |args| {
            Ok(format!(
                "<h1>This is quiz: {}</h1>",
                args.text("page").unwrap_or_default()
            ))
        })?
        .route(
            "/quiz/{page}/{tab}",
            RouteOptions::new().params(["page", "tab"]),
            |args| {
                Ok(format!(
                    "<h1>This is quiz: {} tab={}</h1>",
                    args.text("page").unwrap_or_default(),
                    args.text("tab").unwrap_or_default()
                ))
            },
        )?
        .route(
            "/quiz/{page}/{tab}/{id}",
            RouteOptions::new().params(["page", "tab", "id"]),
            |args| {
                Ok(format!(
                    "<h1>This is quiz: {} tab={} id={}</h1>",
                    args.text("page").unwrap_or_default(),
                    args.text("tab").unwrap_or_default(),
                    args.text("id").unwrap_or_default()
                ))
            },
        )?
        .route(
            "/hello/{name}",
            RouteOptions::new().params(["name", "self"]),
            |args| {
                let app = args.app().ok_or_else(|| anyhow!("framework handle not bound"))?;
                let site = app.root().get_or("site_name", json!("zealrouter"));
                Ok(format!(
                    "<h1>Hello, {}! Welcome to {}</h1>",
                    args.text("name").unwrap_or_default(),
                    site.as_str().unwrap_or("zealrouter")
                ))
            },
        )?
        .route(
            "/global/{name}",
            RouteOptions::new()
                .methods(["GET", "POST"])
                .params(["name", "context"]),
            |args| {
                let name = args.text("name").unwrap_or_default();
                let unit = args.context().ok_or_else(|| anyhow!("context not bound"))?;
                Ok(match unit.get(name) {
                    Ok(value) => Reply::Html(serde_json::to_string_pretty(&value)?),
                    Err(_) => Reply::html("Unknown superglobal"),
                })
            },
        )?
        .route(
            "/user/{id}/post/{postId}",
            RouteOptions::new()
                .methods(["GET", "POST"])
                .params(["id", "postId"]),
            |args| {
                Ok(format!(
                    "<h1>User {}, Post {}</h1>",
                    args.text("id").unwrap_or_default(),
                    args.text("postId").unwrap_or_default()
                ))
            },
        )?
        .ns_route(
            "watch",
            "/get/{key}",
            RouteOptions::new().params(["key", "request"]),
            |args| {
                let key = args.text("key").unwrap_or_default();
                let value = args
                    .request()
                    .and_then(|r| r.query_param(key))
                    .unwrap_or_default();
                Ok(value.to_string())
            },
        )?
        .ns_path_route(
            "api",
            "{module}/{rest}",
            RouteOptions::new().params(["module", "rest", "response"]),
            |args| {
                if let Some(sink) = args.response() {
                    sink.set_header("X-Api-Module", args.text("module").unwrap_or_default());
                }
                Ok(json!({
                    "module": args.text("module"),
                    "rest": args.text("rest"),
                }))
            },
        )?
        .pattern_route(
            "/raw/(?P<rest>.*)",
            RouteOptions::new().param("rest"),
            |args| {
                Ok(format!(
                    "You requested: {}",
                    args.text("rest").unwrap_or_default()
                ))
            },
        )?
        .route(
            "/greet/{name}",
            RouteOptions::new()
                .param("name")
                .param_default("greeting", json!("Hello")),
            |args| {
                Ok(format!(
                    "{}, {}",
                    args.text("greeting").unwrap_or_default(),
                    args.text("name").unwrap_or_default()
                ))
            },
        )?
        .route(
            "/spawn/{name}",
            RouteOptions::new().params(["name", "context"]),
            |args| {
                let unit = args.context().ok_or_else(|| anyhow!("context not bound"))?;
                unit.set("visitor", json!(args.text("name")));
                let handle = unit.spawn(|task| task.get_as::<String>("visitor"))?;
                let seen = handle
                    .join()
                    .map_err(|_| anyhow!("sub-task panicked"))??;
                Ok(format!("sub-task saw {seen}"))
            },
        )?
        .route(
            "/coprocess",
            RouteOptions::new().params(["self", "request"]),
            |args| {
                let app = args.app().ok_or_else(|| anyhow!("framework handle not bound"))?;
                let request = args.request().ok_or_else(|| anyhow!("request not bound"))?;
                let body = app.executor().coprocess("greet", request)?;
                Ok(format!("<pre>{}</pre>", String::from_utf8_lossy(&body)))
            },
        )?
        .route("/fail/error", RouteOptions::new(), |_| -> anyhow::Result<Reply> {
            Err(anyhow!("handler refused"))
        })?
        .route("/fail/panic", RouteOptions::new(), |_| -> anyhow::Result<Reply> {
            panic!("handler blew up")
        })?
        .ns_isolated_route("isolated", "/created", RouteOptions::new(), "created")?
        .ns_isolated_route("isolated", "/crash", RouteOptions::new(), "crash_silent")?
        .ns_isolated_route("isolated", "/partial", RouteOptions::new(), "crash_partial")?
        .ns_isolated_route("isolated", "/exit", RouteOptions::new(), "early_exit")?
        .ns_isolated_route("isolated", "/eof", RouteOptions::new(), "echo_eof")?
        .ns_isolated_route("isolated", "/print", RouteOptions::new(), "print_stdout")?
        .ns_isolated_route("isolated", "/sleep/{ms}", RouteOptions::new(), "sleep")?
        .ns_isolated_route(
            "isolated",
            "/report/{name}",
            RouteOptions::new().methods(["GET", "POST"]),
            "report",
        )?;

    Ok(app)
}

/// Tasks the demo's isolated routes run.
#[must_use]
pub fn tasks() -> TaskRegistry {
    let mut tasks = TaskRegistry::new();
    tasks
        .register("created", |ctx| {
            ctx.set_status(201);
            write!(ctx, "ok")?;
            Ok(())
        })
        .register("crash_silent", |_ctx| panic!("worker crashed before writing"))
        .register("crash_partial", |ctx| {
            ctx.echo("partial");
            Err(anyhow!("worker failed halfway").into())
        })
        .register("early_exit", |ctx| {
            ctx.echo("stopping early");
            ctx.exit()
        })
        .register("print_stdout", |ctx| {
            println!("printed by the task");
            ctx.echo("then echoed");
            Ok(())
        })
        .register("print_then_fail", |_ctx| {
            print!("half a line");
            Err(anyhow!("gave up after printing").into())
        })
        .register("echo_eof", |ctx| {
            ctx.echo("EOF");
            Ok(())
        })
        .register("sleep", |ctx| {
            let ms: u64 = ctx
                .param("ms")
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| TaskFault::from(anyhow!("`ms` must be a number")))?;
            std::thread::sleep(Duration::from_millis(ms));
            ctx.echo("awake");
            Ok(())
        })
        .register("report", |ctx| {
            let params: HashMap<&str, &str> = ctx
                .params()
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            let report = json!({
                "task": "report",
                "method": ctx.request().method,
                "params": params,
                "query": ctx.request().query,
            });
            ctx.set_header("Content-Type", "application/json");
            ctx.set_header("X-Worker-Pid", &std::process::id().to_string());
            serde_json::to_writer(&mut *ctx, &report).map_err(|e| TaskFault::Error(e.into()))?;
            Ok(())
        })
        .register("greet", |ctx| {
            let name = ctx
                .request()
                .query_param("name")
                .unwrap_or("world")
                .to_string();
            write!(ctx, "Hello, {name}")?;
            Ok(())
        });
    tasks
}
