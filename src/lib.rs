//! # zealrouter
//!
//! **zealrouter** is the core of a coroutine-powered micro web framework: an ordered
//! route table, reflection-free handler parameter binding, a context store scoped to
//! execution units, and process-isolated handler execution, served by `may_minihttp`.
//!
//! ## Architecture
//!
//! - **[`router`]** - Route patterns (templates, catch-alls, raw expressions) and first-match routing
//! - **[`binder`]** - Binds captured values and framework objects to declared handler parameters
//! - **[`context`]** - Execution-unit scoped key/value store with parent fallback
//! - **[`dispatcher`]** - Turns a decoded request into a response
//! - **[`isolated`]** - Runs a handler task in a worker process over a framed pipe protocol
//! - **[`middleware`]** - `before`/`after` hooks (tracing, access log)
//! - **[`server`]** - `may_minihttp` glue: request decoding and response encoding
//! - **[`app`]** - Registration surface tying the pieces together
//! - **[`config`]**, **[`logging`]**, **[`cli`]** - Ambient runtime concerns
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Server as server::AppService
//!     participant Dispatcher
//!     participant Router
//!     participant Store as context::ContextStore
//!     participant Handler
//!     participant Worker as isolated worker
//!
//!     Client->>Server: HTTP request
//!     Server->>Dispatcher: RequestContext
//!     Dispatcher->>Store: child unit of root, populate well-known keys
//!     Dispatcher->>Router: route(method, path)
//!     Router-->>Dispatcher: RouteMatch (first match wins)
//!     alt inline route
//!         Dispatcher->>Handler: bound Args
//!         Handler-->>Dispatcher: Reply
//!     else isolated route
//!         Dispatcher->>Worker: R frame (task, request, captures)
//!         Worker-->>Dispatcher: B or N frame, then E envelope
//!     end
//!     Dispatcher-->>Server: DispatchResponse
//!     Server-->>Client: HTTP response
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zealrouter::app::App;
//! use zealrouter::config::AppConfig;
//! use zealrouter::router::RouteOptions;
//!
//! let mut app = App::new(AppConfig::default());
//! app.route("/quiz/{page}", RouteOptions::new().param("page"), |args| {
//!     Ok(format!("<h1>This is quiz: {}</h1>", args.text("page").unwrap_or_default()))
//! })?
//! .ns_path_route("api", "{module}/{rest}", RouteOptions::new().params(["module", "rest"]), |args| {
//!     Ok(serde_json::json!({ "module": args.text("module"), "rest": args.text("rest") }))
//! })?;
//!
//! let server = app.run("127.0.0.1:8080")?;
//! server.wait_ready()?;
//! server.join().ok();
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Isolated Routes
//!
//! A binary that registers isolated routes must also be able to run as the worker.
//! Build the same [`isolated::TaskRegistry`] in both roles and check for the worker role
//! first thing in `main`:
//!
//! ```rust,no_run
//! use zealrouter::isolated::{maybe_run_worker, TaskRegistry};
//!
//! fn tasks() -> TaskRegistry {
//!     let mut tasks = TaskRegistry::new();
//!     tasks.register("created", |ctx| {
//!         ctx.set_status(201);
//!         ctx.echo("ok");
//!         Ok(())
//!     });
//!     tasks
//! }
//!
//! fn main() {
//!     if let Some(code) = maybe_run_worker(&tasks()) {
//!         std::process::exit(code);
//!     }
//!     // register routes and serve
//! }
//! ```
//!
//! ## Runtime Configuration
//!
//! - `ZEAL_STACK_SIZE` - coroutine stack size, decimal or `0x` hex (default `0x10000`)
//! - `ZEAL_LOG_LEVEL`, `ZEAL_LOG_FORMAT`, `ZEAL_LOG_ASYNC` - see [`logging`]
//! - `ZEAL_ADDR`, `ZEAL_CONFIG` - used by the `serve` command

pub mod app;
pub mod binder;
pub mod cli;
pub mod config;
pub mod context;
pub mod demo;
pub mod dispatcher;
pub mod ids;
pub mod isolated;
pub mod logging;
pub mod middleware;
pub mod router;
pub mod server;

pub use app::{App, AppHandle};
pub use binder::{Arg, Args};
pub use dispatcher::{DispatchResponse, Dispatcher, Reply, ResponseSink};
pub use router::{RouteOptions, Router};
