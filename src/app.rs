//! # Application Module
//!
//! [`App`] is the registration surface. Routes are registered in priority order, then
//! the app is frozen into a [`Dispatcher`] (or straight into an HTTP service) and the
//! route table never changes again.
//!
//! ```rust,no_run
//! use zealrouter::app::App;
//! use zealrouter::config::AppConfig;
//! use zealrouter::router::RouteOptions;
//!
//! let mut app = App::new(AppConfig::default());
//! app.route("/hello/{name}", RouteOptions::new().param("name"), |args| {
//!     Ok(format!("<h1>Hello, {}</h1>", args.text("name").unwrap_or("stranger")))
//! })?;
//! let server = app.run("127.0.0.1:8080")?;
//! server.join().ok();
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::binder::Args;
use crate::config::AppConfig;
use crate::context::{ContextStore, Unit};
use crate::dispatcher::{Dispatcher, Handler, Reply};
use crate::isolated::IsolatedExecutor;
use crate::middleware::Middleware;
use crate::router::{namespaced, RegistrationError, RouteOptions, RoutePattern, RouteTarget, Router};
use crate::server::{AppService, HttpServer, ServerHandle};
use anyhow::Context as _;
use std::fmt;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use tracing::info;

struct AppShared {
    config: AppConfig,
    context: Arc<ContextStore>,
    executor: IsolatedExecutor,
}

/// Shared framework instance, handed to handlers as the reserved `app` (or `self`)
/// parameter.
#[derive(Clone)]
pub struct AppHandle {
    inner: Arc<AppShared>,
}

impl fmt::Debug for AppHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppHandle")
            .field("server", &self.inner.config.server.addr())
            .field("units", &self.inner.context.len())
            .field("worker", &self.inner.executor.command().program())
            .finish()
    }
}

impl AppHandle {
    /// Build the shared instance and seed the process root with `config.context`.
    #[must_use]
    pub fn new(config: AppConfig, executor: IsolatedExecutor) -> Self {
        let context = Arc::new(ContextStore::with_runtime(config.runtime_config()));
        let root = context.root();
        for (key, value) in &config.context {
            root.set(key, value.clone());
        }
        Self {
            inner: Arc::new(AppShared {
                config,
                context,
                executor,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn context(&self) -> &Arc<ContextStore> {
        &self.inner.context
    }

    /// The process root unit.
    #[must_use]
    pub fn root(&self) -> Unit {
        self.inner.context.root()
    }

    #[must_use]
    pub fn executor(&self) -> &IsolatedExecutor {
        &self.inner.executor
    }
}

/// Route registration and startup.
pub struct App {
    config: AppConfig,
    router: Router,
    middlewares: Vec<Arc<dyn Middleware>>,
    executor: Option<IsolatedExecutor>,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("routes", &self.router.len())
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

fn wrap<F, R>(f: F) -> Handler
where
    F: Fn(Args) -> anyhow::Result<R> + Send + Sync + 'static,
    R: Into<Reply>,
{
    Arc::new(move |args: Args| f(args).map(Into::into))
}

impl App {
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            router: Router::new(),
            middlewares: Vec::new(),
            executor: None,
        }
    }

    /// Use this executor instead of one built from `config.isolated`.
    #[must_use]
    pub fn with_executor(mut self, executor: IsolatedExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn middleware(&mut self, mw: Arc<dyn Middleware>) -> &mut Self {
        self.middlewares.push(mw);
        self
    }

    /// Register an inline handler for a path template such as `/quiz/{page}`.
    pub fn route<F, R>(
        &mut self,
        template: &str,
        options: RouteOptions,
        f: F,
    ) -> Result<&mut Self, RegistrationError>
    where
        F: Fn(Args) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<Reply>,
    {
        let pattern = RoutePattern::template(template)?;
        self.router
            .register(pattern, options, RouteTarget::Inline(wrap(f)))?;
        Ok(self)
    }

    /// Register under `/namespace/template`.
    pub fn ns_route<F, R>(
        &mut self,
        namespace: &str,
        template: &str,
        options: RouteOptions,
        f: F,
    ) -> Result<&mut Self, RegistrationError>
    where
        F: Fn(Args) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<Reply>,
    {
        self.route(&namespaced(namespace, template), options, f)
    }

    /// Like [`App::ns_route`], but the last placeholder swallows the rest of the path.
    pub fn ns_path_route<F, R>(
        &mut self,
        namespace: &str,
        template: &str,
        options: RouteOptions,
        f: F,
    ) -> Result<&mut Self, RegistrationError>
    where
        F: Fn(Args) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<Reply>,
    {
        let pattern = RoutePattern::catch_all(&namespaced(namespace, template))?;
        self.router
            .register(pattern, options, RouteTarget::Inline(wrap(f)))?;
        Ok(self)
    }

    /// Register a raw expression; its named groups are the captures.
    pub fn pattern_route<F, R>(
        &mut self,
        pattern: &str,
        options: RouteOptions,
        f: F,
    ) -> Result<&mut Self, RegistrationError>
    where
        F: Fn(Args) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<Reply>,
    {
        let pattern = RoutePattern::raw(pattern)?;
        self.router
            .register(pattern, options, RouteTarget::Inline(wrap(f)))?;
        Ok(self)
    }

    /// Run the named task in a worker process for this template.
    ///
    /// The task must be registered in the worker binary's task registry.
    pub fn isolated_route(
        &mut self,
        template: &str,
        options: RouteOptions,
        task: &str,
    ) -> Result<&mut Self, RegistrationError> {
        let pattern = RoutePattern::template(template)?;
        self.router
            .register(pattern, options, RouteTarget::Isolated(Arc::from(task)))?;
        Ok(self)
    }

    pub fn ns_isolated_route(
        &mut self,
        namespace: &str,
        template: &str,
        options: RouteOptions,
        task: &str,
    ) -> Result<&mut Self, RegistrationError> {
        self.isolated_route(&namespaced(namespace, template), options, task)
    }

    /// Freeze the route table.
    pub fn build(self) -> anyhow::Result<Dispatcher> {
        let executor = match self.executor {
            Some(executor) => executor,
            None => IsolatedExecutor::from_config(&self.config.isolated)
                .context("configuring the isolated executor")?,
        };
        let app = AppHandle::new(self.config, executor);
        info!(
            routes = self.router.len(),
            middlewares = self.middlewares.len(),
            root_keys = app.config().context.len(),
            "Application built"
        );
        let mut dispatcher = Dispatcher::new(Arc::new(self.router), app);
        for mw in self.middlewares {
            dispatcher.add_middleware(mw);
        }
        Ok(dispatcher)
    }

    pub fn into_service(self) -> anyhow::Result<AppService> {
        Ok(AppService::new(Arc::new(self.build()?)))
    }

    /// Build and start serving on `addr`.
    ///
    /// Applies the configured coroutine stack size to the `may` runtime first.
    pub fn run<A: ToSocketAddrs>(self, addr: A) -> anyhow::Result<ServerHandle> {
        let stack_size = self.config.runtime_config().stack_size;
        may::config().set_stack_size(stack_size);
        info!(stack_size = stack_size, "Coroutine stack size configured");
        let service = self.into_service()?;
        HttpServer(service)
            .start(addr)
            .context("starting the HTTP server")
    }
}
