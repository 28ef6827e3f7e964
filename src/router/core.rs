//! Router core module - hot path for request routing.

use super::error::RegistrationError;
use super::pattern::RoutePattern;
use crate::binder::{BindingPlan, ParamDecl};
use crate::dispatcher::Handler;
use http::Method;
use serde_json::Value;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Maximum number of captured parameters before heap allocation.
/// Most routes have ≤4 placeholders (e.g., /user/{id}/post/{postId}).
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated capture storage for the hot path.
///
/// Names use `Arc<str>` because they come from the compiled route (known at startup);
/// values are per-request data from the URL.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Method set of a route; nearly every route has one or two.
pub type MethodSet = SmallVec<[Method; 4]>;

/// What runs when a route matches.
#[derive(Clone)]
pub enum RouteTarget {
    /// Invoke the handler directly in the serving coroutine
    Inline(Handler),
    /// Run the named task in an isolated worker process
    Isolated(Arc<str>),
}

impl fmt::Debug for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteTarget::Inline(_) => f.write_str("Inline(<handler>)"),
            RouteTarget::Isolated(task) => write!(f, "Isolated({task})"),
        }
    }
}

/// Registration options: accepted methods, declared handler parameters, a log label.
#[derive(Debug, Clone)]
pub struct RouteOptions {
    methods: Vec<String>,
    params: Vec<ParamDecl>,
    name: Option<String>,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            methods: vec!["GET".to_string()],
            params: Vec::new(),
            name: None,
        }
    }
}

impl RouteOptions {
    /// `GET` only, no declared parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the accepted methods. Names are compared case-insensitively.
    #[must_use]
    pub fn methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.methods = methods
            .into_iter()
            .map(|m| m.as_ref().to_string())
            .collect();
        self
    }

    /// Declare the next handler parameter.
    #[must_use]
    pub fn param(mut self, name: &str) -> Self {
        self.params.push(ParamDecl::new(name));
        self
    }

    /// Declare several handler parameters in order.
    #[must_use]
    pub fn params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.params
            .extend(names.into_iter().map(|n| ParamDecl::new(n.as_ref())));
        self
    }

    /// Declare the next handler parameter with a default value.
    #[must_use]
    pub fn param_default(mut self, name: &str, default: Value) -> Self {
        self.params.push(ParamDecl::with_default(name, default));
        self
    }

    /// Label used in logs and the route dump instead of the generated one.
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn declared_params(&self) -> &[ParamDecl] {
        &self.params
    }
}

/// A registered route. Immutable once it is in the table.
#[derive(Debug)]
pub struct Route {
    pub methods: MethodSet,
    pub pattern: RoutePattern,
    pub handler_name: Arc<str>,
    pub target: RouteTarget,
    pub plan: BindingPlan,
}

impl Route {
    #[must_use]
    pub fn accepts(&self, method: &Method) -> bool {
        self.methods.iter().any(|m| m == method)
    }
}

/// Result of successfully matching a request path to a route
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// The matched route (Arc to avoid expensive clones)
    pub route: Arc<Route>,
    /// Named captures extracted from the path (e.g., `{id}` → `("id", "123")`)
    pub path_params: ParamVec,
    /// Label of the matched route
    pub handler_name: Arc<str>,
}

impl RouteMatch {
    /// Get a captured parameter by name
    ///
    /// Uses "last write wins" semantics if a raw pattern repeats a name.
    #[inline]
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Ordered route table.
///
/// Routes are scanned in registration order and the first one whose method set and
/// pattern both match wins, regardless of how specific later routes are. Registering
/// a route early is how an application overrides a later, identical shape.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Arc<Route>>,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered routes in match-priority order.
    #[must_use]
    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    /// Append a compiled pattern to the table.
    ///
    /// Method names are upper-cased before validation, so `"post"` and `"POST"` are the
    /// same method. The declared parameters are resolved against the pattern's capture
    /// names here, once.
    pub fn register(
        &mut self,
        pattern: RoutePattern,
        options: RouteOptions,
        target: RouteTarget,
    ) -> Result<Arc<Route>, RegistrationError> {
        let methods = normalize_methods(&options.methods, pattern.source())?;
        let handler_name: Arc<str> = match &options.name {
            Some(name) => Arc::from(name.as_str()),
            None => Arc::from(format!("{} {}", join_methods(&methods), pattern.source())),
        };
        let plan = BindingPlan::resolve(options.params, pattern.param_names());

        let route = Arc::new(Route {
            methods,
            pattern,
            handler_name,
            target,
            plan,
        });

        info!(
            handler_name = %route.handler_name,
            pattern = %route.pattern.source(),
            kind = ?route.pattern.kind(),
            regex = %route.pattern.as_regex().as_str(),
            priority = self.routes.len(),
            declared_params = ?route.plan.names().collect::<Vec<_>>(),
            "Route registered"
        );

        self.routes.push(Arc::clone(&route));
        Ok(route)
    }

    /// Print all registered routes to stdout in priority order.
    pub fn dump_routes(&self) {
        println!("[routes] count={}", self.routes.len());
        for (idx, route) in self.routes.iter().enumerate() {
            println!(
                "[route] #{idx} {} {} ({:?}) -> {} {:?}",
                join_methods(&route.methods),
                route.pattern.source(),
                route.pattern.kind(),
                route.handler_name,
                route.target
            );
        }
    }

    /// Match an HTTP request to a route.
    ///
    /// # Arguments
    ///
    /// * `method` - HTTP method (GET, POST, etc.)
    /// * `path` - Request path without query string (e.g., `/quiz/intro`)
    ///
    /// # Returns
    ///
    /// * `Some(RouteMatch)` - The first route, in registration order, that accepts it
    /// * `None` - No route matches (results in 404)
    #[must_use]
    pub fn route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        debug!(method = %method, path = %path, "Route match attempt");

        let match_start = Instant::now();
        for (idx, route) in self.routes.iter().enumerate() {
            if !route.accepts(method) {
                continue;
            }
            let Some(params) = route.pattern.captures(path) else {
                continue;
            };

            let match_duration = match_start.elapsed();
            if match_duration > Duration::from_millis(1) {
                warn!(
                    method = %method,
                    path = %path,
                    handler_name = %route.handler_name,
                    priority = idx,
                    duration_us = match_duration.as_micros(),
                    "Slow route matching detected"
                );
            } else {
                info!(
                    method = %method,
                    path = %path,
                    handler_name = %route.handler_name,
                    route_pattern = %route.pattern.source(),
                    path_params = ?params,
                    priority = idx,
                    duration_us = match_duration.as_micros(),
                    "Route matched"
                );
            }

            return Some(RouteMatch {
                route: Arc::clone(route),
                path_params: params,
                handler_name: Arc::clone(&route.handler_name),
            });
        }

        warn!(
            method = %method,
            path = %path,
            routes_scanned = self.routes.len(),
            duration_us = match_start.elapsed().as_micros(),
            "No route matched"
        );
        None
    }
}

fn normalize_methods(methods: &[String], pattern: &str) -> Result<MethodSet, RegistrationError> {
    if methods.is_empty() {
        return Err(RegistrationError::NoMethods {
            pattern: pattern.to_string(),
        });
    }
    let mut set = MethodSet::new();
    for raw in methods {
        let upper = raw.trim().to_ascii_uppercase();
        let method =
            Method::from_bytes(upper.as_bytes()).map_err(|_| RegistrationError::InvalidMethod {
                method: raw.clone(),
            })?;
        if !set.contains(&method) {
            set.push(method);
        }
    }
    Ok(set)
}

fn join_methods(methods: &[Method]) -> String {
    methods
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(",")
}
