//! Dispatcher core module - hot path for request dispatch.

use super::response::{DispatchResponse, Reply, ResponseSink, CONTENT_TYPE_HTML};
use crate::app::AppHandle;
use crate::binder::{Args, ReservedObjects};
use crate::context::{populate, RequestContext, Unit};
use crate::isolated::{panic_message, Wait};
use crate::middleware::Middleware;
use crate::router::{RouteMatch, RouteTarget, Router};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Inline route handler.
///
/// Receives its declared parameters, already bound. Returning `Err` or panicking yields
/// a 500 with a JSON `{"error": ...}` body.
pub type Handler = Arc<dyn Fn(Args) -> anyhow::Result<Reply> + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(Args) -> anyhow::Result<Reply> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Turns decoded requests into responses.
///
/// One dispatcher is shared by every connection coroutine; it is immutable after
/// construction.
#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<Router>,
    app: AppHandle,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.router.len())
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new(router: Arc<Router>, app: AppHandle) -> Self {
        Self {
            router,
            app,
            middlewares: Vec::new(),
        }
    }

    /// Add middleware; hooks run in insertion order.
    pub fn add_middleware(&mut self, mw: Arc<dyn Middleware>) {
        self.middlewares.push(mw);
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    #[must_use]
    pub fn app(&self) -> &AppHandle {
        &self.app
    }

    /// Dispatch one request.
    ///
    /// The request gets its own execution unit, a child of the process root, populated
    /// with the well-known keys before routing. The unit is released when the handler
    /// and every sub-task it spawned are done with it.
    pub fn dispatch(&self, request: RequestContext) -> DispatchResponse {
        let request = Arc::new(request);
        let unit = self.app.context().root().child();
        if let Err(e) = populate(&unit, &request) {
            error!(request_id = %request.request_id, error = %e, "Context population failed");
            return DispatchResponse::error(500, &e.to_string());
        }

        let route_match = request
            .http_method()
            .and_then(|method| self.router.route(&method, &request.path));

        debug!(
            request_id = %request.request_id,
            middleware_count = self.middlewares.len(),
            "Middleware before execution"
        );
        let mut early_resp: Option<DispatchResponse> = None;
        for (idx, mw) in self.middlewares.iter().enumerate() {
            if early_resp.is_none() {
                early_resp = mw.before(&request, route_match.as_ref());
                if early_resp.is_some() {
                    debug!(
                        request_id = %request.request_id,
                        middleware_idx = idx,
                        "Middleware returned early response"
                    );
                }
            } else {
                mw.before(&request, route_match.as_ref());
            }
        }

        let start = Instant::now();
        let mut resp = match (early_resp, &route_match) {
            (Some(resp), _) => resp,
            (None, Some(m)) => self.invoke(m, &request, &unit),
            (None, None) => {
                info!(
                    request_id = %request.request_id,
                    method = %request.method,
                    path = %request.path,
                    "No route, responding 404"
                );
                DispatchResponse::not_found()
            }
        };
        let latency = start.elapsed();

        for mw in &self.middlewares {
            mw.after(&request, route_match.as_ref(), &mut resp, latency);
        }
        resp
    }

    fn invoke(&self, m: &RouteMatch, request: &Arc<RequestContext>, unit: &Unit) -> DispatchResponse {
        let sink = ResponseSink::new();
        info!(
            request_id = %request.request_id,
            handler_name = %m.handler_name,
            method = %request.method,
            path = %request.path,
            "Request dispatched to handler"
        );

        match &m.route.target {
            RouteTarget::Inline(handler) => {
                let reserved = ReservedObjects {
                    app: self.app.clone(),
                    request: Arc::clone(request),
                    response: sink.clone(),
                    context: unit.clone(),
                };
                let args = m.route.plan.bind(&m.path_params, &reserved);
                let start = Instant::now();
                match catch_unwind(AssertUnwindSafe(|| handler(args))) {
                    Ok(Ok(reply)) => {
                        let resp = DispatchResponse::from_reply(reply, &sink);
                        log_complete(request, m, resp.status, start.elapsed());
                        resp
                    }
                    Ok(Err(e)) => {
                        error!(
                            request_id = %request.request_id,
                            handler_name = %m.handler_name,
                            error = %format!("{e:#}"),
                            "Handler returned an error"
                        );
                        DispatchResponse::error(500, &format!("{e:#}"))
                    }
                    Err(panic) => {
                        let panic_message = panic_message(panic.as_ref());
                        error!(
                            request_id = %request.request_id,
                            handler_name = %m.handler_name,
                            panic_message = %panic_message,
                            "Handler panicked - CRITICAL"
                        );
                        DispatchResponse::error(500, &format!("Handler panicked: {panic_message}"))
                    }
                }
            }
            RouteTarget::Isolated(task) => {
                let executor = self.app.executor();
                match executor.run(task, request, &m.path_params, &sink, Wait::Block) {
                    Ok(Some(outcome)) => {
                        if outcome.envelope.faulted {
                            warn!(
                                request_id = %request.request_id,
                                handler_name = %m.handler_name,
                                error = ?outcome.envelope.error,
                                status = outcome.envelope.status_code,
                                "Isolated task faulted"
                            );
                        }
                        let mut resp = DispatchResponse::new(
                            200,
                            CONTENT_TYPE_HTML,
                            outcome.body.into_bytes(),
                        );
                        resp.apply_sink(&sink);
                        log_complete(request, m, resp.status, outcome.elapsed);
                        resp
                    }
                    Ok(None) => DispatchResponse::new(
                        202,
                        CONTENT_TYPE_HTML,
                        Vec::new(),
                    ),
                    Err(e) => {
                        error!(
                            request_id = %request.request_id,
                            handler_name = %m.handler_name,
                            task = %task,
                            error = %e,
                            "Isolated execution failed"
                        );
                        DispatchResponse::error(500, &e.to_string())
                    }
                }
            }
        }
    }
}

fn log_complete(request: &RequestContext, m: &RouteMatch, status: u16, elapsed: Duration) {
    info!(
        request_id = %request.request_id,
        handler_name = %m.handler_name,
        status = status,
        execution_time_ms = elapsed.as_millis() as u64,
        "Handler execution complete"
    );
}
