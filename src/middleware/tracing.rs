use std::time::Duration;

use tracing::{info, info_span};

use super::Middleware;
use crate::context::RequestContext;
use crate::dispatcher::DispatchResponse;
use crate::router::RouteMatch;

/// Emits a request event before dispatch and a completion event inside a request span.
///
/// Spans are not held across the handler: a coroutine may resume on another OS thread,
/// so an entered guard cannot outlive the hook.
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn before(&self, req: &RequestContext, route: Option<&RouteMatch>) -> Option<DispatchResponse> {
        info!(
            request_id = %req.request_id,
            method = %req.method,
            path = %req.path,
            handler = route.map_or("-", |m| m.handler_name.as_ref()),
            "Request received"
        );
        None
    }

    fn after(
        &self,
        req: &RequestContext,
        route: Option<&RouteMatch>,
        res: &mut DispatchResponse,
        latency: Duration,
    ) {
        let span = info_span!(
            "request",
            request_id = %req.request_id,
            method = %req.method,
            path = %req.path,
            handler = route.map_or("-", |m| m.handler_name.as_ref()),
        );
        span.in_scope(|| {
            info!(
                status = res.status,
                body_bytes = res.body.len(),
                latency_ms = latency.as_millis() as u64,
                "Request complete"
            );
        });
    }
}
