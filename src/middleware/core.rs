use std::time::Duration;

use crate::context::RequestContext;
use crate::dispatcher::DispatchResponse;
use crate::router::RouteMatch;

/// Hooks around every dispatched request, matched or not.
///
/// `route` is `None` when no route matched (the response will be a 404).
pub trait Middleware: Send + Sync {
    /// Return `Some` to answer without running the handler.
    fn before(&self, _req: &RequestContext, _route: Option<&RouteMatch>) -> Option<DispatchResponse> {
        None
    }
    fn after(
        &self,
        _req: &RequestContext,
        _route: Option<&RouteMatch>,
        _res: &mut DispatchResponse,
        _latency: Duration,
    ) {
    }
}
