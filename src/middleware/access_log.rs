use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::info;

use super::Middleware;
use crate::context::RequestContext;
use crate::dispatcher::DispatchResponse;
use crate::router::RouteMatch;

/// One combined-log-format line per request, under the `zealrouter::access` target.
///
/// `127.0.0.1 - - [18/Oct/2026:10:00:00 +0000] "GET /quiz/intro HTTP/1.1" 200 512 "-" "curl/8.0"`
#[derive(Debug, Default)]
pub struct AccessLogMiddleware;

impl AccessLogMiddleware {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for AccessLogMiddleware {
    fn after(
        &self,
        req: &RequestContext,
        _route: Option<&RouteMatch>,
        res: &mut DispatchResponse,
        latency: Duration,
    ) {
        let line = combined_log_line(req, res, Local::now());
        info!(
            target: "zealrouter::access",
            latency_us = latency.as_micros() as u64,
            "{line}"
        );
    }
}

/// Format a request/response pair in the combined log format.
#[must_use]
pub fn combined_log_line<Tz>(req: &RequestContext, res: &DispatchResponse, at: DateTime<Tz>) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{} - - [{}] \"{} {} {}\" {} {} \"{}\" \"{}\"",
        req.remote_addr.as_deref().unwrap_or("-"),
        at.format("%d/%b/%Y:%H:%M:%S %z"),
        req.method,
        req.uri,
        req.protocol,
        res.status,
        res.body.len(),
        req.header("referer").unwrap_or("-"),
        req.header("user-agent").unwrap_or("-"),
    )
}
