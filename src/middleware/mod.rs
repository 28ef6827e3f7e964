mod access_log;
mod core;
mod tracing;

pub use access_log::{combined_log_line, AccessLogMiddleware};
pub use core::Middleware;
pub use tracing::TracingMiddleware;
