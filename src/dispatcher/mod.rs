//! # Dispatcher Module
//!
//! Takes a decoded request from the server glue and produces the final response.
//!
//! ## Request Flow
//!
//! 1. A fresh execution unit is created under the process root and filled with the
//!    well-known keys (`request`, `get`, `post`, `cookie`, `server`, `session`)
//! 2. The router finds the first route accepting the method and path
//! 3. Middleware `before` hooks run; any of them may answer early
//! 4. Inline routes: declared parameters are bound and the handler is called in the
//!    current coroutine. Isolated routes: the task runs in a worker process
//! 5. Middleware `after` hooks run with the final response
//!
//! ## Response Shaping
//!
//! - No route: 404, `text/html; charset=UTF-8`, `<h1>404 Not Found</h1>`
//! - [`Reply::Json`]: `application/json`
//! - [`Reply::Html`]: `text/html; charset=UTF-8`
//! - Handler error or panic: 500 with `{"error": "..."}`
//!
//! Status and headers written to the [`ResponseSink`] override the defaults.

mod core;
mod response;
#[cfg(test)]
mod tests;

pub use core::{handler, Dispatcher, Handler};
pub use response::{
    DispatchResponse, HeaderVec, Reply, ResponseSink, CONTENT_TYPE_HTML, CONTENT_TYPE_JSON,
    MAX_INLINE_HEADERS, NOT_FOUND_BODY,
};
