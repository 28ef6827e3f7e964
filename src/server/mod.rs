//! HTTP glue between `may_minihttp` and the dispatcher.

pub mod http_server;
pub mod request;
pub mod response;
pub mod service;

pub use http_server::{HttpServer, ServerHandle};
pub use request::{build_request_context, parse_cookies, parse_query_params, parse_request};
pub use response::write_dispatch_response;
pub use service::AppService;
