use super::request::parse_request;
use super::response::write_dispatch_response;
use crate::dispatcher::Dispatcher;
use may_minihttp::{HttpService, Request, Response};
use std::io;
use std::sync::Arc;

/// `may_minihttp` service: decode, dispatch, write.
///
/// The server clones the service once per connection; clones share the dispatcher.
#[derive(Clone, Debug)]
pub struct AppService {
    pub dispatcher: Arc<Dispatcher>,
}

impl AppService {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl HttpService for AppService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let request = parse_request(req);
        let resp = self.dispatcher.dispatch(request);
        write_dispatch_response(res, resp);
        Ok(())
    }
}
