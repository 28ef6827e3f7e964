use serde_json::Value;
use smallvec::SmallVec;
use std::sync::{Arc, Mutex, PoisonError};

/// Maximum inline response headers before heap allocation
pub const MAX_INLINE_HEADERS: usize = 16;

/// Header storage for responses.
///
/// Names use `Arc<str>` because most of them are repeated across responses; values are
/// per-request data.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

pub const CONTENT_TYPE_HTML: &str = "text/html; charset=UTF-8";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Body of a fixed 404.
pub const NOT_FOUND_BODY: &str = "<h1>404 Not Found</h1>";

/// What a handler produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Textual body served as `text/html; charset=UTF-8`
    Html(String),
    /// Record or sequence served as `application/json`
    Json(Value),
}

impl Reply {
    #[must_use]
    pub fn html(body: impl Into<String>) -> Self {
        Reply::Html(body.into())
    }

    #[must_use]
    pub fn json(value: Value) -> Self {
        Reply::Json(value)
    }

    #[must_use]
    pub fn content_type(&self) -> &'static str {
        match self {
            Reply::Html(_) => CONTENT_TYPE_HTML,
            Reply::Json(_) => CONTENT_TYPE_JSON,
        }
    }

    #[must_use]
    pub fn into_body(self) -> Vec<u8> {
        match self {
            Reply::Html(s) => s.into_bytes(),
            Reply::Json(v) => serde_json::to_vec(&v).unwrap_or_default(),
        }
    }
}

/// Objects and arrays become JSON; everything else is rendered as text.
impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(_) | Value::Array(_) => Reply::Json(value),
            Value::String(s) => Reply::Html(s),
            Value::Null => Reply::Html(String::new()),
            other => Reply::Html(other.to_string()),
        }
    }
}

impl From<String> for Reply {
    fn from(value: String) -> Self {
        Reply::Html(value)
    }
}

impl From<&str> for Reply {
    fn from(value: &str) -> Self {
        Reply::Html(value.to_string())
    }
}

#[derive(Debug, Default)]
struct SinkState {
    status: Option<u16>,
    headers: HeaderVec,
}

/// Status and header setter shared between the dispatcher and a handler.
///
/// Cloning yields another handle to the same state. Nothing here touches the wire; the
/// dispatcher folds the state into the final [`DispatchResponse`].
#[derive(Debug, Clone, Default)]
pub struct ResponseSink {
    inner: Arc<Mutex<SinkState>>,
}

impl ResponseSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, status: u16) {
        self.lock().status = Some(status);
    }

    /// Explicitly set status, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.lock().status
    }

    /// Set a header, replacing an existing one with the same name (ASCII case-insensitive).
    pub fn set_header(&self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let mut state = self.lock();
        if let Some(slot) = state
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            slot.1 = value;
        } else {
            state.headers.push((Arc::from(name), value));
        }
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        self.lock()
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    #[must_use]
    pub fn headers(&self) -> HeaderVec {
        self.lock().headers.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SinkState> {
        // A handler that panicked mid-update leaves plain data behind; keep using it.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Final response handed back to the server glue.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResponse {
    pub status: u16,
    pub headers: HeaderVec,
    pub body: Vec<u8>,
}

impl DispatchResponse {
    #[must_use]
    pub fn new(status: u16, content_type: &str, body: Vec<u8>) -> Self {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("Content-Type"), content_type.to_string()));
        Self {
            status,
            headers,
            body,
        }
    }

    /// Response for a handler reply, with the sink's status and headers applied on top.
    #[must_use]
    pub fn from_reply(reply: Reply, sink: &ResponseSink) -> Self {
        let mut resp = Self::new(200, reply.content_type(), reply.into_body());
        resp.apply_sink(sink);
        resp
    }

    #[must_use]
    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(
            status,
            CONTENT_TYPE_JSON,
            serde_json::to_vec(body).unwrap_or_default(),
        )
    }

    /// JSON `{"error": message}` body.
    #[must_use]
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, &serde_json::json!({ "error": message }))
    }

    #[must_use]
    pub fn not_found() -> Self {
        Self::new(404, CONTENT_TYPE_HTML, NOT_FOUND_BODY.as_bytes().to_vec())
    }

    /// Overwrite status (when set) and headers with what the handler put in the sink.
    pub fn apply_sink(&mut self, sink: &ResponseSink) {
        if let Some(status) = sink.status() {
            self.status = status;
        }
        for (name, value) in sink.headers() {
            self.set_header(&name, value);
        }
    }

    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_header(&mut self, name: &str, value: String) {
        if let Some(slot) = self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            slot.1 = value;
        } else {
            self.headers.push((Arc::from(name), value));
        }
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.get_header("content-type")
    }
}
