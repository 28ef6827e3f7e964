//! The decoded request and the well-known context keys derived from it.

use super::store::{ContextError, Unit};
use crate::ids::RequestId;
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Whole decoded request
pub const KEY_REQUEST: &str = "request";
/// Query parameters
pub const KEY_GET: &str = "get";
/// Form fields from a urlencoded (or JSON object) body
pub const KEY_POST: &str = "post";
pub const KEY_COOKIE: &str = "cookie";
/// CGI-style server metadata (`REQUEST_METHOD`, `HTTP_*`, ...)
pub const KEY_SERVER: &str = "server";
/// Per-request bookkeeping (`UNIQUE_REQUEST_ID`, `__start_time`)
pub const KEY_SESSION: &str = "session";

/// A request as the dispatch core sees it.
///
/// Header names are lower-cased by the server glue. The body travels base64-encoded
/// when serialized so that a request can be shipped to an isolated worker as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub method: String,
    /// Path without the query string
    pub path: String,
    /// Raw request target, query string included
    pub uri: String,
    pub protocol: String,
    #[serde(default)]
    pub remote_addr: Option<String>,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub query: HashMap<String, String>,
    #[serde(default)]
    pub cookies: HashMap<String, String>,
    #[serde(default, with = "body_base64")]
    pub body: Vec<u8>,
}

impl RequestContext {
    /// Build a request from a method and a raw target; the query string is decoded.
    #[must_use]
    pub fn new(method: &str, uri: &str) -> Self {
        let (path, query_string) = match uri.split_once('?') {
            Some((p, q)) => (p, q),
            None => (uri, ""),
        };
        let query = url::form_urlencoded::parse(query_string.as_bytes())
            .into_owned()
            .collect();
        Self {
            request_id: RequestId::new(),
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            uri: uri.to_string(),
            protocol: "HTTP/1.1".to_string(),
            remote_addr: None,
            headers: Vec::new(),
            query,
            cookies: HashMap::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    #[must_use]
    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// `None` when the method is not a valid HTTP token.
    #[must_use]
    pub fn http_method(&self) -> Option<Method> {
        Method::from_bytes(self.method.as_bytes()).ok()
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn query_string(&self) -> &str {
        self.uri.split_once('?').map_or("", |(_, q)| q)
    }

    /// Form fields: urlencoded bodies are decoded, a JSON object body is taken as is.
    #[must_use]
    pub fn form(&self) -> Map<String, Value> {
        let content_type = self.header("content-type").unwrap_or_default();
        if content_type.starts_with("application/x-www-form-urlencoded") {
            return url::form_urlencoded::parse(&self.body)
                .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                .collect();
        }
        if content_type.starts_with("application/json") {
            if let Ok(Value::Object(map)) = serde_json::from_slice(&self.body) {
                return map;
            }
        }
        Map::new()
    }

    /// CGI-style metadata: request line, client address, and one `HTTP_*` entry per header.
    #[must_use]
    pub fn server_vars(&self) -> Map<String, Value> {
        let mut vars = Map::new();
        vars.insert("REQUEST_METHOD".into(), json!(self.method));
        vars.insert("REQUEST_URI".into(), json!(self.uri));
        vars.insert("PATH_INFO".into(), json!(self.path));
        vars.insert("QUERY_STRING".into(), json!(self.query_string()));
        vars.insert("SERVER_PROTOCOL".into(), json!(self.protocol));
        if let Some(addr) = &self.remote_addr {
            vars.insert("REMOTE_ADDR".into(), json!(addr));
        }
        for (name, value) in &self.headers {
            let key = format!("HTTP_{}", name.to_ascii_uppercase().replace('-', "_"));
            vars.insert(key, json!(value));
        }
        vars
    }
}

/// Write the well-known request keys into a request's unit.
pub fn populate(unit: &Unit, request: &RequestContext) -> Result<(), ContextError> {
    unit.set_as(KEY_REQUEST, request)?;
    unit.set(KEY_GET, json!(request.query));
    unit.set(KEY_POST, Value::Object(request.form()));
    unit.set(KEY_COOKIE, json!(request.cookies));
    unit.set(KEY_SERVER, Value::Object(request.server_vars()));

    let start_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    unit.set(
        KEY_SESSION,
        json!({
            "UNIQUE_REQUEST_ID": request.request_id.to_string(),
            "__start_time": start_time,
        }),
    );
    Ok(())
}

/// Typed views of the well-known keys.
impl Unit {
    pub fn request(&self) -> Result<RequestContext, ContextError> {
        self.get_as(KEY_REQUEST)
    }

    pub fn query(&self) -> Result<HashMap<String, String>, ContextError> {
        self.get_as(KEY_GET)
    }

    pub fn form(&self) -> Result<Map<String, Value>, ContextError> {
        self.get_as(KEY_POST)
    }

    pub fn cookies(&self) -> Result<HashMap<String, String>, ContextError> {
        self.get_as(KEY_COOKIE)
    }

    pub fn server(&self) -> Result<Map<String, Value>, ContextError> {
        self.get_as(KEY_SERVER)
    }

    pub fn session(&self) -> Result<Map<String, Value>, ContextError> {
        self.get_as(KEY_SESSION)
    }
}

mod body_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
