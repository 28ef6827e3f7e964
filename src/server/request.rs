use crate::context::RequestContext;
use crate::ids::RequestId;
use may_minihttp::Request;
use std::collections::HashMap;
use std::io::Read;
use tracing::{debug, info, warn};

/// Parse the `Cookie` header into name/value pairs.
pub fn parse_cookies(header: Option<&str>) -> HashMap<String, String> {
    header
        .map(|c| {
            c.split(';')
                .filter_map(|pair| {
                    let mut parts = pair.trim().splitn(2, '=');
                    let name = parts.next()?.trim();
                    if name.is_empty() {
                        return None;
                    }
                    let value = parts.next().unwrap_or("").trim();
                    Some((name.to_string(), value.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Parse query string parameters from a request target
///
/// Extracts everything after the `?` character and URL-decodes names and values.
pub fn parse_query_params(target: &str) -> HashMap<String, String> {
    match target.split_once('?') {
        Some((_, query)) => url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect(),
        None => HashMap::new(),
    }
}

/// Assemble a [`RequestContext`] from raw request parts.
///
/// Header names are lower-cased. An incoming `x-request-id` is reused when it is a
/// valid ULID so that ids correlate across services.
pub fn build_request_context(
    method: &str,
    target: &str,
    minor_version: u8,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
) -> RequestContext {
    let headers: Vec<(String, String)> = headers
        .into_iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v))
        .collect();
    let header = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    };

    let request_id = RequestId::from_header_or_new(header("x-request-id"));
    let cookies = parse_cookies(header("cookie"));
    debug!(
        cookie_count = cookies.len(),
        header_count = headers.len(),
        "Headers extracted"
    );
    let query = parse_query_params(target);
    let path = target.split('?').next().unwrap_or("/");
    let path = if path.is_empty() { "/" } else { path };

    RequestContext {
        request_id,
        method: method.to_ascii_uppercase(),
        path: path.to_string(),
        uri: target.to_string(),
        protocol: format!("HTTP/1.{minor_version}"),
        remote_addr: None,
        headers,
        query,
        cookies,
        body,
    }
}

/// Decode a `may_minihttp` request.
pub fn parse_request(req: Request) -> RequestContext {
    let method = req.method().to_string();
    let target = req.path().to_string();
    let version = req.version();
    let headers: Vec<(String, String)> = req
        .headers()
        .iter()
        .map(|h| {
            (
                h.name.to_ascii_lowercase(),
                String::from_utf8_lossy(h.value).to_string(),
            )
        })
        .collect();

    let mut body = Vec::new();
    if let Err(e) = req.body().read_to_end(&mut body) {
        warn!(method = %method, target = %target, error = %e, "Request body read failed");
    }

    let ctx = build_request_context(&method, &target, version, headers, body);
    info!(
        request_id = %ctx.request_id,
        method = %ctx.method,
        path = %ctx.path,
        http_version = %ctx.protocol,
        headers_count = ctx.headers.len(),
        body_size_bytes = ctx.body.len(),
        "HTTP request parsed"
    );
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cookies() {
        let cookies = parse_cookies(Some("a=b; c=d; =skip; flag"));
        assert_eq!(cookies.get("a").map(String::as_str), Some("b"));
        assert_eq!(cookies.get("c").map(String::as_str), Some("d"));
        assert_eq!(cookies.get("flag").map(String::as_str), Some(""));
        assert_eq!(cookies.len(), 3);
        assert!(parse_cookies(None).is_empty());
    }

    #[test]
    fn test_parse_query_params() {
        let q = parse_query_params("/p?x=1&y=hello%20world");
        assert_eq!(q.get("x").map(String::as_str), Some("1"));
        assert_eq!(q.get("y").map(String::as_str), Some("hello world"));
        assert!(parse_query_params("/p").is_empty());
    }

    #[test]
    fn test_build_request_context() {
        let id = RequestId::new();
        let ctx = build_request_context(
            "get",
            "/quiz/intro?tab=2",
            1,
            vec![
                ("Cookie".to_string(), "sid=1".to_string()),
                ("X-Request-Id".to_string(), id.to_string()),
            ],
            Vec::new(),
        );
        assert_eq!(ctx.method, "GET");
        assert_eq!(ctx.path, "/quiz/intro");
        assert_eq!(ctx.uri, "/quiz/intro?tab=2");
        assert_eq!(ctx.protocol, "HTTP/1.1");
        assert_eq!(ctx.request_id, id);
        assert_eq!(ctx.cookie("sid"), Some("1"));
        assert_eq!(ctx.query_param("tab"), Some("2"));
        assert_eq!(ctx.header("cookie"), Some("sid=1"));
    }
}
