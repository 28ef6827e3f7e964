use crate::dispatcher::DispatchResponse;
use dashmap::DashMap;
use may_minihttp::Response;
use once_cell::sync::Lazy;
use tracing::warn;

/// Distinct header lines kept for the life of the process.
const MAX_INTERNED_HEADERS: usize = 4096;

/// `may_minihttp` only accepts `&'static str` header lines; each distinct line is
/// leaked once and reused afterwards.
static HEADER_LINES: Lazy<DashMap<String, &'static str>> = Lazy::new(DashMap::new);

fn status_reason(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}

fn static_header_line(name: &str, value: &str) -> Option<&'static str> {
    match name.to_ascii_lowercase().as_str() {
        "content-type" => match value {
            crate::dispatcher::CONTENT_TYPE_HTML => {
                return Some("Content-Type: text/html; charset=UTF-8")
            }
            crate::dispatcher::CONTENT_TYPE_JSON => return Some("Content-Type: application/json"),
            _ => {}
        },
        // Computed by the server library from the body.
        "content-length" | "date" | "server" => return None,
        _ => {}
    }

    let line = format!("{name}: {value}");
    if let Some(existing) = HEADER_LINES.get(&line) {
        return Some(*existing);
    }
    if HEADER_LINES.len() >= MAX_INTERNED_HEADERS {
        warn!(header = %name, "Header intern table full, header dropped");
        return None;
    }
    let leaked: &'static str = Box::leak(line.clone().into_boxed_str());
    Some(*HEADER_LINES.entry(line).or_insert(leaked))
}

/// Write a dispatch result onto the wire response.
pub fn write_dispatch_response(res: &mut Response, resp: DispatchResponse) {
    res.status_code(usize::from(resp.status), status_reason(resp.status));
    for (name, value) in &resp.headers {
        if value.contains(['\r', '\n']) {
            warn!(header = %name, "Header value with line break dropped");
            continue;
        }
        if let Some(line) = static_header_line(name, value) {
            res.header(line);
        }
    }
    res.body_vec(resp.body);
}
