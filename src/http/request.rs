//! Request handling and transformation.
//!
//! # Responsibilities
//! - Capture per-request log context (request ID, method, path, peer)
//! - Rewrite the request onto the selected backend's endpoint
//! - Drop hop-by-hop headers and append `X-Forwarded-For`

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{
        header::{HeaderMap, HeaderName, HeaderValue, CONNECTION},
        request::Parts,
        Method, Request, Uri, Version,
    },
};

use crate::load_balancer::backend::Backend;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Headers meaningful only for a single transport hop.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// What gets logged about a request from arrival to completion.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    pub path: String,
    pub version: Version,
    pub remote: Option<SocketAddr>,
}

impl RequestContext {
    pub fn from_request(request: &Request<Body>) -> Self {
        Self {
            request_id: request
                .headers()
                .get(X_REQUEST_ID)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string(),
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            version: request.version(),
            remote: request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
        }
    }

    /// Peer address for logs, empty when unknown.
    pub fn remote_display(&self) -> String {
        self.remote.map(|a| a.to_string()).unwrap_or_default()
    }
}

/// Join a backend base path and a request path with exactly one slash between them.
pub fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

/// Target URI on `backend` for an incoming request URI. The query is kept verbatim.
pub fn upstream_uri(backend: &Backend, uri: &Uri) -> Result<Uri, axum::http::Error> {
    let path = join_paths(backend.base_path(), uri.path());
    let path_and_query = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path,
    };

    Uri::builder()
        .scheme(backend.url.scheme())
        .authority(backend.authority())
        .path_and_query(path_and_query)
        .build()
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, client: SocketAddr) {
    let ip = client.ip().to_string();
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) if !prior.is_empty() => format!("{prior}, {ip}"),
        _ => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

/// Build the request sent to `backend` from the incoming request parts.
pub fn upstream_request(
    mut parts: Parts,
    body: Body,
    backend: &Backend,
    client: Option<SocketAddr>,
) -> Result<Request<Body>, axum::http::Error> {
    parts.uri = upstream_uri(backend, &parts.uri)?;
    parts.version = Version::HTTP_11;
    strip_hop_by_hop(&mut parts.headers);
    if let Some(client) = client {
        append_forwarded_for(&mut parts.headers, client);
    }
    Ok(Request::from_parts(parts, body))
}
