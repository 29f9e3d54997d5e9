//! Transparent forwarding for every route the adapter does not translate.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use futures_util::TryStreamExt;
use http::{header, HeaderMap, HeaderValue, StatusCode};
use std::sync::Arc;

use crate::error::AdapterError;
use crate::util::{error_response, AppState};

/// Largest request body buffered for forwarding.
pub const MAX_FORWARD_BODY: usize = 32 * 1024 * 1024;

/// Request headers never copied upstream. `accept-encoding` is left to the
/// HTTP client so it can decode what it negotiated.
const SKIP_REQUEST_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "accept-encoding",
];

/// Response headers recomputed by the serving layer.
const SKIP_RESPONSE_HEADERS: &[&str] = &["content-length", "transfer-encoding", "connection"];

fn copy_headers(src: &HeaderMap, skip: &[&str]) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in src.iter() {
        if skip.contains(&name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Headers to send upstream: the client's, minus hop-by-hop ones, with the
/// configured credential replacing any client `Authorization`.
pub fn upstream_request_headers(src: &HeaderMap, api_key: Option<&str>) -> HeaderMap {
    let mut out = copy_headers(src, SKIP_REQUEST_HEADERS);
    out.remove(header::AUTHORIZATION);
    if let Some(v) = upstream_authorization(src, api_key) {
        out.insert(header::AUTHORIZATION, v);
    }
    out
}

/// Upstream `Authorization`: `Bearer <api_key>` when a credential is
/// configured, otherwise the client's header as received.
pub fn upstream_authorization(client: &HeaderMap, api_key: Option<&str>) -> Option<HeaderValue> {
    match api_key {
        Some(key) => HeaderValue::from_str(&format!("Bearer {key}")).ok(),
        None => client.get(header::AUTHORIZATION).cloned(),
    }
}

/// Headers relayed back to the client.
pub fn client_response_headers(src: &HeaderMap) -> HeaderMap {
    copy_headers(src, SKIP_RESPONSE_HEADERS)
}

/// Axum handler: forward the request to the same path on the upstream.
pub async fn passthrough(State(state): State<Arc<AppState>>, req: Request) -> Response {
    forward_request(&state, req).await
}

/// Forward method, path, query, headers and body; relay status, headers and body.
pub async fn forward_request(state: &AppState, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = state.config.upstream_url(path);

    let body = match axum::body::to_bytes(body, MAX_FORWARD_BODY).await {
        Ok(b) => b,
        Err(e) => {
            return error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                &format!("request body rejected: {e}"),
            )
        }
    };

    let headers = upstream_request_headers(&parts.headers, state.api_key());
    tracing::debug!(method = %parts.method, %url, "forwarding request upstream");

    let mut rb = state
        .http
        .request(parts.method.clone(), &url)
        .headers(headers);
    if !body.is_empty() {
        rb = rb.body(body);
    }

    let resp = match rb.send().await {
        Ok(r) => r,
        Err(e) => {
            let err = AdapterError::UpstreamConnect(e);
            tracing::warn!(%url, error = %err, "passthrough upstream failed");
            return err.into_response();
        }
    };

    let status = resp.status();
    let headers = client_response_headers(resp.headers());
    let stream = resp
        .bytes_stream()
        .map_err(|e| std::io::Error::other(e.to_string()));

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
