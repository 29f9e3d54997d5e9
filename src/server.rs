use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use http::{header, HeaderMap, HeaderValue, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::conversion::{chat_json_to_response, to_chat_request};
use crate::error::{truncate_chars, AdapterError, MAX_ERROR_EXCERPT};
use crate::forward::passthrough;
use crate::identity::ResponseIdentity;
use crate::models::chat::ChatCompletionRequest;
use crate::stream::responses_sse_response;
use crate::util::{cors_layer_from_env, error_response, AppState};

/// Largest inbound `/v1/responses` body accepted.
pub const MAX_REQUEST_BODY: usize = 8 * 1024 * 1024;

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Build the Axum router: `/v1/responses` is translated, everything else is forwarded.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(status).fallback(passthrough))
        .route("/v1/responses", post(responses).fallback(passthrough))
        .route("/v1/models", any(passthrough))
        .route("/v1/embeddings", any(passthrough))
        .fallback(passthrough)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer_from_env())
                .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY)),
        )
}

/// Service status endpoint exposing the upstream and available routes.
async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let routes = vec!["/status", "/v1/responses", "/v1/models", "/v1/embeddings", "/*"];
    Json(serde_json::json!({
        "name": "responses-adapter",
        "version": env!("CARGO_PKG_VERSION"),
        "upstream": state.config.upstream_base_url,
        "routes": routes
    }))
}

/// Serve a Responses API request through the Chat Completions upstream.
/// - Streaming (default): Responses SSE translated from upstream deltas
/// - Non-streaming: one JSON roundtrip
async fn responses(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, &format!("invalid JSON body: {e}"))
            }
        }
    };

    let request = to_chat_request(&body);
    let identity = match ResponseIdentity::generate() {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, "refusing request without identifiers");
            return e.into_response();
        }
    };

    tracing::info!(
        response_id = %identity.response_id,
        model = %request.model,
        stream = request.stream,
        messages = request.messages.len(),
        "responses request"
    );

    let auth = state.upstream_auth(&headers);
    if request.stream {
        responses_sse_response(state, request, identity, auth)
    } else {
        complete_once(&state, &request, &identity, auth.as_ref())
            .await
            .unwrap_or_else(|e| e.into_response())
    }
}

/// Non-streaming roundtrip.
///
/// Upstream error statuses are relayed with their body; a success body that
/// is not JSON becomes a 502.
async fn complete_once(
    state: &AppState,
    request: &ChatCompletionRequest,
    identity: &ResponseIdentity,
    auth: Option<&HeaderValue>,
) -> Result<Response, AdapterError> {
    let resp = state
        .upstream_post(CHAT_COMPLETIONS_PATH, auth)
        .json(request)
        .send()
        .await
        .map_err(AdapterError::UpstreamConnect)?;

    let status = resp.status();
    let content_type = resp.headers().get(header::CONTENT_TYPE).cloned();
    let bytes = resp.bytes().await.map_err(AdapterError::UpstreamRead)?;

    if !status.is_success() {
        tracing::warn!(
            response_id = %identity.response_id,
            %status,
            "upstream rejected completion; relaying error"
        );
        let mut out = (status, bytes).into_response();
        if let Some(ct) = content_type {
            out.headers_mut().insert(header::CONTENT_TYPE, ct);
        }
        return Ok(out);
    }

    let completion: Value = serde_json::from_slice(&bytes).map_err(|_| {
        AdapterError::InvalidUpstreamJson {
            excerpt: truncate_chars(&String::from_utf8_lossy(&bytes), MAX_ERROR_EXCERPT),
        }
    })?;

    let out = chat_json_to_response(&completion, identity, &request.model);
    Ok(Json(out).into_response())
}
