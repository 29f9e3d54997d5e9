use axum::response::{IntoResponse, Response};
use http::StatusCode;
use thiserror::Error;

use crate::util::error_response;

/// Longest upstream body excerpt embedded in an error message.
pub const MAX_ERROR_EXCERPT: usize = 300;

/// Errors raised while loading `AdapterConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("upstream base URL not set (UPSTREAM_BASE_URL or LITELLM_URL)")]
    MissingUpstreamUrl,
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

/// Failures at the upstream boundary or while preparing a response.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The randomness source was unavailable; no identifier may be issued.
    #[error("identifier generation failed: {0}")]
    Identity(String),
    #[error("upstream request failed: {0}")]
    UpstreamConnect(#[source] reqwest::Error),
    #[error("Upstream {status}: {excerpt}")]
    UpstreamStatus { status: StatusCode, excerpt: String },
    #[error("upstream read error: {0}")]
    UpstreamRead(#[source] reqwest::Error),
    #[error("upstream returned invalid JSON: {excerpt}")]
    InvalidUpstreamJson { excerpt: String },
    #[error("upstream stream ended before [DONE]")]
    UnterminatedStream,
}

impl AdapterError {
    fn status_code(&self) -> StatusCode {
        match self {
            AdapterError::Identity(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AdapterError {
    fn into_response(self) -> Response {
        error_response(self.status_code(), &self.to_string())
    }
}

/// First `max` characters of `text`, respecting char boundaries.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
