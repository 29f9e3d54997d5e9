use axum::response::{IntoResponse, Response};
use http::{header, HeaderMap, HeaderValue, StatusCode};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AdapterConfig;
use crate::forward::upstream_authorization;

/// Initialize dotenv and structured tracing based on RUST_LOG.
/// - Supports explicit env file paths via ENV_FILE, DOTENV_PATH
/// - Falls back to default .env discovery
/// - Logs the source used
pub fn init_tracing() {
    let mut env_source: String = "none".into();
    for key in ["ENV_FILE", "DOTENV_PATH"] {
        if let Ok(p) = std::env::var(key) {
            let p = p.trim();
            if !p.is_empty()
                && std::path::Path::new(p).is_file()
                && dotenvy::from_filename(p).is_ok()
            {
                env_source = format!("{p} ({key})");
                break;
            }
        }
    }

    if env_source == "none" {
        if let Ok(path) = dotenvy::dotenv() {
            env_source = path.display().to_string();
        }
    }

    // Initialize tracing (respects RUST_LOG potentially provided by the env file)
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=info".into());
    let subscriber = fmt().with_env_filter(EnvFilter::new(filter)).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    tracing::info!("Environment loaded from: {}", env_source);
}

/// Shared application state used by the HTTP server and handlers.
pub struct AppState {
    pub http: reqwest::Client,
    pub config: AdapterConfig,
}

impl AppState {
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            http: build_http_client(&config),
            config,
        }
    }

    /// Upstream bearer credential, if one is configured.
    pub fn api_key(&self) -> Option<&str> {
        self.config
            .upstream_api_key
            .as_deref()
            .filter(|k| !k.is_empty())
    }

    /// `Authorization` for an upstream call made on behalf of a client request:
    /// the configured credential (managed mode), otherwise the client's own
    /// header (passthrough mode).
    pub fn upstream_auth(&self, client: &HeaderMap) -> Option<HeaderValue> {
        upstream_authorization(client, self.api_key())
    }

    /// POST a JSON body to `path` on the upstream with the resolved `auth`.
    pub fn upstream_post(&self, path: &str, auth: Option<&HeaderValue>) -> reqwest::RequestBuilder {
        let mut rb = self
            .http
            .post(self.config.upstream_url(path))
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(v) = auth {
            rb = rb.header(header::AUTHORIZATION, v.clone());
        }
        rb
    }
}

/// Build an HTTP client honoring the proxy and timeout settings of `config`.
///
/// Without an explicit proxy, reqwest's own HTTP_PROXY / HTTPS_PROXY handling applies.
pub fn build_http_client(config: &AdapterConfig) -> reqwest::Client {
    let mut builder = reqwest::Client::builder();

    if let Some(t) = config.http_timeout {
        builder = builder.timeout(t);
    }

    if config.no_proxy {
        builder = builder.no_proxy();
    } else if let Some(url) = config.proxy_url.as_deref() {
        match reqwest::Proxy::all(url) {
            Ok(p) => builder = builder.proxy(p),
            Err(e) => tracing::warn!(proxy = %url, error = %e, "ignoring invalid proxy URL"),
        }
    }

    // User-Agent for observability
    builder = builder.user_agent(format!("responses-adapter/{}", env!("CARGO_PKG_VERSION")));

    builder.build().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "falling back to default HTTP client");
        reqwest::Client::new()
    })
}

/// Build a JSON error response with the given HTTP status and message.
pub fn error_response(status: StatusCode, msg: &str) -> Response {
    let body = serde_json::json!({ "error": { "message": msg } });
    (status, axum::Json(body)).into_response()
}

/// Build a CORS layer from environment variables.
///
/// Environment variables:
/// - CORS_ALLOWED_ORIGINS: "*" or comma-separated origins (e.g., "https://a.com, https://b.com")
/// - CORS_ALLOWED_METHODS: "*" or comma-separated methods (e.g., "GET,POST,OPTIONS")
/// - CORS_ALLOWED_HEADERS: "*" or comma-separated request header names
/// - CORS_MAX_AGE: max age in seconds (u64)
///
/// Defaults are permissive (Any) when not configured.
pub fn cors_layer_from_env() -> tower_http::cors::CorsLayer {
    use std::time::Duration;
    use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};

    let list = |key: &str| -> Option<Vec<String>> {
        let raw = std::env::var(key).ok()?;
        let s = raw.trim();
        if s == "*" {
            return None;
        }
        let vals: Vec<String> = s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        (!vals.is_empty()).then_some(vals)
    };

    let mut layer = CorsLayer::new();

    let origins: Vec<http::HeaderValue> = list("CORS_ALLOWED_ORIGINS")
        .unwrap_or_default()
        .iter()
        .filter_map(|p| http::HeaderValue::from_str(p).ok())
        .collect();
    layer = if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    };

    let methods: Vec<http::Method> = list("CORS_ALLOWED_METHODS")
        .unwrap_or_default()
        .iter()
        .filter_map(|p| http::Method::from_bytes(p.to_ascii_uppercase().as_bytes()).ok())
        .collect();
    layer = if methods.is_empty() {
        layer.allow_methods(Any)
    } else {
        layer.allow_methods(AllowMethods::list(methods))
    };

    let headers: Vec<http::header::HeaderName> = list("CORS_ALLOWED_HEADERS")
        .unwrap_or_default()
        .iter()
        .filter_map(|p| http::header::HeaderName::try_from(p.as_str()).ok())
        .collect();
    layer = if headers.is_empty() {
        layer.allow_headers(Any)
    } else {
        layer.allow_headers(AllowHeaders::list(headers))
    };

    if let Ok(secs) = std::env::var("CORS_MAX_AGE") {
        if let Ok(n) = secs.trim().parse::<u64>() {
            layer = layer.max_age(Duration::from_secs(n));
        }
    }

    layer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_ignores_empty_credential() {
        let state = AppState::new(AdapterConfig::new("http://127.0.0.1:9").with_api_key(""));
        assert_eq!(state.api_key(), None);
        let state = AppState::new(AdapterConfig::new("http://127.0.0.1:9").with_api_key("sk-x"));
        assert_eq!(state.api_key(), Some("sk-x"));
    }

    #[test]
    fn upstream_auth_prefers_configured_key() {
        let mut client = HeaderMap::new();
        client.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer client"));

        let managed = AppState::new(AdapterConfig::new("http://127.0.0.1:9").with_api_key("sk-x"));
        assert_eq!(managed.upstream_auth(&client).unwrap(), "Bearer sk-x");

        let passthrough = AppState::new(AdapterConfig::new("http://127.0.0.1:9"));
        assert_eq!(passthrough.upstream_auth(&client).unwrap(), "Bearer client");
        assert!(passthrough.upstream_auth(&HeaderMap::new()).is_none());
    }

    #[tokio::test]
    async fn error_response_is_json() {
        let resp = error_response(StatusCode::BAD_GATEWAY, "nope");
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["error"]["message"], "nope");
    }
}
