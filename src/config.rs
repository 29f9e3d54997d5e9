use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_PORT: u16 = 4011;

/// Process configuration, read once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Origin of the Chat Completions gateway, without trailing slash.
    /// Request paths such as `/v1/chat/completions` are appended verbatim.
    pub upstream_base_url: String,
    /// Credential injected as `Authorization: Bearer ...` on every upstream call.
    pub upstream_api_key: Option<String>,
    pub bind_addr: String,
    /// Overall upstream request timeout. `None` leaves streams unbounded.
    pub http_timeout: Option<Duration>,
    pub no_proxy: bool,
    pub proxy_url: Option<String>,
}

impl AdapterConfig {
    /// Minimal configuration pointing at `upstream_base_url`.
    pub fn new(upstream_base_url: impl Into<String>) -> Self {
        Self {
            upstream_base_url: upstream_base_url.into().trim_end_matches('/').to_string(),
            upstream_api_key: None,
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            http_timeout: None,
            no_proxy: false,
            proxy_url: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.upstream_api_key = Some(key.into());
        self
    }

    /// Load from the process environment.
    ///
    /// Environment:
    /// - UPSTREAM_BASE_URL | LITELLM_URL      -> upstream origin (required)
    /// - UPSTREAM_API_KEY | LITELLM_KEY       -> upstream bearer credential
    /// - BIND_ADDR                            -> full listen address, wins over PORT
    /// - PORT                                 -> listen port on 0.0.0.0 (default 4011)
    /// - ADAPTER_HTTP_TIMEOUT_SECONDS         -> upstream request timeout (u64)
    /// - ADAPTER_NO_PROXY = 1|true|yes|on     -> disable outbound proxies
    /// - ADAPTER_PROXY_URL                    -> proxy for all schemes
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Load from an arbitrary key lookup (used by `from_env` and tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| lookup(k))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };

        let base = get(&["UPSTREAM_BASE_URL", "LITELLM_URL"]).ok_or(ConfigError::MissingUpstreamUrl)?;
        let mut cfg = Self::new(base);
        cfg.upstream_api_key = get(&["UPSTREAM_API_KEY", "LITELLM_KEY"]);

        if let Some(addr) = get(&["BIND_ADDR"]) {
            cfg.bind_addr = addr;
        } else if let Some(port) = get(&["PORT"]) {
            let port: u16 = port.parse().map_err(|_| ConfigError::InvalidValue {
                name: "PORT",
                value: port.clone(),
            })?;
            cfg.bind_addr = format!("0.0.0.0:{port}");
        }

        if let Some(secs) = get(&["ADAPTER_HTTP_TIMEOUT_SECONDS"]) {
            let n: u64 = secs.parse().map_err(|_| ConfigError::InvalidValue {
                name: "ADAPTER_HTTP_TIMEOUT_SECONDS",
                value: secs.clone(),
            })?;
            cfg.http_timeout = Some(Duration::from_secs(n));
        }

        cfg.no_proxy = get(&["ADAPTER_NO_PROXY"])
            .map(|v| {
                let v = v.to_ascii_lowercase();
                v == "1" || v == "true" || v == "yes" || v == "on"
            })
            .unwrap_or(false);
        cfg.proxy_url = get(&["ADAPTER_PROXY_URL"]);

        Ok(cfg)
    }

    /// Absolute upstream URL for a request path (which must start with `/`).
    pub fn upstream_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.upstream_base_url, path_and_query)
    }
}
