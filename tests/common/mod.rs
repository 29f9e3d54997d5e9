#![allow(dead_code)]

pub mod upstream_stub;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http;
use responses_adapter::config::AdapterConfig;
use responses_adapter::server::build_router;
use responses_adapter::util::AppState;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// The adapter served on an ephemeral local port.
///
/// Configuration is passed explicitly, so tests never touch process environment
/// and can run in parallel.
pub struct TestServer {
    pub base_url: String,
    pub addr: SocketAddr,
    join: JoinHandle<()>,
    client: reqwest::Client,
}

impl TestServer {
    /// Create a reqwest client with sensible defaults for tests.
    fn make_client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed building reqwest client")
    }

    /// Perform a GET relative to the server base URL.
    pub async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
    }

    /// Perform a POST with JSON body.
    pub async fn post_json<T: serde::Serialize>(
        &self,
        path: &str,
        body: &T,
        auth_bearer: Option<&str>,
    ) -> reqwest::Result<reqwest::Response> {
        let mut rb = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(http::header::CONTENT_TYPE, "application/json");
        if let Some(b) = auth_bearer {
            rb = rb.bearer_auth(b);
        }
        rb.json(body).send().await
    }

    /// Low-level request with an arbitrary method and raw body.
    pub async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Vec<u8>,
        auth_bearer: Option<&str>,
    ) -> reqwest::Result<reqwest::Response> {
        let mut rb = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header("x-client-header", "kept");
        if let Some(b) = auth_bearer {
            rb = rb.bearer_auth(b);
        }
        rb.body(body).send().await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.join.abort();
    }
}

/// Spawn the adapter router for `config` on an ephemeral port.
pub async fn spawn_adapter(config: AdapterConfig) -> TestServer {
    let app = build_router(Arc::new(AppState::new(config)));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let base_url = format!("http://{}", addr);
    let server = axum::serve(listener, app.into_make_service());

    let join = tokio::spawn(async move {
        if let Err(e) = server.await {
            eprintln!("Test server error: {e:?}");
        }
    });

    TestServer {
        base_url,
        addr,
        join,
        client: TestServer::make_client(),
    }
}

/// Adapter pointed at `upstream` with an upstream credential configured.
pub async fn spawn_managed(upstream: &str) -> TestServer {
    spawn_adapter(AdapterConfig::new(upstream).with_api_key("sk-upstream-test")).await
}

/// Adapter whose upstream is unreachable (port 9 refuses connections).
pub async fn spawn_unreachable() -> TestServer {
    spawn_adapter(AdapterConfig::new("http://127.0.0.1:9")).await
}

/// One decoded outbound SSE stream.
#[derive(Debug, Default)]
pub struct SseTranscript {
    /// Event payloads in arrival order.
    pub events: Vec<serde_json::Value>,
    /// `event:` names in arrival order.
    pub names: Vec<String>,
    /// Whether `data: [DONE]` was the final frame.
    pub done_last: bool,
    /// Frames seen after `[DONE]`.
    pub trailing_frames: usize,
}

impl SseTranscript {
    pub fn parse(text: &str) -> Self {
        let mut out = SseTranscript::default();
        let mut seen_done = false;
        for frame in text.split("\n\n").filter(|f| !f.trim().is_empty()) {
            if seen_done {
                out.trailing_frames += 1;
                continue;
            }
            let mut name = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(n) = line.strip_prefix("event: ") {
                    name = Some(n.to_string());
                } else if let Some(d) = line.strip_prefix("data: ") {
                    data = Some(d.to_string());
                }
            }
            let data = data.expect("frame without data line");
            if data == "[DONE]" {
                seen_done = true;
                continue;
            }
            let v: serde_json::Value = serde_json::from_str(&data).expect("event JSON");
            out.names.push(name.expect("frame without event line"));
            out.events.push(v);
        }
        out.done_last = seen_done;
        out
    }

    pub fn types(&self) -> Vec<String> {
        self.events
            .iter()
            .map(|e| e["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn deltas(&self) -> Vec<String> {
        self.events
            .iter()
            .filter(|e| e["type"] == "response.output_text.delta")
            .map(|e| e["delta"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn terminal_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| e["type"] == "response.completed" || e["type"] == "response.error")
            .count()
    }
}

/// Chat Completions streaming chunk carrying `text`.
pub fn delta_frame(text: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({
            "id": "chatcmpl-stub",
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {"content": text}, "finish_reason": null}]
        })
    )
}

pub const DONE_FRAME: &str = "data: [DONE]\n\n";
