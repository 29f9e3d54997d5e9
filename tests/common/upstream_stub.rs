use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// What the stub answers on `/v1/chat/completions`.
#[derive(Clone)]
pub enum UpstreamScript {
    /// 200 `text/event-stream`, writing each chunk separately with `gap` between them.
    Stream { chunks: Vec<String>, gap: Duration },
    /// Fixed status and body.
    Fixed {
        status: StatusCode,
        content_type: &'static str,
        body: String,
    },
}

impl UpstreamScript {
    pub fn stream<S: Into<String>>(chunks: impl IntoIterator<Item = S>) -> Self {
        Self::stream_with_gap(chunks, Duration::from_millis(20))
    }

    pub fn stream_with_gap<S: Into<String>>(
        chunks: impl IntoIterator<Item = S>,
        gap: Duration,
    ) -> Self {
        UpstreamScript::Stream {
            chunks: chunks.into_iter().map(Into::into).collect(),
            gap,
        }
    }

    pub fn json(body: serde_json::Value) -> Self {
        UpstreamScript::Fixed {
            status: StatusCode::OK,
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    pub fn status(status: StatusCode, body: &str) -> Self {
        UpstreamScript::Fixed {
            status,
            content_type: "text/plain",
            body: body.to_string(),
        }
    }
}

/// A request as seen by the stub.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("recorded body is JSON")
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }
}

#[derive(Clone)]
struct StubState {
    script: UpstreamScript,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    chunks_sent: Arc<AtomicUsize>,
}

/// Chat Completions upstream double bound to an ephemeral port.
///
/// Every other path echoes the request back as JSON with status 200, except
/// `/teapot` which answers 418, and sets `x-upstream: stub`.
pub struct UpstreamStub {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    chunks_sent: Arc<AtomicUsize>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl UpstreamStub {
    pub async fn start(script: UpstreamScript) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let chunks_sent = Arc::new(AtomicUsize::new(0));
        let state = StubState {
            script,
            requests: requests.clone(),
            chunks_sent: chunks_sent.clone(),
        };

        let router = Router::new()
            .route("/v1/chat/completions", post(completions_handler))
            .fallback(echo_handler)
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind upstream stub");
        let addr = listener.local_addr().expect("upstream stub local addr");
        let (tx, rx) = oneshot::channel::<()>();

        let server = axum::serve(listener, router.into_make_service());
        tokio::spawn(async move {
            tokio::select! {
                res = server => {
                    if let Err(err) = res {
                        eprintln!("Upstream stub server error: {err:?}");
                    }
                }
                _ = rx => {}
            }
        });

        UpstreamStub {
            base_url: format!("http://{}", addr),
            requests,
            chunks_sent,
            shutdown: Some(tx),
        }
    }

    pub fn url(&self) -> String {
        self.base_url.clone()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("lock stub requests").clone()
    }

    /// Streamed chunks the stub's body has been polled for so far.
    pub fn chunks_sent(&self) -> usize {
        self.chunks_sent.load(Ordering::SeqCst)
    }
}

impl Drop for UpstreamStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn record(state: &StubState, req: Request) -> RecordedRequest {
    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    let recorded = RecordedRequest {
        method: parts.method.to_string(),
        path_and_query: parts
            .uri
            .path_and_query()
            .map(|pq| pq.to_string())
            .unwrap_or_default(),
        headers: parts.headers,
        body,
    };
    state
        .requests
        .lock()
        .expect("lock stub requests")
        .push(recorded.clone());
    recorded
}

async fn completions_handler(State(state): State<StubState>, req: Request) -> Response {
    record(&state, req).await;
    match state.script.clone() {
        UpstreamScript::Stream { chunks, gap } => {
            let sent = state.chunks_sent.clone();
            let body = futures_util::stream::iter(chunks).then(move |c| {
                let sent = sent.clone();
                async move {
                    tokio::time::sleep(gap).await;
                    sent.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(Bytes::from(c))
                }
            });
            Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "text/event-stream")
                .body(Body::from_stream(body))
                .expect("stream response")
        }
        UpstreamScript::Fixed {
            status,
            content_type,
            body,
        } => (status, [("content-type", content_type)], body).into_response(),
    }
}

async fn echo_handler(State(state): State<StubState>, req: Request) -> Response {
    let recorded = record(&state, req).await;
    let status = if recorded.path_and_query.starts_with("/teapot") {
        StatusCode::IM_A_TEAPOT
    } else {
        StatusCode::OK
    };
    let body = serde_json::json!({
        "method": recorded.method,
        "path": recorded.path_and_query,
        "authorization": recorded.header("authorization"),
        "client_header": recorded.header("x-client-header"),
        "body": String::from_utf8_lossy(&recorded.body),
    });
    (
        status,
        [("content-type", "application/json"), ("x-upstream", "stub")],
        body.to_string(),
    )
        .into_response()
}
