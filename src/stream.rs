//! Streaming translation from Chat Completions SSE to Responses SSE.
//!
//! `ResponsesStream` is a synchronous state machine fed with raw upstream bytes;
//! it owns the frame buffer and the accumulated transcript for one request.
//! `responses_sse_response` drives it from a spawned task and returns the
//! outbound SSE response.
//!
//! Event order for a successful stream:
//! ```text
//! response.created
//! response.output_item.added
//! response.content_part.added
//! response.output_text.delta        (zero or more)
//! response.output_text.done
//! response.content_part.done
//! response.output_item.done
//! response.completed
//! data: [DONE]
//! ```
//! A failure at any point after the opening events replaces the tail with a
//! single `response.error` followed by `data: [DONE]`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use futures_util::StreamExt;
use http::{header, HeaderValue, StatusCode};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{truncate_chars, AdapterError, MAX_ERROR_EXCERPT};
use crate::identity::ResponseIdentity;
use crate::models::chat::{self, ChatCompletionRequest};
use crate::models::responses::{
    ErrorDetail, OutputMessage, OutputText, ResponseObject, ResponsesEvent, SequencedEvent,
    SSE_DONE,
};
use crate::util::{error_response, AppState};

/// Only one output item with one content part is ever produced.
const OUTPUT_INDEX: u32 = 0;
const CONTENT_INDEX: u32 = 0;

/// Upper bound on the message carried by `response.error`.
pub const MAX_ERROR_MESSAGE: usize = 512;

/// Outbound events buffered between the translator task and the client.
const CHANNEL_CAPACITY: usize = 16;

// ============================================================================
// Frame splitting
// ============================================================================

/// Position and length of the first blank-line delimiter in `buf` whose
/// terminating `\n` sits at or after `from`.
fn find_delimiter(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while let Some(off) = buf.get(i..)?.iter().position(|&b| b == b'\n') {
        let nl = i + off;
        match (buf.get(nl + 1).copied(), buf.get(nl + 2).copied()) {
            (Some(b'\n'), _) => return Some((nl, 2)),
            (Some(b'\r'), Some(b'\n')) if nl > 0 && buf[nl - 1] == b'\r' => {
                return Some((nl - 1, 4))
            }
            _ => {}
        }
        i = nl + 1;
    }
    None
}

/// Upstream bytes not yet consumed as frames.
///
/// Only complete frames leave the buffer; the partial tail stays until a later
/// read completes it. Bytes already scanned without finding a delimiter are not
/// scanned again.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    bytes: Vec<u8>,
    /// Offset from which the next delimiter search resumes.
    scanned: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Drain every complete frame from the front of the buffer, decoded as
    /// lossy UTF-8 without its delimiter.
    pub fn split_frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some((pos, len)) =
            find_delimiter(&self.bytes[start..], from.saturating_sub(start))
        {
            let end = start + pos;
            frames.push(String::from_utf8_lossy(&self.bytes[start..end]).into_owned());
            start = end + len;
            from = start;
        }
        self.bytes.drain(..start);
        // A delimiter may straddle the next read: back off by its length minus one.
        self.scanned = self.bytes.len().saturating_sub(3);
        frames
    }

    /// The retained partial frame.
    pub fn pending(&self) -> &[u8] {
        &self.bytes
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.scanned = 0;
    }
}

/// One parsed upstream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// No `data:` line (comments, keep-alives, bare `event:` lines).
    Ignored,
    /// The `[DONE]` sentinel.
    Done,
    /// A data payload that is not valid JSON.
    Malformed,
    Chunk(Value),
}

/// Interpret one frame. Multiple `data:` lines are joined with `\n`.
pub fn parse_frame(raw: &str) -> Frame {
    let mut data: Option<String> = None;
    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        let Some(rest) = line.strip_prefix("data:") else {
            continue;
        };
        let rest = rest.strip_prefix(' ').unwrap_or(rest);
        match data.as_mut() {
            Some(d) => {
                d.push('\n');
                d.push_str(rest);
            }
            None => data = Some(rest.to_string()),
        }
    }

    let Some(data) = data else {
        return Frame::Ignored;
    };
    let payload = data.trim();
    if payload == "[DONE]" {
        return Frame::Done;
    }
    match serde_json::from_str::<Value>(payload) {
        Ok(v) => Frame::Chunk(v),
        Err(_) => Frame::Malformed,
    }
}

// ============================================================================
// State machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Nothing emitted yet.
    Opening,
    /// Opening events emitted; consuming upstream frames.
    Streaming,
    /// `[DONE]` seen; writing the success sequence.
    Terminating,
    /// A failure is being reported.
    Errored,
    /// A terminal sequence was emitted. Nothing more will be produced.
    Closed,
}

/// How a closed stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
}

/// Per-request translator from upstream chunks to Responses events.
#[derive(Debug)]
pub struct ResponsesStream {
    identity: ResponseIdentity,
    model: String,
    state: StreamState,
    outcome: Option<Outcome>,
    /// Concatenation of every emitted delta, in emission order.
    full_text: String,
    /// Undecoded tail of the upstream body (partial frame).
    buffer: FrameBuffer,
    usage: Option<Value>,
    next_sequence: u64,
}

impl ResponsesStream {
    pub fn new(identity: ResponseIdentity, model: impl Into<String>) -> Self {
        Self {
            identity,
            model: model.into(),
            state: StreamState::Opening,
            outcome: None,
            full_text: String::new(),
            buffer: FrameBuffer::new(),
            usage: None,
            next_sequence: 0,
        }
    }

    pub fn identity(&self) -> &ResponseIdentity {
        &self.identity
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    fn emit(&mut self, event: ResponsesEvent) -> SequencedEvent {
        let sequence_number = self.next_sequence;
        self.next_sequence += 1;
        SequencedEvent {
            sequence_number,
            event,
        }
    }

    /// The three events announcing the response, its message item and its text part.
    pub fn opening_events(&mut self) -> Vec<SequencedEvent> {
        if self.state != StreamState::Opening {
            return Vec::new();
        }
        self.state = StreamState::Streaming;
        let created = ResponsesEvent::Created {
            response: ResponseObject::in_progress(&self.identity, &self.model),
        };
        let item_added = ResponsesEvent::OutputItemAdded {
            output_index: OUTPUT_INDEX,
            item: OutputMessage::in_progress(&self.identity),
        };
        let part_added = ResponsesEvent::ContentPartAdded {
            item_id: self.identity.message_id.clone(),
            output_index: OUTPUT_INDEX,
            content_index: CONTENT_INDEX,
            part: OutputText::new(""),
        };
        vec![
            self.emit(created),
            self.emit(item_added),
            self.emit(part_added),
        ]
    }

    /// Feed raw upstream bytes; returns the events produced by every frame they complete.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<SequencedEvent> {
        let mut out = Vec::new();
        if self.state == StreamState::Opening {
            out.extend(self.opening_events());
        }
        if self.state != StreamState::Streaming {
            return out;
        }

        self.buffer.extend(bytes);
        let frames = self.buffer.split_frames();
        for raw in frames {
            match parse_frame(&raw) {
                Frame::Ignored => {}
                Frame::Malformed => {
                    tracing::debug!(
                        response_id = %self.identity.response_id,
                        frame = %truncate_chars(&raw, 200),
                        "skipping malformed upstream frame"
                    );
                }
                Frame::Done => {
                    out.extend(self.finish_success());
                    break;
                }
                Frame::Chunk(v) => {
                    if let Some(usage) = chat::usage_object(&v) {
                        self.usage = Some(usage.clone());
                    }
                    if let Some(delta) = chat::chunk_delta_text(&v).filter(|d| !d.is_empty()) {
                        let delta = delta.to_string();
                        self.full_text.push_str(&delta);
                        let ev = ResponsesEvent::OutputTextDelta {
                            item_id: self.identity.message_id.clone(),
                            output_index: OUTPUT_INDEX,
                            content_index: CONTENT_INDEX,
                            delta,
                        };
                        out.push(self.emit(ev));
                    }
                }
            }
        }
        out
    }

    /// The four-event success sequence. Runs at most once.
    fn finish_success(&mut self) -> Vec<SequencedEvent> {
        if self.state != StreamState::Streaming {
            return Vec::new();
        }
        self.state = StreamState::Terminating;
        self.buffer.clear();

        let text = self.full_text.clone();
        let item_id = self.identity.message_id.clone();
        let usage = self
            .usage
            .take()
            .unwrap_or_else(|| Value::Object(Default::default()));

        let text_done = ResponsesEvent::OutputTextDone {
            item_id: item_id.clone(),
            output_index: OUTPUT_INDEX,
            content_index: CONTENT_INDEX,
            text: text.clone(),
        };
        let part_done = ResponsesEvent::ContentPartDone {
            item_id,
            output_index: OUTPUT_INDEX,
            content_index: CONTENT_INDEX,
            part: OutputText::new(text.clone()),
        };
        let item_done = ResponsesEvent::OutputItemDone {
            output_index: OUTPUT_INDEX,
            item: OutputMessage::completed(&self.identity, &text),
        };
        let completed = ResponsesEvent::Completed {
            response: ResponseObject::completed(&self.identity, &self.model, &text, usage),
        };
        let events = vec![
            self.emit(text_done),
            self.emit(part_done),
            self.emit(item_done),
            self.emit(completed),
        ];

        self.state = StreamState::Closed;
        self.outcome = Some(Outcome::Completed);
        events
    }

    /// Report a failure with one `response.error`. No-op once closed.
    ///
    /// When called before the opening events were produced, they are emitted
    /// first so the client always sees a well-formed stream.
    pub fn fail(&mut self, message: &str) -> Vec<SequencedEvent> {
        let mut out = Vec::new();
        match self.state {
            StreamState::Opening => out.extend(self.opening_events()),
            StreamState::Streaming => {}
            _ => return out,
        }
        self.state = StreamState::Errored;
        self.buffer.clear();
        let ev = ResponsesEvent::Error {
            error: ErrorDetail {
                message: truncate_chars(message, MAX_ERROR_MESSAGE),
            },
        };
        out.push(self.emit(ev));
        self.state = StreamState::Closed;
        self.outcome = Some(Outcome::Failed);
        out
    }

    /// The upstream body ended. Without a prior `[DONE]` this is a failure,
    /// even if text was already streamed.
    pub fn finish_eof(&mut self) -> Vec<SequencedEvent> {
        if self.is_closed() {
            return Vec::new();
        }
        self.fail(&AdapterError::UnterminatedStream.to_string())
    }
}

/// Encode events as SSE, appending the `[DONE]` sentinel after a terminal event.
pub fn render_sse(events: &[SequencedEvent]) -> String {
    let mut out = String::new();
    for ev in events {
        out.push_str(&ev.to_sse());
        if ev.event.is_terminal() {
            out.push_str(SSE_DONE);
        }
    }
    out
}

// ============================================================================
// Driver
// ============================================================================

/// Client went away; the send side of the body channel is closed.
struct ClientGone;

struct EventSink {
    tx: mpsc::Sender<Bytes>,
}

impl EventSink {
    async fn send(&self, events: Vec<SequencedEvent>) -> Result<(), ClientGone> {
        if events.is_empty() {
            return Ok(());
        }
        let frame = render_sse(&events);
        self.tx
            .send(Bytes::from(frame))
            .await
            .map_err(|_| ClientGone)
    }
}

/// Start the streaming translation and return the SSE response immediately.
///
/// The opening events are written before the upstream is contacted. The body is
/// fed through a bounded channel, so a slow client delays upstream reads and a
/// closed client stops the translation.
pub fn responses_sse_response(
    state: Arc<AppState>,
    request: ChatCompletionRequest,
    identity: ResponseIdentity,
    auth: Option<HeaderValue>,
) -> Response {
    let (tx, rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
    let machine = ResponsesStream::new(identity, request.model.clone());
    tokio::spawn(translate_upstream(state, request, auth, machine, EventSink { tx }));

    let body = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|b| (Ok::<_, Infallible>(b), rx))
    });

    http::Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(body))
        .unwrap_or_else(|e| {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("response build error: {e}"))
        })
}

async fn translate_upstream(
    state: Arc<AppState>,
    request: ChatCompletionRequest,
    auth: Option<HeaderValue>,
    mut machine: ResponsesStream,
    sink: EventSink,
) {
    let response_id = machine.identity().response_id.clone();
    match run_stream(&state, &request, auth.as_ref(), &mut machine, &sink).await {
        Ok(()) => {
            tracing::info!(
                response_id = %response_id,
                outcome = ?machine.outcome(),
                chars = machine.full_text().chars().count(),
                "responses stream closed"
            );
        }
        Err(ClientGone) => {
            tracing::debug!(
                response_id = %response_id,
                "client disconnected; abandoning upstream stream"
            );
        }
    }
}

async fn run_stream(
    state: &AppState,
    request: &ChatCompletionRequest,
    auth: Option<&HeaderValue>,
    machine: &mut ResponsesStream,
    sink: &EventSink,
) -> Result<(), ClientGone> {
    sink.send(machine.opening_events()).await?;

    let sent = state
        .upstream_post("/v1/chat/completions", auth)
        .header(header::ACCEPT, "text/event-stream")
        .json(request)
        .send()
        .await;
    let resp = match sent {
        Ok(r) => r,
        Err(e) => {
            let err = AdapterError::UpstreamConnect(e);
            tracing::warn!(response_id = %machine.identity().response_id, error = %err, "upstream connect failed");
            return sink.send(machine.fail(&err.to_string())).await;
        }
    };

    let status = resp.status();
    tracing::debug!(response_id = %machine.identity().response_id, %status, "upstream stream opened");
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let err = AdapterError::UpstreamStatus {
            status,
            excerpt: truncate_chars(&text, MAX_ERROR_EXCERPT),
        };
        tracing::warn!(response_id = %machine.identity().response_id, error = %err, "upstream rejected stream");
        return sink.send(machine.fail(&err.to_string())).await;
    }

    let mut body = Box::pin(resp.bytes_stream());
    while let Some(item) = body.next().await {
        match item {
            Ok(chunk) => {
                sink.send(machine.push_bytes(&chunk)).await?;
                if machine.is_closed() {
                    return Ok(());
                }
            }
            Err(e) => {
                let err = AdapterError::UpstreamRead(e);
                tracing::warn!(response_id = %machine.identity().response_id, error = %err, "upstream read failed");
                return sink.send(machine.fail(&err.to_string())).await;
            }
        }
    }

    tracing::warn!(response_id = %machine.identity().response_id, "upstream closed without [DONE]");
    sink.send(machine.finish_eof()).await
}
