use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::identity::ResponseIdentity;

/// Lifecycle status shared by response objects and output items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    InProgress,
    Completed,
}

/// `output_text` content part. Annotations are always empty here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "output_text")]
pub struct OutputText {
    pub text: String,
    #[serde(default)]
    pub annotations: Vec<serde_json::Value>,
}

impl OutputText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            annotations: Vec::new(),
        }
    }
}

/// The single assistant `message` output item this adapter produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "message")]
pub struct OutputMessage {
    pub id: String,
    pub role: String,
    pub status: Status,
    pub content: Vec<OutputText>,
}

impl OutputMessage {
    pub fn in_progress(id: &ResponseIdentity) -> Self {
        Self {
            id: id.message_id.clone(),
            role: "assistant".into(),
            status: Status::InProgress,
            content: Vec::new(),
        }
    }

    pub fn completed(id: &ResponseIdentity, text: &str) -> Self {
        Self {
            id: id.message_id.clone(),
            role: "assistant".into(),
            status: Status::Completed,
            content: vec![OutputText::new(text)],
        }
    }
}

/// Responses API response object.
///
/// `usage` is whatever the upstream reported, passed through untouched.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseObject {
    pub id: String,
    pub object: String, // "response"
    pub model: String,
    pub status: Status,
    pub created_at: u64,
    #[serde(default)]
    pub output: Vec<OutputMessage>,
    #[serde(default)]
    pub usage: Option<serde_json::Value>,
}

impl ResponseObject {
    /// Skeleton announced by `response.created` before any output exists.
    pub fn in_progress(id: &ResponseIdentity, model: &str) -> Self {
        Self {
            id: id.response_id.clone(),
            object: "response".into(),
            model: model.to_string(),
            status: Status::InProgress,
            created_at: id.created_at,
            output: Vec::new(),
            usage: None,
        }
    }

    pub fn completed(
        id: &ResponseIdentity,
        model: &str,
        text: &str,
        usage: serde_json::Value,
    ) -> Self {
        Self {
            id: id.response_id.clone(),
            object: "response".into(),
            model: model.to_string(),
            status: Status::Completed,
            created_at: id.created_at,
            output: vec![OutputMessage::completed(id, text)],
            usage: Some(usage),
        }
    }

    /// Concatenated text of every output part.
    pub fn output_text(&self) -> String {
        self.output
            .iter()
            .flat_map(|m| m.content.iter())
            .map(|p| p.text.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
}

// ============================================================================
// Responses API Streaming Events
// ============================================================================

/// Every event kind this adapter writes to a Responses stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponsesEvent {
    #[serde(rename = "response.created")]
    Created { response: ResponseObject },
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        output_index: u32,
        item: OutputMessage,
    },
    #[serde(rename = "response.content_part.added")]
    ContentPartAdded {
        item_id: String,
        output_index: u32,
        content_index: u32,
        part: OutputText,
    },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        item_id: String,
        output_index: u32,
        content_index: u32,
        delta: String,
    },
    #[serde(rename = "response.output_text.done")]
    OutputTextDone {
        item_id: String,
        output_index: u32,
        content_index: u32,
        text: String,
    },
    #[serde(rename = "response.content_part.done")]
    ContentPartDone {
        item_id: String,
        output_index: u32,
        content_index: u32,
        part: OutputText,
    },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        output_index: u32,
        item: OutputMessage,
    },
    #[serde(rename = "response.completed")]
    Completed { response: ResponseObject },
    #[serde(rename = "response.error")]
    Error { error: ErrorDetail },
}

impl ResponsesEvent {
    /// Wire name of the event, identical to its `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            ResponsesEvent::Created { .. } => "response.created",
            ResponsesEvent::OutputItemAdded { .. } => "response.output_item.added",
            ResponsesEvent::ContentPartAdded { .. } => "response.content_part.added",
            ResponsesEvent::OutputTextDelta { .. } => "response.output_text.delta",
            ResponsesEvent::OutputTextDone { .. } => "response.output_text.done",
            ResponsesEvent::ContentPartDone { .. } => "response.content_part.done",
            ResponsesEvent::OutputItemDone { .. } => "response.output_item.done",
            ResponsesEvent::Completed { .. } => "response.completed",
            ResponsesEvent::Error { .. } => "response.error",
        }
    }

    /// True for the two events that end a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResponsesEvent::Completed { .. } | ResponsesEvent::Error { .. }
        )
    }
}

/// An event stamped with its position in the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencedEvent {
    pub sequence_number: u64,
    #[serde(flatten)]
    pub event: ResponsesEvent,
}

impl SequencedEvent {
    /// Encode as one SSE frame: `event: <type>\ndata: <json>\n\n`.
    pub fn to_sse(&self) -> String {
        // Serializing these plain structs cannot fail; keep the frame well-formed regardless.
        let data = serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({
                "type": "response.error",
                "sequence_number": self.sequence_number,
                "error": { "message": format!("event encoding failed: {e}") }
            })
            .to_string()
        });
        format!("event: {}\ndata: {}\n\n", self.event.kind(), data)
    }
}

/// End-of-stream sentinel written after the terminal event.
pub const SSE_DONE: &str = "data: [DONE]\n\n";
