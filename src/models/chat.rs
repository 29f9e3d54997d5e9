use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// Canonical conversation role.
///
/// Uses lowercase serialization to match the Chat Completions API:
/// "system" | "user" | "assistant"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    #[default]
    User,
    Assistant,
}

impl Role {
    /// Parse a role string; anything outside the three known roles is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One normalized conversation turn. Content is always plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub role: Role,
    pub content: String,
}

impl CanonicalMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Chat Completions request sent upstream.
///
/// Only the allowlisted generation parameters exist on this type, so nothing
/// else a client sends can be serialized upstream. Parameters are kept as raw
/// JSON values and forwarded unchanged.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<CanonicalMessage>,
    pub stream: bool,

    // Sampling / decoding
    #[serde(default)]
    pub temperature: Option<serde_json::Value>,
    #[serde(default)]
    pub top_p: Option<serde_json::Value>,
    #[serde(default)]
    pub max_tokens: Option<serde_json::Value>,
    #[serde(default)]
    pub presence_penalty: Option<serde_json::Value>,
    #[serde(default)]
    pub frequency_penalty: Option<serde_json::Value>,
    /// Accepts a single string or an array of strings.
    #[serde(default)]
    pub stop: Option<serde_json::Value>,
    #[serde(default)]
    pub user: Option<serde_json::Value>,
    #[serde(default)]
    pub n: Option<serde_json::Value>,
}

// ============================================================================
// Chat Completions Response Accessors
// ============================================================================

/// Text of `choices[0].message.content` in a non-streaming completion, or `""`.
pub fn completion_text(v: &serde_json::Value) -> &str {
    v.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .unwrap_or("")
}

/// Text of `choices[0].delta.content` in a streaming chunk, if it is a string.
pub fn chunk_delta_text(v: &serde_json::Value) -> Option<&str> {
    v.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
}

/// The `usage` object of a completion or chunk when the upstream supplied one.
pub fn usage_object(v: &serde_json::Value) -> Option<&serde_json::Value> {
    v.get("usage").filter(|u| u.is_object())
}
