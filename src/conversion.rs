use serde_json::Value;

use crate::identity::ResponseIdentity;
use crate::models::chat::{self, CanonicalMessage, ChatCompletionRequest};
use crate::models::responses::ResponseObject;
use crate::normalize::normalize_messages;

/// Streaming flag of an inbound request. Absent or non-boolean means streaming.
pub fn request_stream_flag(body: &Value) -> bool {
    body.get("stream").and_then(|s| s.as_bool()).unwrap_or(true)
}

/// Requested model name, or `""` when absent.
pub fn request_model(body: &Value) -> String {
    body.get("model")
        .and_then(|m| m.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Convert an inbound Responses-style body into the upstream Chat Completions request.
///
/// Mapping highlights:
/// - messages: normalized from `messages` or `input` into plain-text role/content pairs.
/// - generation parameters: only temperature, top_p, max_tokens, presence_penalty,
///   frequency_penalty, stop, user and n are forwarded, unchanged. Everything else
///   (tools, reasoning settings, metadata, ...) is dropped.
/// - stream: taken from `request_stream_flag`.
pub fn to_chat_request(body: &Value) -> ChatCompletionRequest {
    to_chat_request_with_messages(body, normalize_messages(body))
}

/// Same as `to_chat_request` with messages that were already normalized.
pub fn to_chat_request_with_messages(
    body: &Value,
    messages: Vec<CanonicalMessage>,
) -> ChatCompletionRequest {
    let param = |name: &str| body.get(name).filter(|v| !v.is_null()).cloned();

    ChatCompletionRequest {
        model: request_model(body),
        messages,
        stream: request_stream_flag(body),
        temperature: param("temperature"),
        top_p: param("top_p"),
        max_tokens: param("max_tokens"),
        presence_penalty: param("presence_penalty"),
        frequency_penalty: param("frequency_penalty"),
        stop: param("stop"),
        user: param("user"),
        n: param("n"),
    }
}

/// Convert one upstream Chat Completions JSON body into a Responses object.
///
/// Missing structure never fails: absent content yields empty text and absent
/// usage yields `{}`.
pub fn chat_json_to_response(
    completion: &Value,
    identity: &ResponseIdentity,
    model: &str,
) -> ResponseObject {
    let text = chat::completion_text(completion);
    let usage = chat::usage_object(completion)
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));
    ResponseObject::completed(identity, model, text, usage)
}
