//! Flattening of loosely shaped request content into canonical messages.
//!
//! Clients send conversation text in many shapes: Chat-style `messages`,
//! Responses-style `input` as a string, a message list, a single message
//! object, or an array of content parts. Everything is reduced to
//! `CanonicalMessage { role, content: String }` here and nothing structured
//! survives past this module.

use serde_json::Value;

use crate::models::chat::{CanonicalMessage, Role};

/// Collapse any JSON value into plain text. Never fails.
pub fn extract_text(content: &Value) -> String {
    match content {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts.iter().map(part_text).collect(),
        Value::Object(obj) => {
            if let Some(Value::String(s)) = obj.get("text") {
                return s.clone();
            }
            if let Some(Value::String(s)) = obj.get("content") {
                return s.clone();
            }
            serde_json::to_string(content).unwrap_or_else(|_| content.to_string())
        }
        Value::Bool(_) | Value::Number(_) => content.to_string(),
    }
}

/// Text contributed by one element of a content-part array.
fn part_text(part: &Value) -> String {
    match part {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("text")
            .filter(|v| !v.is_null())
            .or_else(|| obj.get("content").filter(|v| !v.is_null()))
            .map(extract_text)
            .unwrap_or_default(),
        _ => String::new(),
    }
}

impl CanonicalMessage {
    /// Normalize one message-like value. Unknown or missing roles become `user`.
    pub fn from_value(m: &Value) -> Self {
        let role = m
            .get("role")
            .and_then(|r| r.as_str())
            .and_then(Role::parse)
            .unwrap_or_default();
        let content = m.get("content").map(extract_text).unwrap_or_default();
        Self { role, content }
    }
}

/// Shape of the conversation carried by an inbound request body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputShape<'a> {
    /// `messages` is an array.
    Messages(&'a [Value]),
    /// `input` is an array whose first element looks like a message.
    MessageList(&'a [Value]),
    /// `input` is a single object with a `role` or `content` key.
    SingleMessage(&'a Value),
    /// `input` is an array of content parts or strings.
    PartList(&'a [Value]),
    /// `input` is missing, a string, or anything else.
    Scalar(Option<&'a Value>),
}

impl<'a> InputShape<'a> {
    /// Classify a request body. The first matching rule wins.
    pub fn classify(body: &'a Value) -> Self {
        if let Some(msgs) = body.get("messages").and_then(|m| m.as_array()) {
            return InputShape::Messages(msgs);
        }
        let input = body.get("input");
        match input {
            Some(Value::Array(items)) if items.first().is_some_and(looks_like_message) => {
                InputShape::MessageList(items)
            }
            Some(v)
                if v
                    .as_object()
                    .is_some_and(|o| o.contains_key("role") || o.contains_key("content")) =>
            {
                InputShape::SingleMessage(v)
            }
            Some(Value::Array(items)) => InputShape::PartList(items),
            other => InputShape::Scalar(other),
        }
    }

    /// Produce the canonical messages for this shape.
    pub fn into_messages(self) -> Vec<CanonicalMessage> {
        match self {
            InputShape::Messages(items) | InputShape::MessageList(items) => {
                items.iter().map(CanonicalMessage::from_value).collect()
            }
            InputShape::SingleMessage(m) => vec![CanonicalMessage::from_value(m)],
            InputShape::PartList(items) => {
                vec![CanonicalMessage::user(
                    items.iter().map(part_text).collect::<String>(),
                )]
            }
            InputShape::Scalar(v) => {
                vec![CanonicalMessage::user(
                    v.map(extract_text).unwrap_or_default(),
                )]
            }
        }
    }
}

/// A first element counts as a message when it carries a truthy `role` or `content`.
fn looks_like_message(v: &Value) -> bool {
    let truthy = |key: &str| match v.get(key) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(_) => true,
    };
    v.is_object() && (truthy("role") || truthy("content"))
}

/// Convert an inbound request body into a non-empty list of canonical messages.
pub fn normalize_messages(body: &Value) -> Vec<CanonicalMessage> {
    let shape = InputShape::classify(body);
    let mut messages = shape.into_messages();
    if messages.is_empty() {
        tracing::debug!("request carried an empty message array; substituting an empty user turn");
        messages.push(CanonicalMessage::user(""));
    }
    messages
}
