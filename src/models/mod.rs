//! Data models for the Chat Completions and Responses APIs.
//!
//! This module groups two submodules:
//! - `chat`: canonical messages, the upstream Chat Completions request, and
//!   tolerant accessors for upstream completion/chunk JSON.
//! - `responses`: the Responses API objects and stream events served to clients.
//!
//! The mapping logic between them lives in `crate::conversion` (one-shot) and
//! `crate::stream` (incremental).

pub mod chat;
pub mod responses;

// Optional convenience re-exports for downstream users.
pub use chat::{CanonicalMessage, ChatCompletionRequest, Role};
pub use responses::{
    OutputMessage, OutputText, ResponseObject, ResponsesEvent, SequencedEvent, Status,
};
