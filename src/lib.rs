#![forbid(unsafe_code)]
#![doc = r#"
Responses Adapter

Serve the Responses API (`POST /v1/responses`) on top of an upstream that only speaks
Chat Completions, and forward every other route to that upstream unchanged.

Crate highlights
- Library: pure conversion via `normalize_messages`, `to_chat_request`,
  `chat_json_to_response` and the `ResponsesStream` state machine.
- HTTP server (in `server`): `/v1/responses` translated, `/status`, and passthrough
  for `/v1/models`, `/v1/embeddings` and everything else.

Modules
- `normalize`: content flattening and message normalization.
- `identity`: response/message identifiers.
- `conversion`: request translation and one-shot response translation.
- `stream`: SSE frame splitting and the streaming translator.
- `forward`: verbatim proxy for untranslated routes.
- `models`: Chat Completions and Responses types.
- `config`, `error`, `util`: configuration, error taxonomy, tracing and HTTP helpers.
"#]

pub mod config;
pub mod conversion;
pub mod error;
pub mod forward;
pub mod identity;
pub mod models;
pub mod normalize;
pub mod server;
pub mod stream;
pub mod util;

pub use crate::config::AdapterConfig;
pub use crate::conversion::{chat_json_to_response, to_chat_request};
pub use crate::error::{AdapterError, ConfigError};
pub use crate::identity::ResponseIdentity;
pub use crate::normalize::{extract_text, normalize_messages, InputShape};
pub use crate::stream::ResponsesStream;

// Re-export model namespaces for convenience (downstream users can do `use responses_adapter::chat`).
pub use crate::models::{chat, responses};
