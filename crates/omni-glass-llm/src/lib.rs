//! Omni-Glass LLM Transport.
//!
//! A capability contract ([`LlmProvider`]) with streaming CLASSIFY and
//! EXECUTE operations, plus the `is_remote()` capability consulted by the
//! safety layer. Token counting, model selection, and endpoint framing
//! are concealed behind the contract; callers never introspect provider
//! identity.
//!
//! Implementations:
//! - [`ClaudeProvider`]: Anthropic Messages API over SSE (remote)
//! - [`OpenAiCompatProvider`]: OpenAI-style chat completions over SSE,
//!   for Gemini-compatible and self-hosted endpoints (remote)
//! - [`LocalProvider`]: deterministic in-process model (local)

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod claude;
pub mod error;
pub mod local;
pub mod openai_compat;
pub mod provider;
pub mod types;

pub use claude::ClaudeProvider;
pub use error::{LlmError, LlmResult};
pub use local::LocalProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use provider::{ChunkStream, LlmProvider, ProviderConfig};
pub use types::{LlmRequest, StreamChunk};
