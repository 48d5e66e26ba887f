//! A unified streaming abstraction over multiple LLM vendors.
//!
//! This library provides one request/response shape for chat generation
//! against OpenAI, Anthropic, and Google Gemini: normalized messages and
//! options in, a normalized chunk stream out. Vendor differences in request
//! serialization, stream framing, tool-call fragmentation, and finish
//! reporting stay inside the per-vendor adapters.

pub mod assembler;
pub mod config;
pub mod error;
pub mod factory;
pub mod provider;
pub mod providers;
pub mod sse_stream;
pub mod types;

pub use assembler::ChunkAssembler;
pub use config::ProviderConfig;
pub use error::Error;
pub use factory::{create_provider, create_provider_from_env, ProviderKind};
pub use provider::{ChunkStream, LlmProvider};
pub use providers::{AnthropicProvider, GeminiProvider, OpenAiProvider};
pub use sse_stream::{SseEvent, SseStream};
pub use types::*;
