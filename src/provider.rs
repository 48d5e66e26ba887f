use crate::types::{GenerationOptions, Message, StreamChunk};
use crate::Error;
use futures_util::stream::Stream;
use std::pin::Pin;

/// A lazy, pull-driven sequence of normalized stream chunks.
///
/// Dropping the stream before exhaustion closes the underlying HTTP
/// connection.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, Error>> + Send>>;

/// A trait for LLM providers that can generate streaming chat completions.
///
/// Every vendor adapter implements this identically so callers can swap
/// vendors without code changes. Errors before any frame is received are
/// returned from `generate` itself; mid-stream failures arrive as `Err`
/// items on the returned stream.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync + 'static {
    /// Generate a chat completion as a stream of normalized chunks.
    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<ChunkStream, Error>;
}
