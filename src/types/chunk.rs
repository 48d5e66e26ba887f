//! The normalized streaming chunk shape shared by all vendor adapters.

use serde::{Deserialize, Serialize};

use super::message::{FinishReason, ToolCall};

/// One incremental update of a generation.
///
/// Invariants upheld by every adapter:
/// - `content` is the prefix-concatenation of all `delta` values yielded so
///   far in this generation (monotonically non-decreasing, never replaced).
/// - `tool_calls` lists only calls whose arguments are fully parsed; a call
///   appears exactly once across the whole generation.
/// - `finish_reason` is set on exactly one chunk of a successful generation,
///   and that chunk is the last one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Cumulative text so far.
    pub content: String,
    /// Text added by this chunk (may be empty on tool-call or terminal chunks).
    pub delta: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tool_calls: Vec<ToolCall>,
}

impl StreamChunk {
    /// Whether this is the terminal chunk of the generation.
    pub fn is_final(&self) -> bool {
        self.finish_reason.is_some()
    }
}
