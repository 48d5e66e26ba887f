//! Per-call decode state shared by every vendor adapter.
//!
//! Each `generate` call owns one [`ChunkAssembler`]. Vendor decoders feed it
//! text deltas and tool-call argument fragments as frames arrive; it keeps
//! the running text, buffers argument fragments per in-flight call, parses
//! each call's arguments exactly once at its end signal, and produces the
//! single terminal chunk.

use serde_json::{Map, Value};

use crate::types::{FinishReason, StreamChunk, ToolCall};
use crate::Error;

/// A tool call under construction. `key` is the vendor-local handle (a
/// content-block index or an output-item id), distinct from the call id the
/// caller correlates tool results with.
#[derive(Debug)]
struct PendingToolCall {
    key: String,
    id: String,
    name: String,
    fragments: String,
}

/// Accumulates vendor frames into normalized stream chunks.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    text: String,
    /// In-flight calls in registration order.
    pending: Vec<PendingToolCall>,
    finished: bool,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the terminal chunk has already been produced. Frames arriving
    /// after that point are ignored by the decoders.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Append a text delta and produce the chunk reporting it.
    pub fn text_delta(&mut self, delta: &str) -> StreamChunk {
        self.emit(delta, Vec::new(), None)
    }

    /// Register a tool call whose arguments will arrive as fragments.
    pub fn begin_tool_call(
        &mut self,
        key: impl Into<String>,
        id: impl Into<String>,
        name: impl Into<String>,
    ) {
        self.pending.push(PendingToolCall {
            key: key.into(),
            id: id.into(),
            name: name.into(),
            fragments: String::new(),
        });
    }

    /// Append an argument fragment to the call registered under `key`.
    /// Fragments for unknown keys are dropped; the vendor sent a delta for a
    /// block we never saw start, which we cannot attribute.
    pub fn append_arguments(&mut self, key: &str, fragment: &str) {
        if let Some(call) = self.pending.iter_mut().find(|c| c.key == key) {
            call.fragments.push_str(fragment);
        } else {
            tracing::warn!(key, "argument fragment for unregistered tool call");
        }
    }

    /// Replace the buffered arguments for `key` with a complete JSON string.
    /// Used when a vendor front-loads the full input in the start frame.
    pub fn seed_arguments(&mut self, key: &str, json: String) {
        if let Some(call) = self.pending.iter_mut().find(|c| c.key == key) {
            call.fragments = json;
        }
    }

    /// Finalize the call registered under `key`: parse its fragments once
    /// and produce the chunk carrying the completed call. Returns `Ok(None)`
    /// when `key` is not a pending call (e.g. the end signal of a text
    /// block).
    pub fn end_tool_call(&mut self, key: &str) -> Result<Option<StreamChunk>, Error> {
        let Some(pos) = self.pending.iter().position(|c| c.key == key) else {
            return Ok(None);
        };
        let call = self.pending.remove(pos);
        let call = Self::parse_pending(call)?;
        Ok(Some(self.emit("", vec![call], None)))
    }

    /// Record a call whose arguments arrived fully formed and produce the
    /// chunk carrying it.
    pub fn complete_tool_call(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> StreamChunk {
        let call = ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        };
        self.emit("", vec![call], None)
    }

    /// Produce one chunk combining everything a single vendor frame carried:
    /// a text delta, completed calls, and possibly the finish reason. Used by
    /// vendors that pack multiple parts into one frame. A frame carrying a
    /// finish reason is terminal.
    pub fn frame(
        &mut self,
        delta: &str,
        tool_calls: Vec<ToolCall>,
        finish_reason: Option<FinishReason>,
    ) -> StreamChunk {
        let chunk = self.emit(delta, tool_calls, finish_reason);
        if chunk.finish_reason.is_some() {
            self.finished = true;
        }
        chunk
    }

    /// Produce the terminal chunk. Any calls still pending are finalized
    /// here: the end of the generation is their end signal.
    pub fn finish(&mut self, reason: FinishReason) -> Result<StreamChunk, Error> {
        let leftovers = std::mem::take(&mut self.pending)
            .into_iter()
            .map(Self::parse_pending)
            .collect::<Result<Vec<_>, _>>()?;
        let chunk = self.emit("", leftovers, Some(reason));
        self.finished = true;
        Ok(chunk)
    }

    /// The one place chunks are built, so the accumulation invariant holds
    /// everywhere: `content` is always the concatenation of deltas so far.
    fn emit(
        &mut self,
        delta: &str,
        tool_calls: Vec<ToolCall>,
        finish_reason: Option<FinishReason>,
    ) -> StreamChunk {
        self.text.push_str(delta);
        StreamChunk {
            content: self.text.clone(),
            delta: delta.to_string(),
            finish_reason,
            tool_calls,
        }
    }

    fn parse_pending(call: PendingToolCall) -> Result<ToolCall, Error> {
        let raw = call.fragments.trim();
        let arguments = if raw.is_empty() {
            // A call with no argument fragments is a zero-argument call.
            Map::new()
        } else {
            match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                Ok(other) => {
                    return Err(Error::tool_arguments(
                        call.id,
                        format!("expected a JSON object, got {other}"),
                    ))
                }
                Err(e) => return Err(Error::tool_arguments(call.id, e.to_string())),
            }
        };
        Ok(ToolCall {
            id: call.id,
            name: call.name,
            arguments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_monotonic_accumulation() {
        let mut asm = ChunkAssembler::new();

        let c1 = asm.text_delta("The answer");
        assert_eq!(c1.content, "The answer");
        assert_eq!(c1.delta, "The answer");

        let c2 = asm.text_delta(" is 4.");
        assert_eq!(c2.content, "The answer is 4.");
        assert_eq!(c2.delta, " is 4.");

        let done = asm.finish(FinishReason::Stop).unwrap();
        assert_eq!(done.content, "The answer is 4.");
        assert_eq!(done.delta, "");
        assert_eq!(done.finish_reason, Some(FinishReason::Stop));
        assert!(asm.is_finished());
    }

    #[test]
    fn test_fragmented_arguments_assemble_once() {
        let mut asm = ChunkAssembler::new();
        asm.begin_tool_call("0", "call_1", "get_weather");
        asm.append_arguments("0", "{\"locat");
        asm.append_arguments("0", "ion\":\"SF\"}");

        let chunk = asm.end_tool_call("0").unwrap().unwrap();
        assert_eq!(chunk.tool_calls.len(), 1);
        let call = &chunk.tool_calls[0];
        assert_eq!(call.id, "call_1");
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.arguments.get("location"), Some(&json!("SF")));

        // Finalized exactly once: the call is gone from pending state.
        assert!(asm.end_tool_call("0").unwrap().is_none());
    }

    #[test]
    fn test_malformed_arguments_error_not_silent_default() {
        let mut asm = ChunkAssembler::new();
        asm.begin_tool_call("0", "call_1", "get_weather");
        asm.append_arguments("0", "{\"a\":");

        let err = asm.end_tool_call("0").unwrap_err();
        assert!(matches!(err, Error::ToolArgumentParse { ref call_id, .. } if call_id == "call_1"));
    }

    #[test]
    fn test_non_object_arguments_rejected() {
        let mut asm = ChunkAssembler::new();
        asm.begin_tool_call("0", "call_1", "f");
        asm.append_arguments("0", "[1,2,3]");
        assert!(matches!(
            asm.end_tool_call("0"),
            Err(Error::ToolArgumentParse { .. })
        ));
    }

    #[test]
    fn test_empty_fragments_parse_as_no_arguments() {
        let mut asm = ChunkAssembler::new();
        asm.begin_tool_call("0", "call_1", "ping");
        let chunk = asm.end_tool_call("0").unwrap().unwrap();
        assert!(chunk.tool_calls[0].arguments.is_empty());
    }

    #[test]
    fn test_finish_finalizes_pending_calls() {
        let mut asm = ChunkAssembler::new();
        asm.begin_tool_call("0", "call_1", "get_weather");
        asm.append_arguments("0", "{\"location\":\"SF\"}");

        let done = asm.finish(FinishReason::ToolUse).unwrap();
        assert_eq!(done.finish_reason, Some(FinishReason::ToolUse));
        assert_eq!(done.tool_calls.len(), 1);
        assert_eq!(done.tool_calls[0].arguments.get("location"), Some(&json!("SF")));
    }

    #[test]
    fn test_tool_only_generation_keeps_empty_content() {
        let mut asm = ChunkAssembler::new();
        asm.begin_tool_call("0", "call_1", "lookup");
        asm.append_arguments("0", "{}");
        let chunk = asm.end_tool_call("0").unwrap().unwrap();
        assert_eq!(chunk.content, "");

        let done = asm.finish(FinishReason::ToolUse).unwrap();
        assert_eq!(done.content, "");
        assert_eq!(done.delta, "");
    }

    #[test]
    fn test_seed_arguments_replaces_buffer() {
        let mut asm = ChunkAssembler::new();
        asm.begin_tool_call("3", "call_9", "f");
        asm.seed_arguments("3", "{\"x\":1}".to_string());
        let chunk = asm.end_tool_call("3").unwrap().unwrap();
        assert_eq!(chunk.tool_calls[0].arguments.get("x"), Some(&json!(1)));
    }

    #[test]
    fn test_interleaved_calls_keyed_independently() {
        let mut asm = ChunkAssembler::new();
        asm.begin_tool_call("0", "call_a", "first");
        asm.begin_tool_call("1", "call_b", "second");
        asm.append_arguments("0", "{\"n\":1}");
        asm.append_arguments("1", "{\"n\":2}");

        let c1 = asm.end_tool_call("1").unwrap().unwrap();
        assert_eq!(c1.tool_calls[0].id, "call_b");
        let c0 = asm.end_tool_call("0").unwrap().unwrap();
        assert_eq!(c0.tool_calls[0].arguments.get("n"), Some(&json!(1)));
    }
}
