use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One piece of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Plain text.
    Text { text: String },
    /// An image as a base64 payload or data URL. Opaque to the core; each
    /// adapter re-encodes it the way its vendor expects.
    Image { image: String },
    /// The result of a tool call made earlier in the conversation.
    /// `tool_call_id` must reference a `ToolCall::id`; the core does not
    /// enforce referential integrity.
    ToolResult { tool_call_id: String, result: String },
}

/// A message in a conversation.
///
/// `content` is never null (it may be empty); `tool_calls` is only
/// meaningful on assistant messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: Vec<Content>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl Message {
    /// Create a message with a single text content.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Message {
            role,
            content: vec![Content::Text { text: text.into() }],
            tool_calls: Vec::new(),
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Create an assistant message that carries tool calls and no text.
    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Message {
            role: Role::Assistant,
            content: Vec::new(),
            tool_calls: calls,
        }
    }

    /// Create a tool message carrying a single tool result.
    pub fn tool_result(tool_call_id: impl Into<String>, result: impl Into<String>) -> Self {
        Message {
            role: Role::Tool,
            content: vec![Content::ToolResult {
                tool_call_id: tool_call_id.into(),
                result: result.into(),
            }],
            tool_calls: Vec::new(),
        }
    }

    /// Append an image content to this message.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.content.push(Content::Image {
            image: image.into(),
        });
        self
    }

    /// Append a text content to this message.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.content.push(Content::Text { text: text.into() });
        self
    }

    /// All text content concatenated.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                Content::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Tool definition for function calling. `parameters` is a JSON-schema
/// shaped value passed through to the vendor unvalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl Tool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Tool {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A tool call produced by a generation. `arguments` is always a fully
/// parsed mapping; fragment assembly happens inside the stream decoders and
/// never surfaces here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// How the model is allowed to use the declared tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// The model decides whether to call a tool.
    Auto,
    /// The model must call at least one tool.
    Required,
    /// The model must not call any tool.
    None,
    /// The model must call exactly the named tool.
    Tool { name: String },
}

/// Reason why a generation finished, normalized across vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolUse,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_builders() {
        let msg = Message::user("hello").with_image("data:image/png;base64,AAAA");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content.len(), 2);
        assert_eq!(msg.text(), "hello");

        let msg = Message::tool_result("call_1", "22C");
        assert_eq!(msg.role, Role::Tool);
        assert!(matches!(
            &msg.content[0],
            Content::ToolResult { tool_call_id, result }
                if tool_call_id == "call_1" && result == "22C"
        ));
    }

    #[test]
    fn test_content_serde_tags() {
        let text: Content = serde_json::from_value(json!({"type": "text", "text": "hi"})).unwrap();
        assert_eq!(text, Content::Text { text: "hi".into() });

        let result: Content = serde_json::from_value(
            json!({"type": "tool_result", "tool_call_id": "call_1", "result": "ok"}),
        )
        .unwrap();
        assert!(matches!(result, Content::ToolResult { .. }));
    }

    #[test]
    fn test_finish_reason_serde() {
        assert_eq!(
            serde_json::to_value(FinishReason::ToolUse).unwrap(),
            json!("tool_use")
        );
        assert_eq!(
            serde_json::to_value(FinishReason::Stop).unwrap(),
            json!("stop")
        );
    }
}
