use serde::{Deserialize, Serialize};
use serde_json::Value;

/// OpenAI Responses API request.
#[derive(Debug, Clone, Serialize)]
pub struct ResponsesRequest {
    pub model: String,
    pub input: Vec<ResponsesInputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ResponsesTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ResponsesToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ResponsesReasoning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

/// Item in the Responses API `input` array.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ResponsesInputItem {
    #[serde(rename = "message")]
    Message {
        role: String,
        content: ResponsesMessageContent,
    },
    /// A previous function call being replayed into the conversation.
    #[serde(rename = "function_call")]
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    #[serde(rename = "function_call_output")]
    FunctionCallOutput { call_id: String, output: String },
}

/// Message content: a plain string for text-only messages, parts otherwise.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResponsesMessageContent {
    Text(String),
    Parts(Vec<ResponsesContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ResponsesContentPart {
    #[serde(rename = "input_text")]
    Text { text: String },
    #[serde(rename = "input_image")]
    Image { image_url: String },
}

/// Responses API tool entry (flat, unlike Chat Completions).
#[derive(Debug, Clone, Serialize)]
pub struct ResponsesTool {
    pub r#type: String,
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tool choice: a bare mode string or a forced function selection.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResponsesToolChoice {
    Mode(String),
    Function { r#type: String, name: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponsesReasoning {
    pub effort: String,
}

/// OpenAI streaming Responses API event. Every field besides `type` is
/// optional; event variants are distinguished by the `type` string.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponsesStreamEvent {
    pub r#type: String,
    pub item_id: Option<String>,
    pub delta: Option<String>,
    pub item: Option<ResponsesOutputItem>,
    pub response: Option<ResponsesResponse>,
    // Populated on top-level `error` events.
    pub code: Option<String>,
    pub message: Option<String>,
}

/// Output item carried by `response.output_item.added` / `.done` events.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponsesOutputItem {
    pub id: String,
    pub r#type: String,
    pub call_id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// The full response object carried by terminal events.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponsesResponse {
    #[serde(default)]
    pub output: Vec<ResponsesOutputSummary>,
    pub incomplete_details: Option<ResponsesIncompleteDetails>,
    pub error: Option<ResponsesError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponsesOutputSummary {
    pub r#type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponsesIncompleteDetails {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponsesError {
    pub message: String,
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_item_tags() {
        let item = ResponsesInputItem::FunctionCallOutput {
            call_id: "call_1".into(),
            output: "sunny".into(),
        };
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({"type": "function_call_output", "call_id": "call_1", "output": "sunny"})
        );
    }

    #[test]
    fn test_tool_choice_forms() {
        assert_eq!(
            serde_json::to_value(ResponsesToolChoice::Mode("auto".into())).unwrap(),
            json!("auto")
        );
        assert_eq!(
            serde_json::to_value(ResponsesToolChoice::Function {
                r#type: "function".into(),
                name: "get_weather".into(),
            })
            .unwrap(),
            json!({"type": "function", "name": "get_weather"})
        );
    }

    #[test]
    fn test_message_content_forms() {
        let plain = ResponsesMessageContent::Text("hello".into());
        assert_eq!(serde_json::to_value(&plain).unwrap(), json!("hello"));

        let parts = ResponsesMessageContent::Parts(vec![
            ResponsesContentPart::Text { text: "look:".into() },
            ResponsesContentPart::Image {
                image_url: "data:image/png;base64,AA".into(),
            },
        ]);
        assert_eq!(
            serde_json::to_value(&parts).unwrap(),
            json!([
                {"type": "input_text", "text": "look:"},
                {"type": "input_image", "image_url": "data:image/png;base64,AA"},
            ])
        );
    }

    #[test]
    fn test_stream_event_parses_with_unknown_fields() {
        let event: ResponsesStreamEvent = serde_json::from_str(
            r#"{"type":"response.output_text.delta","sequence_number":3,"item_id":"msg_1","delta":"Hi"}"#,
        )
        .unwrap();
        assert_eq!(event.r#type, "response.output_text.delta");
        assert_eq!(event.delta.as_deref(), Some("Hi"));
    }
}
