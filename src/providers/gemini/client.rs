use std::collections::HashMap;

use futures_util::future::ready;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::types::*;
use crate::assembler::ChunkAssembler;
use crate::config::ProviderConfig;
use crate::provider::{ChunkStream, LlmProvider};
use crate::providers::{ensure_success, send_with_retries, split_image_payload};
use crate::sse_stream::SseStream;
use crate::types::{
    Content, FinishReason, GenerationOptions, Message, Role, StreamChunk, ToolCall, ToolChoice,
};
use crate::Error;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const PROVIDER: &str = "gemini";

/// Google Gemini provider targeting the Generative Language API.
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
    defaults: GenerationOptions,
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, Error> {
        let client = config.build_client()?;
        Ok(Self {
            client,
            base_url: config.base_url_or(DEFAULT_BASE_URL),
            api_key: config.api_key,
            max_retries: config.max_retries,
            defaults: config.defaults.unwrap_or_default(),
        })
    }

    /// Convert normalized messages and options to a Gemini request.
    fn convert_request(
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<GeminiRequest, Error> {
        // Tool results reference calls by id, but Gemini correlates
        // function responses by name. Resolve ids against every call made
        // earlier in the conversation.
        let call_names: HashMap<&str, &str> = messages
            .iter()
            .flat_map(|m| m.tool_calls.iter())
            .map(|call| (call.id.as_str(), call.name.as_str()))
            .collect();

        let mut contents: Vec<GeminiContent> = Vec::new();
        let mut system_parts: Vec<String> = Vec::new();

        for message in messages {
            if message.role == Role::System {
                system_parts.push(message.text());
                continue;
            }

            let mut parts = Vec::new();
            for content in &message.content {
                match content {
                    Content::Text { text } => {
                        parts.push(GeminiPart::Text { text: text.clone() })
                    }
                    Content::Image { image } => {
                        let (mime_type, data) = split_image_payload(image);
                        parts.push(GeminiPart::InlineData {
                            inline_data: GeminiInlineData { mime_type, data },
                        });
                    }
                    Content::ToolResult {
                        tool_call_id,
                        result,
                    } => {
                        let name = call_names
                            .get(tool_call_id.as_str())
                            .copied()
                            .unwrap_or(tool_call_id.as_str());
                        parts.push(GeminiPart::FunctionResponse {
                            function_response: GeminiFunctionResponse {
                                name: name.to_string(),
                                response: wrap_result(result),
                            },
                        });
                    }
                }
            }

            for call in &message.tool_calls {
                parts.push(GeminiPart::FunctionCall {
                    function_call: GeminiFunctionCall {
                        name: call.name.clone(),
                        args: Some(Value::Object(call.arguments.clone())),
                    },
                });
            }

            if parts.is_empty() {
                continue;
            }
            let role = match message.role {
                Role::Assistant => "model",
                _ => "user",
            };
            contents.push(GeminiContent::new(role, parts));
        }

        let ext = options.gemini.clone().unwrap_or_default();

        let generation_config = GeminiGenerationConfig {
            temperature: options.temperature,
            top_p: options.top_p,
            top_k: options.top_k,
            max_output_tokens: options.max_output_tokens,
            stop_sequences: options.stop_sequences.clone(),
            candidate_count: ext.candidate_count,
            response_mime_type: ext.response_mime_type.clone(),
        };

        let tools = options.tools.as_ref().map(|tools| {
            vec![GeminiToolDeclarations {
                function_declarations: tools
                    .iter()
                    .map(|tool| GeminiFunctionDeclaration {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                    })
                    .collect(),
            }]
        });

        let tool_config = options.tool_choice.as_ref().map(|choice| {
            let config = match choice {
                ToolChoice::Auto => GeminiFunctionCallingConfig {
                    mode: "AUTO".to_string(),
                    allowed_function_names: None,
                },
                ToolChoice::Required => GeminiFunctionCallingConfig {
                    mode: "ANY".to_string(),
                    allowed_function_names: None,
                },
                ToolChoice::None => GeminiFunctionCallingConfig {
                    mode: "NONE".to_string(),
                    allowed_function_names: None,
                },
                ToolChoice::Tool { name } => GeminiFunctionCallingConfig {
                    mode: "ANY".to_string(),
                    allowed_function_names: Some(vec![name.clone()]),
                },
            };
            GeminiToolConfig {
                function_calling_config: config,
            }
        });

        Ok(GeminiRequest {
            contents,
            system_instruction: if system_parts.is_empty() {
                None
            } else {
                Some(GeminiContent::text(system_parts.join("\n")))
            },
            generation_config: Some(generation_config),
            tools,
            tool_config,
            safety_settings: ext.safety_settings,
        })
    }

    fn map_finish_reason(reason: &str, produced_calls: bool) -> FinishReason {
        match reason {
            // Gemini reports STOP even when the turn ended in tool calls.
            "STOP" if produced_calls => FinishReason::ToolUse,
            "STOP" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::Length,
            "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
                FinishReason::Error
            }
            _ => FinishReason::Stop,
        }
    }
}

/// Gemini calls carry no id on the wire; mint one so callers can correlate
/// tool results the same way as with the other vendors.
fn mint_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// Gemini expects function responses to be JSON objects. Pass object results
/// through, wrap anything else.
fn wrap_result(result: &str) -> Value {
    match serde_json::from_str::<Value>(result) {
        Ok(value @ Value::Object(_)) => value,
        _ => json!({ "result": result }),
    }
}

/// Per-call decoder. Unlike the event-per-fragment vendors, one Gemini frame
/// may carry text, function calls, and the finish reason together; each frame
/// maps to at most one chunk.
#[derive(Debug, Default)]
struct GeminiDecoder {
    assembler: ChunkAssembler,
    produced_calls: bool,
}

impl GeminiDecoder {
    fn decode(&mut self, frame: GeminiStreamFrame) -> Result<Option<StreamChunk>, Error> {
        if let Some(error) = frame.error {
            let status = error.status.unwrap_or_else(|| "error".to_string());
            return Err(Error::provider_stream(
                PROVIDER,
                format!("{status}: {}", error.message),
            ));
        }
        if let Some(reason) = frame.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(Error::provider_stream(
                PROVIDER,
                format!("prompt blocked: {reason}"),
            ));
        }

        let Some(candidate) = frame.candidates.into_iter().flatten().next() else {
            return Ok(None);
        };

        let mut delta = String::new();
        let mut calls = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            match part {
                GeminiPart::Text { text } => delta.push_str(&text),
                GeminiPart::FunctionCall { function_call } => {
                    let id = mint_call_id();
                    let arguments = match function_call.args {
                        None | Some(Value::Null) => Map::new(),
                        Some(Value::Object(map)) => map,
                        Some(other) => {
                            return Err(Error::tool_arguments(
                                id,
                                format!("expected a JSON object, got {other}"),
                            ))
                        }
                    };
                    calls.push(ToolCall {
                        id,
                        name: function_call.name,
                        arguments,
                    });
                }
                GeminiPart::InlineData { .. } | GeminiPart::FunctionResponse { .. } => {}
            }
        }

        if !calls.is_empty() {
            self.produced_calls = true;
        }
        let finish = candidate
            .finish_reason
            .as_deref()
            .map(|reason| GeminiProvider::map_finish_reason(reason, self.produced_calls));

        if delta.is_empty() && calls.is_empty() && finish.is_none() {
            return Ok(None);
        }
        Ok(Some(self.assembler.frame(&delta, calls, finish)))
    }

    fn is_finished(&self) -> bool {
        self.assembler.is_finished()
    }
}

#[async_trait::async_trait]
impl LlmProvider for GeminiProvider {
    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<ChunkStream, Error> {
        let options = options.merged_over(&self.defaults);
        if options.model.is_empty() {
            return Err(Error::config("model is required"));
        }

        let request = Self::convert_request(messages, &options)?;

        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, options.model
        );
        let builder = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request);

        let response = send_with_retries(builder, self.max_retries).await?;
        let response = ensure_success(response).await?;

        let byte_stream = Box::pin(response.bytes_stream().map(|r| r.map_err(Error::from)));
        let sse_stream = SseStream::new(byte_stream);

        let mut decoder = GeminiDecoder::default();
        let mut failed = false;

        let chunks = sse_stream.filter_map(move |sse_result| {
            if failed || decoder.is_finished() {
                return ready(None);
            }
            let out = match sse_result {
                Err(e) => {
                    failed = true;
                    Some(Err(e))
                }
                Ok(event) => match serde_json::from_str::<GeminiStreamFrame>(event.data.trim()) {
                    Ok(frame) => match decoder.decode(frame) {
                        Ok(chunk) => chunk.map(Ok),
                        Err(e) => {
                            failed = true;
                            Some(Err(e))
                        }
                    },
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping unparseable frame");
                        None
                    }
                },
            };
            ready(out)
        });

        Ok(Box::pin(chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_all(frames: &[&str]) -> Result<Vec<StreamChunk>, Error> {
        let mut decoder = GeminiDecoder::default();
        let mut chunks = Vec::new();
        for frame in frames {
            let frame: GeminiStreamFrame = serde_json::from_str(frame).unwrap();
            if let Some(chunk) = decoder.decode(frame)? {
                chunks.push(chunk);
            }
        }
        Ok(chunks)
    }

    #[test]
    fn test_text_stream_accumulates() {
        let chunks = decode_all(&[
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"The answer"}]}}]}"#,
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":" is 4."}]},"finishReason":"STOP"}]}"#,
        ])
        .unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "The answer");
        let done = &chunks[1];
        assert_eq!(done.content, "The answer is 4.");
        assert_eq!(done.delta, " is 4.");
        assert_eq!(done.finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn test_combined_frame_yields_one_chunk() {
        // Text, a call, and the finish reason all arrive in one frame.
        let chunks = decode_all(&[
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Checking."},{"functionCall":{"name":"get_weather","args":{"location":"SF"}}}]},"finishReason":"STOP"}]}"#,
        ])
        .unwrap();

        assert_eq!(chunks.len(), 1);
        let chunk = &chunks[0];
        assert_eq!(chunk.content, "Checking.");
        assert_eq!(chunk.tool_calls.len(), 1);
        assert_eq!(chunk.tool_calls[0].name, "get_weather");
        assert!(chunk.tool_calls[0].id.starts_with("call_"));
        assert_eq!(
            chunk.tool_calls[0].arguments.get("location"),
            Some(&json!("SF"))
        );
        // STOP with calls in the turn reports tool use.
        assert_eq!(chunk.finish_reason, Some(FinishReason::ToolUse));
    }

    #[test]
    fn test_stop_after_earlier_calls_is_tool_use() {
        let chunks = decode_all(&[
            r#"{"candidates":[{"content":{"role":"model","parts":[{"functionCall":{"name":"lookup","args":{}}}]}}]}"#,
            r#"{"candidates":[{"content":{"role":"model","parts":[]},"finishReason":"STOP"}]}"#,
        ])
        .unwrap();
        assert_eq!(chunks[1].finish_reason, Some(FinishReason::ToolUse));
    }

    #[test]
    fn test_max_tokens_maps_to_length() {
        let chunks = decode_all(&[
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"trunc"}]},"finishReason":"MAX_TOKENS"}]}"#,
        ])
        .unwrap();
        assert_eq!(chunks[0].finish_reason, Some(FinishReason::Length));
    }

    #[test]
    fn test_safety_stop_maps_to_error_reason() {
        let chunks = decode_all(&[
            r#"{"candidates":[{"content":{"role":"model","parts":[]},"finishReason":"SAFETY"}]}"#,
        ])
        .unwrap();
        assert_eq!(chunks[0].finish_reason, Some(FinishReason::Error));
    }

    #[test]
    fn test_non_object_args_rejected() {
        let err = decode_all(&[
            r#"{"candidates":[{"content":{"role":"model","parts":[{"functionCall":{"name":"f","args":[1,2]}}]}}]}"#,
        ])
        .unwrap_err();
        assert!(matches!(err, Error::ToolArgumentParse { .. }));
    }

    #[test]
    fn test_error_frame_terminates() {
        let err = decode_all(&[
            r#"{"error":{"code":503,"message":"The model is overloaded.","status":"UNAVAILABLE"}}"#,
        ])
        .unwrap_err();
        assert!(matches!(err, Error::ProviderStream { provider: "gemini", .. }));
    }

    #[test]
    fn test_blocked_prompt_terminates() {
        let err = decode_all(&[r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#]).unwrap_err();
        match err {
            Error::ProviderStream { message, .. } => assert!(message.contains("SAFETY")),
            other => panic!("expected stream error, got {other:?}"),
        }
    }

    #[test]
    fn test_request_conversion() {
        let messages = vec![
            Message::system("Be terse."),
            Message::user("Weather in Paris?"),
            Message::assistant_tool_calls(vec![ToolCall {
                id: "call_abc".into(),
                name: "get_weather".into(),
                arguments: serde_json::from_value(json!({"location": "Paris"})).unwrap(),
            }]),
            Message::tool_result("call_abc", "22C"),
        ];
        let options = GenerationOptions::new("gemini-2.0-flash")
            .with_max_output_tokens(200)
            .with_tool_choice(ToolChoice::Tool {
                name: "get_weather".into(),
            });

        let request = GeminiProvider::convert_request(&messages, &options).unwrap();
        assert!(request.system_instruction.is_some());
        assert_eq!(request.contents.len(), 3);
        assert_eq!(request.contents[1].role.as_deref(), Some("model"));

        // The tool result resolves to the function name by call id.
        match &request.contents[2].parts[0] {
            GeminiPart::FunctionResponse { function_response } => {
                assert_eq!(function_response.name, "get_weather");
                assert_eq!(function_response.response, json!({"result": "22C"}));
            }
            other => panic!("expected function response, got {other:?}"),
        }

        let config = request.tool_config.unwrap().function_calling_config;
        assert_eq!(config.mode, "ANY");
        assert_eq!(
            config.allowed_function_names,
            Some(vec!["get_weather".to_string()])
        );
        assert_eq!(
            request.generation_config.unwrap().max_output_tokens,
            Some(200)
        );
    }

    #[test]
    fn test_wrap_result_passes_objects_through() {
        assert_eq!(
            wrap_result(r#"{"temp": 22}"#),
            json!({"temp": 22})
        );
        assert_eq!(wrap_result("sunny"), json!({"result": "sunny"}));
    }

    #[test]
    fn test_provider_requires_api_key() {
        assert!(GeminiProvider::new(ProviderConfig::new("")).is_err());
        assert!(GeminiProvider::new(ProviderConfig::new("AIza-test")).is_ok());
    }
}
