use futures_util::future::ready;
use futures_util::StreamExt;
use reqwest::Client;

use super::types::*;
use crate::assembler::ChunkAssembler;
use crate::config::ProviderConfig;
use crate::provider::{ChunkStream, LlmProvider};
use crate::providers::{as_data_url, ensure_success, send_with_retries};
use crate::sse_stream::SseStream;
use crate::types::{
    Content, FinishReason, GenerationOptions, Message, Role, StreamChunk, ToolChoice,
};
use crate::Error;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const PROVIDER: &str = "openai";

/// OpenAI provider targeting the Responses API.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
    defaults: GenerationOptions,
}

impl OpenAiProvider {
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

    /// Convert normalized messages and options to a Responses API request.
    fn convert_request(
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<ResponsesRequest, Error> {
        let mut input = Vec::new();

        for message in messages {
            let role = match message.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                // Tool messages carry only tool results, emitted below.
                Role::Tool => "",
            };

            let mut parts = Vec::new();
            let mut outputs = Vec::new();
            for content in &message.content {
                match content {
                    Content::Text { text } => {
                        parts.push(ResponsesContentPart::Text { text: text.clone() })
                    }
                    Content::Image { image } => parts.push(ResponsesContentPart::Image {
                        image_url: as_data_url(image),
                    }),
                    Content::ToolResult {
                        tool_call_id,
                        result,
                    } => outputs.push(ResponsesInputItem::FunctionCallOutput {
                        call_id: tool_call_id.clone(),
                        output: result.clone(),
                    }),
                }
            }

            if !parts.is_empty() && message.role != Role::Tool {
                let content = match parts.as_slice() {
                    [ResponsesContentPart::Text { text }] => {
                        ResponsesMessageContent::Text(text.clone())
                    }
                    _ => ResponsesMessageContent::Parts(parts),
                };
                input.push(ResponsesInputItem::Message {
                    role: role.to_string(),
                    content,
                });
            }

            for call in &message.tool_calls {
                input.push(ResponsesInputItem::FunctionCall {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: serde_json::to_string(&call.arguments)?,
                });
            }

            input.extend(outputs);
        }

        let tools = options.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|tool| ResponsesTool {
                    r#type: "function".to_string(),
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                })
                .collect()
        });

        let tool_choice = options.tool_choice.as_ref().map(|choice| match choice {
            ToolChoice::Auto => ResponsesToolChoice::Mode("auto".to_string()),
            ToolChoice::Required => ResponsesToolChoice::Mode("required".to_string()),
            ToolChoice::None => ResponsesToolChoice::Mode("none".to_string()),
            ToolChoice::Tool { name } => ResponsesToolChoice::Function {
                r#type: "function".to_string(),
                name: name.clone(),
            },
        });

        if options.stop_sequences.is_some() {
            // The Responses API has no stop-sequence parameter.
            tracing::debug!("stop_sequences not supported by the OpenAI Responses API, ignoring");
        }

        let ext = options.openai.clone().unwrap_or_default();

        Ok(ResponsesRequest {
            model: options.model.clone(),
            input,
            temperature: options.temperature,
            max_output_tokens: options.max_output_tokens,
            top_p: options.top_p,
            tools,
            tool_choice,
            parallel_tool_calls: ext.parallel_tool_calls,
            reasoning: ext
                .reasoning_effort
                .map(|effort| ResponsesReasoning { effort }),
            store: ext.store,
            stream: None,
        })
    }

    /// Map one Responses event onto the assembler, producing at most one
    /// normalized chunk.
    fn decode_event(
        event: ResponsesStreamEvent,
        assembler: &mut ChunkAssembler,
    ) -> Result<Option<StreamChunk>, Error> {
        match event.r#type.as_str() {
            "response.output_text.delta" => {
                if let Some(delta) = event.delta {
                    if !delta.is_empty() {
                        return Ok(Some(assembler.text_delta(&delta)));
                    }
                }
            }
            "response.output_item.added" => {
                if let Some(item) = event.item {
                    if item.r#type == "function_call" {
                        let id = item.call_id.unwrap_or_else(|| item.id.clone());
                        let name = item.name.unwrap_or_default();
                        assembler.begin_tool_call(item.id, id, name);
                    }
                }
            }
            "response.function_call_arguments.delta" => {
                if let (Some(item_id), Some(delta)) = (event.item_id, event.delta) {
                    assembler.append_arguments(&item_id, &delta);
                }
            }
            "response.output_item.done" => {
                if let Some(item) = event.item {
                    if item.r#type == "function_call" {
                        // The done event carries the authoritative full
                        // argument string; prefer it over the fragment
                        // buffer when present.
                        if let Some(arguments) = item.arguments {
                            if !arguments.is_empty() {
                                assembler.seed_arguments(&item.id, arguments);
                            }
                        }
                        return assembler.end_tool_call(&item.id);
                    }
                }
            }
            "response.completed" => {
                let reason = match &event.response {
                    Some(response)
                        if response.output.iter().any(|o| o.r#type == "function_call") =>
                    {
                        FinishReason::ToolUse
                    }
                    _ => FinishReason::Stop,
                };
                return assembler.finish(reason).map(Some);
            }
            "response.incomplete" => {
                let reason = match event
                    .response
                    .and_then(|r| r.incomplete_details)
                    .and_then(|d| d.reason)
                    .as_deref()
                {
                    Some("max_output_tokens") => FinishReason::Length,
                    _ => FinishReason::Stop,
                };
                return assembler.finish(reason).map(Some);
            }
            "response.failed" => {
                let message = event
                    .response
                    .and_then(|r| r.error)
                    .map(|e| e.message)
                    .unwrap_or_else(|| "response failed".to_string());
                return Err(Error::provider_stream(PROVIDER, message));
            }
            "error" => {
                let message = event.message.unwrap_or_else(|| "unknown error".to_string());
                return Err(Error::provider_stream(PROVIDER, message));
            }
            _ => {
                // Lifecycle events we carry no state for.
            }
        }

        Ok(None)
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<ChunkStream, Error> {
        let options = options.merged_over(&self.defaults);
        if options.model.is_empty() {
            return Err(Error::config("model is required"));
        }

        let mut request = Self::convert_request(messages, &options)?;
        request.stream = Some(true);

        let builder = self
            .client
            .post(format!("{}/responses", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request);

        let response = send_with_retries(builder, self.max_retries).await?;
        let response = ensure_success(response).await?;

        let byte_stream = Box::pin(response.bytes_stream().map(|r| r.map_err(Error::from)));
        let sse_stream = SseStream::new(byte_stream);

        let mut assembler = ChunkAssembler::new();
        let mut failed = false;

        let chunks = sse_stream.filter_map(move |sse_result| {
            if failed || assembler.is_finished() {
                return ready(None);
            }
            let out = match sse_result {
                Err(e) => {
                    failed = true;
                    Some(Err(e))
                }
                Ok(event) if event.is_done() => None,
                Ok(event) => match serde_json::from_str::<ResponsesStreamEvent>(event.data.trim())
                {
                    Ok(parsed) => match Self::decode_event(parsed, &mut assembler) {
                        Ok(chunk) => chunk.map(Ok),
                        Err(e) => {
                            failed = true;
                            Some(Err(e))
                        }
                    },
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping unparseable event");
                        None
                    }
                },
            };
            ready(out)
        });

        Ok(Box::pin(chunks))
    }
}
