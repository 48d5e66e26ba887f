use futures_util::future::ready;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::Value;

use super::types::*;
use crate::assembler::ChunkAssembler;
use crate::config::ProviderConfig;
use crate::provider::{ChunkStream, LlmProvider};
use crate::providers::{ensure_success, send_with_retries, split_image_payload};
use crate::sse_stream::SseStream;
use crate::types::{
    Content, FinishReason, GenerationOptions, Message, Role, StreamChunk, ToolChoice,
};
use crate::Error;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const PROVIDER: &str = "anthropic";

/// Anthropic provider targeting the first-party Messages API.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
    defaults: GenerationOptions,
    betas: Vec<String>,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, Error> {
        let client = config.build_client()?;
        Ok(Self {
            client,
            base_url: config.base_url_or(DEFAULT_BASE_URL),
            api_key: config.api_key,
            max_retries: config.max_retries,
            defaults: config.defaults.unwrap_or_default(),
            betas: Vec::new(),
        })
    }

    /// Enable beta features, sent as the `anthropic-beta` header.
    pub fn with_betas(mut self, betas: Vec<String>) -> Self {
        self.betas = betas;
        self
    }

    /// Convert normalized messages and options to a Messages API request.
    fn convert_request(
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<MessagesRequest, Error> {
        let mut out: Vec<AnthropicMessage> = Vec::new();
        let mut system_parts: Vec<String> = Vec::new();

        for message in messages {
            if message.role == Role::System {
                // System messages lift into the top-level `system` field.
                system_parts.push(message.text());
                continue;
            }

            let mut blocks = Vec::new();
            let mut results = Vec::new();
            for content in &message.content {
                match content {
                    Content::Text { text } => {
                        blocks.push(AnthropicContentBlock::Text { text: text.clone() })
                    }
                    Content::Image { image } => {
                        let (media_type, data) = split_image_payload(image);
                        blocks.push(AnthropicContentBlock::Image {
                            source: AnthropicImageSource::base64(media_type, data),
                        });
                    }
                    Content::ToolResult {
                        tool_call_id,
                        result,
                    } => results.push(AnthropicContentBlock::ToolResult {
                        tool_use_id: tool_call_id.clone(),
                        content: result.clone(),
                    }),
                }
            }

            for call in &message.tool_calls {
                blocks.push(AnthropicContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: Value::Object(call.arguments.clone()),
                });
            }

            if !blocks.is_empty() {
                let role = match message.role {
                    Role::Assistant => "assistant",
                    _ => "user",
                };
                out.push(AnthropicMessage {
                    role: role.to_string(),
                    content: blocks,
                });
            }

            // Tool results become user-turn blocks, merged with an adjacent
            // tool-result turn so a batch of results forms one message.
            if !results.is_empty() {
                let merge = out.last().is_some_and(|m| {
                    m.role == "user"
                        && m.content
                            .iter()
                            .any(|b| matches!(b, AnthropicContentBlock::ToolResult { .. }))
                });
                if merge {
                    if let Some(last) = out.last_mut() {
                        last.content.extend(results);
                    }
                } else {
                    out.push(AnthropicMessage {
                        role: "user".to_string(),
                        content: results,
                    });
                }
            }
        }

        let tools = options.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|tool| AnthropicTool {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    input_schema: tool.parameters.clone(),
                })
                .collect()
        });

        let tool_choice = options.tool_choice.as_ref().map(|choice| match choice {
            ToolChoice::Auto => AnthropicToolChoice::Auto,
            ToolChoice::Required => AnthropicToolChoice::Any,
            ToolChoice::None => AnthropicToolChoice::None,
            ToolChoice::Tool { name } => AnthropicToolChoice::Tool { name: name.clone() },
        });

        let ext = options.anthropic.clone().unwrap_or_default();

        Ok(MessagesRequest {
            model: options.model.clone(),
            messages: out,
            max_tokens: options.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: if system_parts.is_empty() {
                None
            } else {
                Some(system_parts.join("\n"))
            },
            temperature: options.temperature,
            top_p: options.top_p,
            top_k: options.top_k,
            stop_sequences: options.stop_sequences.clone(),
            tools,
            tool_choice,
            metadata: ext
                .metadata_user_id
                .map(|user_id| AnthropicMetadata { user_id }),
            thinking: ext.thinking_budget_tokens.map(|budget_tokens| {
                AnthropicThinking {
                    r#type: "enabled".to_string(),
                    budget_tokens,
                }
            }),
            stream: None,
        })
    }

    fn map_stop_reason(reason: &str) -> FinishReason {
        match reason {
            "end_turn" | "stop_sequence" => FinishReason::Stop,
            "max_tokens" => FinishReason::Length,
            "tool_use" => FinishReason::ToolUse,
            "refusal" => FinishReason::Error,
            _ => FinishReason::Stop,
        }
    }
}

/// Per-call decoder: the shared assembler plus the stop reason latched from
/// `message_delta` until `message_stop` arrives.
#[derive(Debug, Default)]
struct AnthropicDecoder {
    assembler: ChunkAssembler,
    stop_reason: Option<FinishReason>,
}

impl AnthropicDecoder {
    /// Map one Messages API event onto the assembler, producing at most one
    /// normalized chunk.
    fn decode(&mut self, event: AnthropicStreamEvent) -> Result<Option<StreamChunk>, Error> {
        match event {
            AnthropicStreamEvent::MessageStart {} | AnthropicStreamEvent::Ping => Ok(None),
            AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                AnthropicContentBlock::Text { text } => {
                    if text.is_empty() {
                        Ok(None)
                    } else {
                        Ok(Some(self.assembler.text_delta(&text)))
                    }
                }
                AnthropicContentBlock::ToolUse { id, name, input } => {
                    let key = index.to_string();
                    self.assembler.begin_tool_call(&key, id, name);
                    // Input is usually an empty object streamed via
                    // input_json_delta, but may arrive complete up front.
                    let front_loaded = !input.is_null()
                        && input.as_object().map_or(true, |map| !map.is_empty());
                    if front_loaded {
                        self.assembler
                            .seed_arguments(&key, serde_json::to_string(&input)?);
                    }
                    Ok(None)
                }
                _ => Ok(None),
            },
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicContentDelta::TextDelta { text } => {
                    if text.is_empty() {
                        Ok(None)
                    } else {
                        Ok(Some(self.assembler.text_delta(&text)))
                    }
                }
                AnthropicContentDelta::InputJsonDelta { partial_json } => {
                    self.assembler
                        .append_arguments(&index.to_string(), &partial_json);
                    Ok(None)
                }
            },
            AnthropicStreamEvent::ContentBlockStop { index } => {
                self.assembler.end_tool_call(&index.to_string())
            }
            AnthropicStreamEvent::MessageDelta { delta } => {
                if let Some(reason) = delta.stop_reason {
                    self.stop_reason = Some(AnthropicProvider::map_stop_reason(&reason));
                }
                Ok(None)
            }
            AnthropicStreamEvent::MessageStop => {
                let reason = self.stop_reason.take().unwrap_or(FinishReason::Stop);
                self.assembler.finish(reason).map(Some)
            }
            AnthropicStreamEvent::Error { error } => Err(Error::provider_stream(
                PROVIDER,
                format!("{}: {}", error.r#type, error.message),
            )),
        }
    }

    fn is_finished(&self) -> bool {
        self.assembler.is_finished()
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
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

        let mut builder = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&request);
        if !self.betas.is_empty() {
            builder = builder.header("anthropic-beta", self.betas.join(","));
        }

        let response = send_with_retries(builder, self.max_retries).await?;
        let response = ensure_success(response).await?;

        let byte_stream = Box::pin(response.bytes_stream().map(|r| r.map_err(Error::from)));
        let sse_stream = SseStream::new(byte_stream);

        let mut decoder = AnthropicDecoder::default();
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
                Ok(event) => {
                    let data = event.data.trim();
                    if data.is_empty() || !data.starts_with('{') {
                        None
                    } else {
                        match serde_json::from_str::<AnthropicStreamEvent>(data) {
                            Ok(parsed) => match decoder.decode(parsed) {
                                Ok(chunk) => chunk.map(Ok),
                                Err(e) => {
                                    failed = true;
                                    Some(Err(e))
                                }
                            },
                            Err(e) => {
                                failed = true;
                                Some(Err(Error::provider_stream(
                                    PROVIDER,
                                    format!("unparseable stream event: {e}"),
                                )))
                            }
                        }
                    }
                }
            };
            ready(out)
        });

        Ok(Box::pin(chunks))
    }
}
