use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::{Tool, ToolChoice};

/// Generation options shared by all vendors, plus optional per-vendor
/// extensions. `model` is mandatory; everything else falls back to
/// vendor-defined defaults when absent.
///
/// A provider may carry construction-time default options; call-time options
/// override field-by-field (a call-time `Some` wins, a call-time `None`
/// inherits the default). Vendor extension structs are replaced whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai: Option<OpenAiOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic: Option<AnthropicOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini: Option<GeminiOptions>,
}

/// OpenAI Responses API extensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAiOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<bool>,
}

/// Anthropic Messages API extensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnthropicOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_budget_tokens: Option<u32>,
}

/// Gemini API extensions. `safety_settings` is passed through as raw JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeminiOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_settings: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

impl GenerationOptions {
    /// Create options for a model with everything else defaulted.
    pub fn new(model: impl Into<String>) -> Self {
        GenerationOptions {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_stop_sequences(mut self, sequences: Vec<String>) -> Self {
        self.stop_sequences = Some(sequences);
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    /// Overlay these options on top of `defaults`, field by field.
    pub fn merged_over(&self, defaults: &GenerationOptions) -> GenerationOptions {
        GenerationOptions {
            model: if self.model.is_empty() {
                defaults.model.clone()
            } else {
                self.model.clone()
            },
            max_output_tokens: self.max_output_tokens.or(defaults.max_output_tokens),
            temperature: self.temperature.or(defaults.temperature),
            top_p: self.top_p.or(defaults.top_p),
            top_k: self.top_k.or(defaults.top_k),
            stop_sequences: self
                .stop_sequences
                .clone()
                .or_else(|| defaults.stop_sequences.clone()),
            tools: self.tools.clone().or_else(|| defaults.tools.clone()),
            tool_choice: self
                .tool_choice
                .clone()
                .or_else(|| defaults.tool_choice.clone()),
            openai: self.openai.clone().or_else(|| defaults.openai.clone()),
            anthropic: self
                .anthropic
                .clone()
                .or_else(|| defaults.anthropic.clone()),
            gemini: self.gemini.clone().or_else(|| defaults.gemini.clone()),
        }
    }
}
