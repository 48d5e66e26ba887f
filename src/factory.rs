use std::env;
use std::str::FromStr;

use crate::config::ProviderConfig;
use crate::provider::LlmProvider;
use crate::providers::{AnthropicProvider, GeminiProvider, OpenAiProvider};
use crate::Error;

/// Supported provider backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderKind {
    /// The environment variable holding this provider's API key.
    fn api_key_var(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::Gemini => "GEMINI_API_KEY",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            other => Err(Error::config(format!(
                "unknown provider '{other}'. Valid values are: openai, anthropic, gemini"
            ))),
        }
    }
}

/// Build a provider of the given kind behind the trait object.
pub fn create_provider(
    kind: ProviderKind,
    config: ProviderConfig,
) -> Result<Box<dyn LlmProvider>, Error> {
    Ok(match kind {
        ProviderKind::OpenAi => Box::new(OpenAiProvider::new(config)?),
        ProviderKind::Anthropic => Box::new(AnthropicProvider::new(config)?),
        ProviderKind::Gemini => Box::new(GeminiProvider::new(config)?),
    })
}

/// Build a provider from environment variables: `LLM_PROVIDER` selects the
/// backend, and the provider's own key variable (`OPENAI_API_KEY`,
/// `ANTHROPIC_API_KEY`, or `GEMINI_API_KEY`) supplies the credential. When
/// `LLM_PROVIDER` is unset, the backend is inferred from whichever key
/// variable is present, in that order.
pub fn create_provider_from_env() -> Result<Box<dyn LlmProvider>, Error> {
    let kind = match env::var("LLM_PROVIDER") {
        Ok(name) => name.parse()?,
        Err(_) => [
            ProviderKind::OpenAi,
            ProviderKind::Anthropic,
            ProviderKind::Gemini,
        ]
        .into_iter()
        .find(|kind| env::var(kind.api_key_var()).is_ok())
        .ok_or_else(|| {
            Error::config(
                "no provider configured: set LLM_PROVIDER or one of OPENAI_API_KEY, \
                 ANTHROPIC_API_KEY, GEMINI_API_KEY",
            )
        })?,
    };

    let api_key = env::var(kind.api_key_var())
        .map_err(|_| Error::config(format!("{} is not set", kind.api_key_var())))?;
    create_provider(kind, ProviderConfig::new(api_key))
}
