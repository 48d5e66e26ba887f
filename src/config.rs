use std::time::Duration;

use crate::types::GenerationOptions;
use crate::Error;

/// Default request timeout when none is configured.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Construction-time configuration shared by every provider.
///
/// `api_key` is validated once at provider construction; `generate` never
/// re-validates it. `defaults` are merged under call-time options field by
/// field. `max_retries` re-issues the initial request on connection-level
/// failures only, before any response bytes exist.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub max_retries: u32,
    pub defaults: Option<GenerationOptions>,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            timeout: None,
            max_retries: 0,
            defaults: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_defaults(mut self, defaults: GenerationOptions) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// Validate the config and build the HTTP client. Called once per
    /// provider construction.
    pub(crate) fn build_client(&self) -> Result<reqwest::Client, Error> {
        if self.api_key.trim().is_empty() {
            return Err(Error::config("api key must not be empty"));
        }
        reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(Error::from)
    }

    /// The configured base URL with any trailing slash removed, or `fallback`.
    pub(crate) fn base_url_or(&self, fallback: &str) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => fallback.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_api_key_rejected() {
        let err = ProviderConfig::new("  ").build_client().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_valid_config_builds_client() {
        let config = ProviderConfig::new("sk-test").with_timeout(Duration::from_secs(5));
        assert!(config.build_client().is_ok());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = ProviderConfig::new("k").with_base_url("http://localhost:9999/");
        assert_eq!(config.base_url_or("unused"), "http://localhost:9999");
        assert_eq!(
            ProviderConfig::new("k").base_url_or("https://api.openai.com/v1"),
            "https://api.openai.com/v1"
        );
    }
}
