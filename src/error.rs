use thiserror::Error;

/// Errors that can occur when using the llm-conduit library.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid construction-time input (empty API key, missing model).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Transport-level failure before a response was received.
    #[error("http transport error: {0}")]
    Http(reqwest::Error),

    /// The vendor rejected the request before streaming began.
    #[error("request rejected (http {status}): {message}")]
    Request { status: u16, message: String },

    /// The vendor reported an error mid-stream.
    #[error("{provider} stream error: {message}")]
    ProviderStream {
        provider: &'static str,
        message: String,
    },

    /// Accumulated tool-call argument fragments did not form valid JSON.
    #[error("tool call {call_id}: arguments are not valid JSON: {message}")]
    ToolArgumentParse { call_id: String, message: String },

    /// The configured timeout elapsed before the stream completed.
    #[error("request timed out")]
    Timeout,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn request(status: u16, message: impl Into<String>) -> Self {
        Error::Request {
            status,
            message: message.into(),
        }
    }

    pub fn provider_stream(provider: &'static str, message: impl Into<String>) -> Self {
        Error::ProviderStream {
            provider,
            message: message.into(),
        }
    }

    pub fn tool_arguments(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ToolArgumentParse {
            call_id: call_id.into(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else {
            Error::Http(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("api key must not be empty");
        assert!(err.to_string().contains("invalid configuration"));

        let err = Error::request(429, "rate limited");
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("rate limited"));

        let err = Error::provider_stream("anthropic", "overloaded");
        assert!(err.to_string().contains("anthropic"));

        let err = Error::tool_arguments("call_1", "unexpected end of input");
        assert!(err.to_string().contains("call_1"));
    }
}
