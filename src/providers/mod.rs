//! Provider implementations for the supported vendor APIs.

pub mod anthropic;
pub mod gemini;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

use crate::Error;

/// Send a request, re-issuing it on connection-level failures up to
/// `max_retries` times. Never retries after a response exists and never
/// retries HTTP error statuses; retry policy beyond a plain resend count is
/// out of scope.
pub(crate) async fn send_with_retries(
    builder: reqwest::RequestBuilder,
    max_retries: u32,
) -> Result<reqwest::Response, Error> {
    let mut attempt = 0u32;
    loop {
        let request = builder
            .try_clone()
            .ok_or_else(|| Error::config("request body is not cloneable"))?;
        match request.send().await {
            Ok(response) => return Ok(response),
            Err(e) if e.is_timeout() => return Err(Error::Timeout),
            Err(e) if e.is_connect() && attempt < max_retries => {
                attempt += 1;
                tracing::debug!(attempt, error = %e, "connection failed, retrying request");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Reject non-success statuses before streaming starts, carrying the status
/// and the vendor's error body.
pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::request(status.as_u16(), body))
}

/// Split an image payload into (media type, base64 data). Accepts either a
/// `data:<mime>;base64,<payload>` URL or a bare base64 string, which is
/// assumed to be PNG.
pub(crate) fn split_image_payload(image: &str) -> (String, String) {
    if let Some(rest) = image.strip_prefix("data:") {
        if let Some((mime, data)) = rest.split_once(";base64,") {
            return (mime.to_string(), data.to_string());
        }
    }
    ("image/png".to_string(), image.to_string())
}

/// Render an image payload as a data URL, passing existing data URLs through.
pub(crate) fn as_data_url(image: &str) -> String {
    if image.starts_with("data:") {
        image.to_string()
    } else {
        format!("data:image/png;base64,{image}")
    }
}
