//! Gemini `generateContent` endpoints and headers
//!
//! The API key is sent as `x-goog-api-key`, never as a query parameter.

use http::HeaderMap;
use http::header::HeaderName;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::LlmError;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY: HeaderName = HeaderName::from_static("x-goog-api-key");

/// `models/{model}:generateContent`, or the SSE variant when streaming
pub fn endpoint(base: &Url, model: &str, stream: bool) -> Result<Url, LlmError> {
    let model = model.strip_prefix("models/").unwrap_or(model);
    if model.trim().is_empty() {
        return Err(LlmError::InvalidRequest("model is not set".to_owned()));
    }

    let path = if stream {
        format!("models/{model}:streamGenerateContent?alt=sse")
    } else {
        format!("models/{model}:generateContent")
    };
    super::join(base, &path)
}

pub fn headers(api_key: Option<&SecretString>, headers: &mut HeaderMap) -> Result<(), LlmError> {
    if let Some(key) = api_key {
        headers.insert(API_KEY, super::secret_header(key.expose_secret())?);
    }
    Ok(())
}
