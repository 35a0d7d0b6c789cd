//! Anthropic Messages endpoint and headers

use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::LlmError;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

const API_KEY: HeaderName = HeaderName::from_static("x-api-key");
const VERSION: HeaderName = HeaderName::from_static("anthropic-version");

pub fn endpoint(base: &Url) -> Result<Url, LlmError> {
    super::join(base, "messages")
}

pub fn headers(api_key: Option<&SecretString>, headers: &mut HeaderMap) -> Result<(), LlmError> {
    headers.insert(VERSION, HeaderValue::from_static(ANTHROPIC_VERSION));
    if let Some(key) = api_key {
        headers.insert(API_KEY, super::secret_header(key.expose_secret())?);
    }
    Ok(())
}
