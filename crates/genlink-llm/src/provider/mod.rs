//! Closed set of provider protocols
//!
//! Each variant knows its endpoint, authentication headers, request
//! encoding, canonical response shape and stream grammar. The per-provider
//! submodules hold the URL and header details.

pub mod anthropic;
pub mod google;
pub mod openai;
pub mod responses;

use bytes::Bytes;
use genlink_config::ProviderType;
use http::HeaderMap;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::convert::{self, PreparedRequest};
use crate::error::LlmError;
use crate::protocol::anthropic::AnthropicRequest;
use crate::protocol::google::GoogleRequest;
use crate::protocol::openai::ChatRequest;
use crate::protocol::responses::ResponsesRequest;
use crate::stream::FrameDecoder;
use crate::types::GenerateResponse;

/// Supported provider protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr, strum::EnumIter)]
pub enum Provider {
    /// OpenAI-compatible Chat Completions
    #[strum(serialize = "openai")]
    OpenAi,
    /// `OpenAI` Responses API
    #[strum(serialize = "openai_responses")]
    Responses,
    /// Anthropic Messages API
    #[strum(serialize = "anthropic")]
    Anthropic,
    /// Google Gemini `generateContent`
    #[strum(serialize = "google")]
    Google,
}

impl From<ProviderType> for Provider {
    fn from(value: ProviderType) -> Self {
        match value {
            ProviderType::Openai => Self::OpenAi,
            ProviderType::OpenaiResponses => Self::Responses,
            ProviderType::Anthropic => Self::Anthropic,
            ProviderType::Google => Self::Google,
        }
    }
}

impl Provider {
    /// Stable lowercase name used in logs and lifecycle info
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Public API base URL
    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => openai::DEFAULT_BASE_URL,
            Self::Responses => responses::DEFAULT_BASE_URL,
            Self::Anthropic => anthropic::DEFAULT_BASE_URL,
            Self::Google => google::DEFAULT_BASE_URL,
        }
    }

    /// Resolve the request URL under `base`
    pub fn endpoint(self, base: &Url, model: &str, stream: bool) -> Result<Url, LlmError> {
        match self {
            Self::OpenAi => openai::endpoint(base),
            Self::Responses => responses::endpoint(base),
            Self::Anthropic => anthropic::endpoint(base),
            Self::Google => google::endpoint(base, model, stream),
        }
    }

    /// Add content type and authentication headers
    pub fn request_headers(self, api_key: Option<&SecretString>, headers: &mut HeaderMap) -> Result<(), LlmError> {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        match self {
            Self::OpenAi | Self::Responses => {
                if let Some(key) = api_key {
                    headers.insert(AUTHORIZATION, secret_header(&format!("Bearer {}", key.expose_secret()))?);
                }
            }
            Self::Anthropic => anthropic::headers(api_key, headers)?,
            Self::Google => google::headers(api_key, headers)?,
        }
        Ok(())
    }

    /// Output limit the provider requires when the caller sets none
    pub const fn default_max_tokens(self) -> Option<u32> {
        match self {
            Self::Anthropic => Some(convert::anthropic::DEFAULT_MAX_TOKENS),
            Self::OpenAi | Self::Responses | Self::Google => None,
        }
    }

    /// Encode a prepared request as the provider's JSON body
    pub fn to_wire(self, request: &PreparedRequest<'_>) -> Result<Bytes, LlmError> {
        match self {
            Self::OpenAi => encode(&ChatRequest::try_from(request)?),
            Self::Responses => encode(&ResponsesRequest::try_from(request)?),
            Self::Anthropic => encode(&AnthropicRequest::try_from(request)?),
            Self::Google => encode(&GoogleRequest::try_from(request)?),
        }
    }

    /// Convert a body in the provider's canonical shape
    ///
    /// Returns `None` when `value` is not in that shape.
    pub fn parse_canonical(self, value: &Value) -> Option<Result<GenerateResponse, LlmError>> {
        match self {
            Self::OpenAi => convert::openai::parse_canonical(value).map(Ok),
            Self::Responses => convert::responses::parse_canonical(value),
            Self::Anthropic => convert::anthropic::parse_canonical(value).map(Ok),
            Self::Google => convert::google::parse_canonical(value).map(Ok),
        }
    }

    /// Parse a whole response body, falling back through the lenient shapes
    pub fn from_wire(self, body: &[u8]) -> Result<GenerateResponse, LlmError> {
        crate::parse::parse_body(self, body)
    }

    /// Fresh frame decoder for one streaming call
    pub fn decoder(self) -> Box<dyn FrameDecoder> {
        match self {
            Self::OpenAi => Box::<convert::openai::ChatStreamDecoder>::default(),
            Self::Responses => Box::<convert::responses::ResponsesStreamDecoder>::default(),
            Self::Anthropic => Box::<convert::anthropic::AnthropicStreamDecoder>::default(),
            Self::Google => Box::<convert::google::GoogleStreamDecoder>::default(),
        }
    }
}

fn encode(body: &impl Serialize) -> Result<Bytes, LlmError> {
    serde_json::to_vec(body)
        .map(Bytes::from)
        .map_err(|e| LlmError::Internal(e.into()))
}

/// Append `path` to the base URL, keeping the base path
fn join(base: &Url, path: &str) -> Result<Url, LlmError> {
    let raw = format!("{}/{path}", base.as_str().trim_end_matches('/'));
    Url::parse(&raw).map_err(|e| LlmError::InvalidRequest(format!("invalid endpoint '{raw}': {e}")))
}

/// Header value that is redacted from debug output
fn secret_header(value: &str) -> Result<HeaderValue, LlmError> {
    let mut value = HeaderValue::from_str(value)
        .map_err(|_| LlmError::InvalidRequest("API key is not a valid header value".to_owned()))?;
    value.set_sensitive(true);
    Ok(value)
}
