//! `OpenAI` Chat Completions endpoint

use url::Url;

use crate::error::LlmError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub fn endpoint(base: &Url) -> Result<Url, LlmError> {
    super::join(base, "chat/completions")
}
