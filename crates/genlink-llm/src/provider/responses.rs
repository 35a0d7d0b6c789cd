//! `OpenAI` Responses endpoint

use url::Url;

use crate::error::LlmError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub fn endpoint(base: &Url) -> Result<Url, LlmError> {
    super::join(base, "responses")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint() {
        let base = Url::parse(DEFAULT_BASE_URL).unwrap();
        assert_eq!(endpoint(&base).unwrap().as_str(), "https://api.openai.com/v1/responses");
    }
}
