//! Client construction against a mock provider

use std::sync::Arc;

use genlink_config::{ClientConfig, ProviderType};
use genlink_llm::GenerationClient;
use secrecy::SecretString;

use super::recorder::Recorder;

/// Configuration pointed at `base_url` with a test key
pub fn config(provider_type: ProviderType, model: &str, base_url: &str) -> ClientConfig {
    let mut config = ClientConfig::new(provider_type, model);
    config.api_key = Some(SecretString::from("test-key"));
    config.base_url = Some(base_url.parse().expect("valid mock URL"));
    config
}

/// Client wired to a fresh recorder for hook and usage reports
pub fn client(config: ClientConfig) -> (GenerationClient, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let client = GenerationClient::builder(config)
        .hook(recorder.clone())
        .usage_listener(recorder.clone())
        .build()
        .expect("valid client config");
    (client, recorder)
}
