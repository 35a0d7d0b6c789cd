use std::str::FromStr;

use crate::Config;

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::from_toml_str(raw)
    }
}

impl Config {
    /// Parse configuration from TOML text
    ///
    /// Deserializes then validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if TOML parsing fails or validation fails
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if a client is missing its model or carries an
    /// unparsable duration or zero-valued limit
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, client) in &self.clients {
            if client.model.trim().is_empty() {
                anyhow::bail!("client '{name}' must set a model");
            }

            if client.max_output_tokens == Some(0) {
                anyhow::bail!("client '{name}' max_output_tokens must be greater than zero");
            }

            if client.continuation.max_sessions == 0 {
                anyhow::bail!("client '{name}' continuation.max_sessions must be greater than zero");
            }

            client
                .timeout()
                .map_err(|e| anyhow::anyhow!("client '{name}': {e}"))?;
            client
                .continuation
                .session_ttl()
                .map_err(|e| anyhow::anyhow!("client '{name}': {e}"))?;

            for key in client.headers.keys() {
                if key.is_empty() || !key.bytes().all(|b| b.is_ascii_graphic() && b != b':') {
                    anyhow::bail!("client '{name}' has an invalid header name '{key}'");
                }
            }
        }

        Ok(())
    }
}
