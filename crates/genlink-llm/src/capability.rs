//! Per-client capability registry
//!
//! Computed once when a client is built from its provider and model, then
//! narrowed by configuration. Lookups never allocate.

use std::collections::BTreeSet;
use std::str::FromStr;

use strum::IntoEnumIterator;

use crate::error::LlmError;
use crate::provider::Provider;
use crate::types::GenerateRequest;

/// Capability names a client can be asked about
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum Feature {
    CanUseTools,
    CanStream,
    IsMultimodal,
    CanExecuteToolsInParallel,
    SupportsSessionContinuation,
    SupportsTopLevelInstructions,
}

/// Model name fragments of text-only completion models
const TEXT_ONLY_MODELS: [&str; 5] = ["gpt-3.5", "davinci", "babbage", "gemini-1.0-pro", "gemini-pro"];

/// Legacy Claude models without tool use or image input
const LEGACY_CLAUDE: [&str; 2] = ["claude-2", "claude-instant"];

/// What one configured client supports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    features: BTreeSet<Feature>,
}

impl Capabilities {
    /// Derive capabilities from the provider and model name
    pub fn detect(provider: Provider, model: &str) -> Self {
        let model = model.to_ascii_lowercase();

        // Embedding models only embed
        if model.contains("embed") {
            return Self {
                features: BTreeSet::new(),
            };
        }

        let mut features = BTreeSet::from([
            Feature::CanStream,
            Feature::CanUseTools,
            Feature::IsMultimodal,
            Feature::CanExecuteToolsInParallel,
        ]);

        if TEXT_ONLY_MODELS.iter().any(|m| model.contains(m)) {
            features.remove(&Feature::IsMultimodal);
        }
        if LEGACY_CLAUDE.iter().any(|m| model.contains(m)) {
            features.remove(&Feature::IsMultimodal);
            features.remove(&Feature::CanUseTools);
            features.remove(&Feature::CanExecuteToolsInParallel);
        }

        if provider == Provider::Responses {
            features.insert(Feature::SupportsSessionContinuation);
        }
        if matches!(provider, Provider::Responses | Provider::Anthropic | Provider::Google) {
            features.insert(Feature::SupportsTopLevelInstructions);
        }

        Self { features }
    }

    /// Remove features by name
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::InvalidRequest`] for a name that is not a known feature.
    pub fn without(mut self, names: &[String]) -> Result<Self, LlmError> {
        for name in names {
            let feature = Feature::from_str(name).map_err(|_| {
                let known: Vec<_> = Feature::iter().map(|f| f.to_string()).collect();
                LlmError::InvalidRequest(format!("unknown feature '{name}' (expected one of: {})", known.join(", ")))
            })?;
            self.features.remove(&feature);
        }
        Ok(self)
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// Look a feature up by name; unknown names are unsupported
    pub fn implements(&self, name: &str) -> bool {
        Feature::from_str(name).is_ok_and(|feature| self.supports(feature))
    }

    /// Supported features in a stable order
    pub fn iter(&self) -> impl Iterator<Item = Feature> + '_ {
        self.features.iter().copied()
    }

    /// Reject a request that needs something this client lacks
    pub fn require_for(&self, request: &GenerateRequest, stream: bool) -> Result<(), LlmError> {
        let options = request.options();
        let mut needed = Vec::new();
        if stream {
            needed.push(Feature::CanStream);
        }
        if request.uses_tools() || request.has_tool_turns() {
            needed.push(Feature::CanUseTools);
        }
        if request.uses_media() {
            needed.push(Feature::IsMultimodal);
        }
        if options.parallel_tool_calls == Some(true) && request.uses_tools() {
            needed.push(Feature::CanExecuteToolsInParallel);
        }

        match needed.into_iter().find(|f| !self.supports(*f)) {
            Some(feature) => Err(LlmError::Unimplemented {
                feature: feature.to_string(),
            }),
            None => Ok(()),
        }
    }
}
