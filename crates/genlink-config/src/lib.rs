#![allow(clippy::must_use_candidate)]

pub mod client;
mod loader;
pub mod logging;

use indexmap::IndexMap;
use serde::Deserialize;

pub use client::*;
pub use logging::*;

/// Top-level genlink configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Generation clients keyed by name
    #[serde(default)]
    pub clients: IndexMap<String, ClientConfig>,
    /// Log output configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}
