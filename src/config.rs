use indexmap::IndexMap;
use serde::Deserialize;

use crate::value::{Bindings, Value};

/// Failure to load a [`Config`].
#[derive(Debug, thiserror::Error)]
#[error("invalid config: {0}")]
pub struct ConfigError(#[from] serde_json::Error);

/// Options for `resolve` and the transformer.
///
/// Only `variables` is read by this crate; every other key is kept in
/// `options` for the transformer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub variables: Option<Bindings>,
    #[serde(flatten)]
    pub options: IndexMap<String, Value>,
}

impl Config {
    /// Parse a config from JSON text.
    ///
    /// ```
    /// let config = doctags::Config::from_json(r#"{"variables": {"name": "World"}}"#).unwrap();
    /// assert!(config.bindings().is_some());
    /// ```
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Variable bindings, if any were given.
    #[must_use]
    pub const fn bindings(&self) -> Option<&Bindings> {
        self.variables.as_ref()
    }
}
